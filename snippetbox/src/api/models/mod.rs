//! Form models.
//!
//! Each form deserializes from a URL-encoded body, carries a [`Validator`](crate::forms::Validator)
//! for its errors, and serializes back into template data with any password fields left out.

pub mod snippets;
pub mod users;
