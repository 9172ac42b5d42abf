//! Database record models matching table schemas.
//!
//! Models are distinct from the API form types so that storage and
//! presentation can evolve independently. Nothing in here carries a
//! password hash out of the repository layer except [`users::UserCredentials`].

pub mod users;
