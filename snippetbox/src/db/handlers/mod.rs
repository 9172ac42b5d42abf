//! Repository implementations, one per table.

pub mod users;

pub use users::Users;
