//! Authentication and authorization.
//!
//! - [`credentials`]: the credential store, the only writer of password hashes
//! - [`password`]: Argon2id hashing and verification
//! - [`current_user`]: the per-request [`current_user::Identity`] and extractors
//! - [`middleware`]: the authentication resolver and the authorization gate
//!
//! # Flow
//!
//! Login stores the user id in the session under `authenticatedUserID` after
//! renewing the session token. On later requests [`middleware::authenticate`]
//! checks the id still names a user and records an `Identity`.
//! [`middleware::require_authentication`] turns anonymous requests to protected
//! routes into a redirect to `/user/login`.
//!
//! ```ignore
//! use snippetbox::auth::current_user::CurrentUser;
//!
//! async fn account(CurrentUser(user_id): CurrentUser) -> String {
//!     format!("Hello, user {user_id}!")
//! }
//! ```

pub mod credentials;
pub mod current_user;
pub mod middleware;
pub mod password;
