//! Common type definitions.
//!
//! Users are keyed by the SQLite rowid, so ids are plain integers. Zero is
//! never assigned by the database and is used throughout the session layer to
//! mean "no user".

pub type UserId = i64;
pub type SnippetId = i64;

/// Session bag keys shared by handlers and middleware.
pub mod session_keys {
    pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";
    pub const REDIRECT_PATH_AFTER_LOGIN: &str = "redirectPathAfterLogin";
    pub const FLASH: &str = "flash";
    pub const CSRF_TOKEN: &str = "csrf_token";
}
