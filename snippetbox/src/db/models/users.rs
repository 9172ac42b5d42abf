//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Database request for creating a new user. The hash is computed by the credential store.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub name: String,
    pub email: String,
    pub hashed_password: String,
}

/// Public projection of a user row. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created: DateTime<Utc>,
}

/// The id and stored hash for an email, used only by credential verification.
#[derive(Clone, FromRow)]
pub struct UserCredentials {
    pub id: UserId,
    pub hashed_password: String,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("id", &self.id)
            .field("hashed_password", &"<redacted>")
            .finish()
    }
}
