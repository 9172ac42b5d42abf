//! The credential store: the only code that writes password hashes.
//!
//! Every operation returns a [`CredentialError`] so handlers can tell the
//! user-facing outcomes (`InvalidCredentials`, `DuplicateEmail`, `NoRecord`)
//! apart from genuine failures.

use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, instrument};

use crate::auth::password::{self, Argon2Params};
use crate::db::{
    errors::DbError,
    handlers::Users,
    models::users::{UserCreateDBRequest, UserDBResponse},
};
use crate::types::UserId;

const EMAIL_CONSTRAINT: &str = "users_uc_email";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no matching user record")]
    NoRecord,

    /// Wrong password or unknown email. The two causes are deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<DbError> for CredentialError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => CredentialError::NoRecord,
            other => CredentialError::Internal(other.into()),
        }
    }
}

impl From<crate::errors::Error> for CredentialError {
    fn from(err: crate::errors::Error) -> Self {
        CredentialError::Internal(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CredentialError>;

#[derive(Clone)]
pub struct CredentialStore {
    db: SqlitePool,
    params: Argon2Params,
    /// Verified against when an email is unknown, so that path costs a full hash verification.
    dummy_hash: Arc<str>,
}

impl CredentialStore {
    pub fn new(db: SqlitePool, params: Argon2Params) -> std::result::Result<Self, crate::errors::Error> {
        let dummy_hash = password::hash_password("dummy-password-for-unknown-emails", params)?;
        Ok(Self {
            db,
            params,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash `password` and store a new user. Duplicate emails are detected from the unique
    /// constraint, never by looking the email up first.
    #[instrument(skip(self, name, password), err)]
    pub async fn insert(&self, name: &str, email: &str, password: &str) -> Result<UserId> {
        let hashed_password = hash_blocking(password.to_string(), self.params).await?;

        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        let request = UserCreateDBRequest {
            name: name.to_string(),
            email: email.to_string(),
            hashed_password,
        };

        match Users::new(&mut conn).create(&request).await {
            Ok(id) => Ok(id),
            Err(e) if e.is_unique_violation_of(EMAIL_CONSTRAINT, "users", "email") => Err(CredentialError::DuplicateEmail),
            Err(e) => Err(e.into()),
        }
    }

    /// Check an email/password pair and return the user id.
    #[instrument(skip(self, email, password), err(level = "info"))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<UserId> {
        let credentials = {
            let mut conn = self.db.acquire().await.map_err(DbError::from)?;
            Users::new(&mut conn).get_credentials_by_email(email).await?
        };

        let (id, hash) = match credentials {
            Some(c) => (Some(c.id), c.hashed_password),
            None => (None, self.dummy_hash.to_string()),
        };

        let matches = verify_blocking(password.to_string(), hash).await?;
        match id {
            Some(id) if matches => Ok(id),
            _ => {
                info!("Failed authentication attempt");
                Err(CredentialError::InvalidCredentials)
            }
        }
    }

    /// Whether a user with this id exists. Zero means "no identity" and is never looked up.
    #[instrument(skip(self), err)]
    pub async fn exists(&self, id: UserId) -> Result<bool> {
        if id <= 0 {
            return Ok(false);
        }
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Ok(Users::new(&mut conn).exists(id).await?)
    }

    /// Public projection of a user, without the hash.
    #[instrument(skip(self), err)]
    pub async fn get(&self, id: UserId) -> Result<UserDBResponse> {
        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_by_id(id).await?.ok_or(CredentialError::NoRecord)
    }

    /// Re-verify `current_password`, then replace the stored hash with one for `new_password`.
    #[instrument(skip(self, current_password, new_password), err(level = "info"))]
    pub async fn password_update(&self, id: UserId, current_password: &str, new_password: &str) -> Result<()> {
        let current_hash = {
            let mut conn = self.db.acquire().await.map_err(DbError::from)?;
            Users::new(&mut conn).get_password_hash(id).await?
        };
        let Some(current_hash) = current_hash else {
            return Err(CredentialError::InvalidCredentials);
        };

        if !verify_blocking(current_password.to_string(), current_hash.clone()).await? {
            return Err(CredentialError::InvalidCredentials);
        }

        let new_hash = hash_blocking(new_password.to_string(), self.params).await?;

        let mut conn = self.db.acquire().await.map_err(DbError::from)?;
        if Users::new(&mut conn).update_password_hash(id, &current_hash, &new_hash).await? {
            Ok(())
        } else {
            // The row vanished or its hash changed since verification.
            Err(CredentialError::InvalidCredentials)
        }
    }
}

async fn hash_blocking(password: String, params: Argon2Params) -> Result<String> {
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&password, params))
        .await
        .map_err(|e| anyhow::anyhow!("spawn password hashing task: {e}"))??;
    Ok(hash)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool> {
    let matches = tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| anyhow::anyhow!("spawn password verification task: {e}"))??;
    Ok(matches)
}
