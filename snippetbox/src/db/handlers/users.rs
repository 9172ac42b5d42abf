//! Database repository for users.

use crate::db::{
    errors::Result,
    models::users::{UserCreateDBRequest, UserCredentials, UserDBResponse},
};
use crate::types::UserId;
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;

pub struct Users<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Insert a user row. Uniqueness of `email` is left to the `users_uc_email` constraint,
    /// which surfaces as [`crate::db::errors::DbError::UniqueViolation`].
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&mut self, request: &UserCreateDBRequest) -> Result<UserId> {
        let id: UserId = sqlx::query_scalar(
            "INSERT INTO users (name, email, hashed_password, created) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.hashed_password)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(id)
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT id, name, email, created FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_credentials_by_email(&mut self, email: &str) -> Result<Option<UserCredentials>> {
        let credentials = sqlx::query_as::<_, UserCredentials>("SELECT id, hashed_password FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(credentials)
    }

    #[instrument(skip(self), err)]
    pub async fn get_password_hash(&mut self, id: UserId) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT hashed_password FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(hash)
    }

    #[instrument(skip(self), err)]
    pub async fn exists(&mut self, id: UserId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(exists)
    }

    /// Overwrite the stored hash, but only while it still equals `current_hash`.
    ///
    /// Returns false when the row is gone or the hash changed since it was read, so two
    /// concurrent password changes cannot both succeed against the same old password.
    #[instrument(skip(self, current_hash, new_hash), err)]
    pub async fn update_password_hash(&mut self, id: UserId, current_hash: &str, new_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET hashed_password = ? WHERE id = ? AND hashed_password = ?")
            .bind(new_hash)
            .bind(id)
            .bind(current_hash)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove a user row. Sessions that still reference the id are cleared lazily by the
    /// authentication middleware.
    #[instrument(skip(self), err)]
    pub async fn delete(&mut self, id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
