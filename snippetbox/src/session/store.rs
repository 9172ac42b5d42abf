//! Session storage backends.
//!
//! A store maps a token to a [`SessionRecord`]. Stores never interpret the data
//! bag; expiry is the only field they look at.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::SqlitePool;
use tracing::instrument;

use super::{SessionError, SessionRecord};

#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Look up a live record. Expired records are treated as absent.
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Insert or overwrite the record for `token`. Concurrent commits for the same token are
    /// last-writer-wins.
    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError>;

    async fn delete(&self, token: &str) -> Result<(), SessionError>;

    /// Move a record to a new token, removing the old one.
    async fn rotate(&self, old_token: &str, new_token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        self.commit(new_token, record).await?;
        self.delete(old_token).await
    }

    /// Remove expired records, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, SessionError>;
}

/// Process-local store. Sessions do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: DashMap<String, SessionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        // Clone out before removing: a live shard guard would deadlock `remove`.
        let record = self.sessions.get(token).map(|r| r.value().clone());
        match record {
            Some(record) if record.expiry > Utc::now() => Ok(Some(record)),
            Some(_) => {
                self.sessions.remove_if(token, |_, r| r.expiry <= Utc::now());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        self.sessions.insert(token.to_string(), record.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        self.sessions.remove(token);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, r| r.expiry > now);
        Ok(before.saturating_sub(self.sessions.len()) as u64)
    }
}

/// Store backed by the `sessions` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, SessionError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| SessionError::Corrupt(format!("timestamp {secs} out of range")))
}

const UPSERT: &str = "INSERT INTO sessions (token, data, deadline, expiry) VALUES (?, ?, ?, ?) \
     ON CONFLICT (token) DO UPDATE SET data = excluded.data, deadline = excluded.deadline, expiry = excluded.expiry";

#[async_trait]
impl SessionStore for SqliteStore {
    #[instrument(skip_all, err)]
    async fn find(&self, token: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT data, deadline, expiry FROM sessions WHERE token = ? AND expiry > ?",
        )
        .bind(token)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.db)
        .await?;

        let Some((data, deadline, expiry)) = row else {
            return Ok(None);
        };

        Ok(Some(SessionRecord {
            data: serde_json::from_str(&data)?,
            deadline: timestamp(deadline)?,
            expiry: timestamp(expiry)?,
        }))
    }

    #[instrument(skip_all, err)]
    async fn commit(&self, token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        sqlx::query(UPSERT)
            .bind(token)
            .bind(serde_json::to_string(&record.data)?)
            .bind(record.deadline.timestamp())
            .bind(record.expiry.timestamp())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn delete(&self, token: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn rotate(&self, old_token: &str, new_token: &str, record: &SessionRecord) -> Result<(), SessionError> {
        let data = serde_json::to_string(&record.data)?;

        let mut tx = self.db.begin().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(old_token)
            .execute(&mut *tx)
            .await?;
        sqlx::query(UPSERT)
            .bind(new_token)
            .bind(data)
            .bind(record.deadline.timestamp())
            .bind(record.expiry.timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expiry <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
