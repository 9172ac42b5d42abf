//! In-memory snippet storage.
//!
//! Snippets are plain content behind the auth core; they are kept in a
//! process-local map rather than the database.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::SnippetId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snippet {
    pub id: SnippetId,
    pub title: String,
    pub content: String,
    pub created: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Snippets {
    rows: DashMap<SnippetId, Snippet>,
    next_id: AtomicI64,
}

impl Default for Snippets {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Snippets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, title: &str, content: &str, expires_days: i64) -> SnippetId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let created = Utc::now();
        self.rows.insert(
            id,
            Snippet {
                id,
                title: title.to_string(),
                content: content.to_string(),
                created,
                expires: created + Duration::days(expires_days),
            },
        );
        id
    }

    /// A snippet that has not yet expired.
    pub fn get(&self, id: SnippetId) -> Option<Snippet> {
        let now = Utc::now();
        self.rows.get(&id).map(|s| s.value().clone()).filter(|s| s.expires > now)
    }

    /// Up to ten live snippets, newest first.
    pub fn latest(&self) -> Vec<Snippet> {
        let now = Utc::now();
        let mut live: Vec<Snippet> = self
            .rows
            .iter()
            .filter(|s| s.expires > now)
            .map(|s| s.value().clone())
            .collect();
        live.sort_by(|a, b| b.id.cmp(&a.id));
        live.truncate(10);
        live
    }
}
