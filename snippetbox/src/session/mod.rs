//! Server-side sessions.
//!
//! A [`SessionManager`] maps the opaque token carried in the session cookie to a
//! [`SessionRecord`] held by a [`SessionStore`]. For each request the
//! [`load_and_save`] middleware loads the record into a [`Session`] handle,
//! places the handle in the request extensions, and after the handler returns
//! writes any changes back and sets the cookie.
//!
//! Handlers and middleware only ever touch session state through the
//! [`Session`] key/value interface.
//!
//! # Token renewal
//!
//! [`Session::renew_token`] swaps the token for a fresh one while keeping the
//! data bag, and removes the old token from the store straight away. It must be
//! called on every change of authentication state (login, logout, password
//! change) so that a token planted before login is worthless afterwards.

mod middleware;
mod store;

pub use middleware::load_and_save;
pub use store::{MemoryStore, SessionStore, SqliteStore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, HeaderValue, header, header::InvalidHeaderValue, request::Parts},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::crypto::generate_token;
use crate::db::errors::DbError;
use crate::errors::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session store: {0}")]
    Store(#[from] DbError),

    #[error("session data encoding: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt session record: {0}")]
    Corrupt(String),

    #[error("session cookie: {0}")]
    Cookie(#[from] InvalidHeaderValue),
}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        SessionError::Store(err.into())
    }
}

/// What a store keeps per token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub data: HashMap<String, Value>,
    /// Absolute end of life, fixed when the session is created
    pub deadline: DateTime<Utc>,
    /// When the store may forget the record; never later than `deadline`
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unmodified,
    Modified,
    Destroyed,
}

#[derive(Debug)]
struct SessionState {
    /// None until the session is first committed
    token: Option<String>,
    data: HashMap<String, Value>,
    deadline: DateTime<Utc>,
    status: Status,
}

/// Per-request handle to the visitor's session.
///
/// Cloning is cheap and all clones share state, so middleware and the handler
/// see each other's writes within one request.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    store: Arc<dyn SessionStore>,
    idle_timeout: Option<chrono::Duration>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // No method panics mid-update, so a poisoned map is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.lock();
        state.data.insert(key.to_string(), value.into());
        state.status = Status::Modified;
    }

    /// The integer stored under `key`, or 0 when unset.
    pub fn get_int(&self, key: &str) -> i64 {
        self.lock().data.get(key).and_then(Value::as_i64).unwrap_or_default()
    }

    /// The string stored under `key`, or "" when unset.
    pub fn get_string(&self, key: &str) -> String {
        self.lock()
            .data
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// Read and remove a string. A second call returns "".
    pub fn pop_string(&self, key: &str) -> String {
        let mut state = self.lock();
        match state.data.remove(key) {
            Some(value) => {
                state.status = Status::Modified;
                value.as_str().map(str::to_string).unwrap_or_default()
            }
            None => String::new(),
        }
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.lock();
        if state.data.remove(key).is_some() {
            state.status = Status::Modified;
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().data.contains_key(key)
    }

    /// The current token, if the session has been committed or renewed.
    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    /// Issue a new token for this session, keeping its data, and invalidate the old one.
    pub async fn renew_token(&self) -> Result<(), SessionError> {
        let new_token = generate_token();
        let (old_token, record) = {
            let mut state = self.lock();
            let old_token = state.token.replace(new_token.clone());
            state.status = Status::Modified;
            (old_token, self.record(&state))
        };

        if let Some(old_token) = old_token {
            self.store.rotate(&old_token, &new_token, &record).await?;
        }
        debug!("Session token renewed");
        Ok(())
    }

    /// Drop all data and expire the cookie at the end of the request.
    pub fn destroy(&self) {
        let mut state = self.lock();
        state.data.clear();
        state.status = Status::Destroyed;
    }

    fn record(&self, state: &SessionState) -> SessionRecord {
        let expiry = match self.idle_timeout {
            Some(idle) => std::cmp::min(state.deadline, Utc::now() + idle),
            None => state.deadline,
        };
        SessionRecord {
            data: state.data.clone(),
            deadline: state.deadline,
            expiry,
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| Error::Internal {
            operation: "read session: session middleware is not installed on this route".to_string(),
        })
    }
}

#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
    lifetime: chrono::Duration,
    idle_timeout: Option<chrono::Duration>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> anyhow::Result<Self> {
        let lifetime = chrono::Duration::from_std(config.lifetime)?;
        if Utc::now().checked_add_signed(lifetime).is_none() {
            anyhow::bail!("session lifetime {:?} is out of range", config.lifetime);
        }
        let idle_timeout = config.idle_timeout.map(chrono::Duration::from_std).transpose()?;
        Ok(Self {
            store,
            config: Arc::new(config),
            lifetime,
            idle_timeout,
        })
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Find the session cookie among the request's `Cookie` headers.
    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|cookies| cookies.split(';'))
            .filter_map(|cookie| cookie.trim().split_once('='))
            .find(|(name, value)| *name == self.config.cookie_name && !value.is_empty())
            .map(|(_, value)| value.to_string())
    }

    /// Load the session for `token`. Unknown or expired tokens give a fresh, empty session.
    pub async fn load(&self, token: Option<&str>) -> Result<Session, SessionError> {
        let existing = match token {
            Some(token) => self.store.find(token).await?.map(|record| (token.to_string(), record)),
            None => None,
        };

        let state = match existing {
            Some((token, record)) => SessionState {
                token: Some(token),
                data: record.data,
                deadline: record.deadline,
                status: Status::Unmodified,
            },
            None => SessionState {
                token: None,
                data: HashMap::new(),
                deadline: Utc::now() + self.lifetime,
                status: Status::Unmodified,
            },
        };

        Ok(Session {
            state: Arc::new(Mutex::new(state)),
            store: self.store.clone(),
            idle_timeout: self.idle_timeout,
        })
    }

    /// Persist the session if needed, returning the `Set-Cookie` value to send, if any.
    pub async fn save(&self, session: &Session) -> Result<Option<HeaderValue>, SessionError> {
        enum Action {
            Commit(String, SessionRecord),
            Delete(Option<String>),
            Nothing,
        }

        let action = {
            let mut state = session.lock();
            match state.status {
                Status::Destroyed => {
                    state.status = Status::Unmodified;
                    Action::Delete(state.token.take())
                }
                Status::Modified => {
                    let token = state.token.get_or_insert_with(generate_token).clone();
                    state.status = Status::Unmodified;
                    Action::Commit(token, session.record(&state))
                }
                // Touch existing sessions to push the idle expiry forward.
                Status::Unmodified if self.idle_timeout.is_some() => match state.token.clone() {
                    Some(token) => Action::Commit(token, session.record(&state)),
                    None => Action::Nothing,
                },
                Status::Unmodified => Action::Nothing,
            }
        };

        match action {
            Action::Commit(token, record) => {
                self.store.commit(&token, &record).await?;
                Ok(Some(self.session_cookie(&token, record.expiry)?))
            }
            Action::Delete(token) => {
                if let Some(token) = token {
                    self.store.delete(&token).await?;
                }
                Ok(Some(self.expired_cookie()?))
            }
            Action::Nothing => Ok(None),
        }
    }

    fn session_cookie(&self, token: &str, expiry: DateTime<Utc>) -> Result<HeaderValue, SessionError> {
        let max_age = (expiry - Utc::now()).num_seconds().max(0);
        self.cookie_header(&format!("{}={}; Max-Age={}", self.config.cookie_name, token, max_age))
    }

    fn expired_cookie(&self) -> Result<HeaderValue, SessionError> {
        self.cookie_header(&format!(
            "{}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            self.config.cookie_name
        ))
    }

    fn cookie_header(&self, prefix: &str) -> Result<HeaderValue, SessionError> {
        let secure = if self.config.cookie_secure { "; Secure" } else { "" };
        let cookie = format!("{prefix}; Path=/; HttpOnly; SameSite={}{secure}", self.config.cookie_same_site);
        Ok(HeaderValue::from_str(&cookie)?)
    }

    /// Periodically sweep expired sessions until `shutdown` is cancelled.
    pub fn spawn_cleanup(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Session cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => match store.delete_expired().await {
                        Ok(0) => {}
                        Ok(removed) => debug!(removed, "Removed expired sessions"),
                        Err(e) => warn!(error = %e, "Failed to remove expired sessions"),
                    },
                }
            }
        })
    }
}
