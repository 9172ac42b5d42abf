//! Shared fixtures for unit and end-to-end tests.

use std::time::Duration;

use once_cell::sync::Lazy;

use axum::http::header;
use axum_test::{TestResponse, TestServer};
use regex::Regex;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

use crate::auth::password::Argon2Params;
use crate::config::{Config, SessionStoreKind};
use crate::csrf::CSRF_FIELD;
use crate::types::UserId;
use crate::{AppState, Application};

/// Smallest work factor argon2 accepts, so tests do not spend their time hashing.
pub const TEST_ARGON2: Argon2Params = Argon2Params {
    memory_kib: 1024,
    iterations: 1,
    parallelism: 1,
};

static CSRF_INPUT_RX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"name=['"]csrf_token['"] value=['"]([^'"]+)['"]"#).unwrap());

/// A migrated in-memory database. Everything shares one connection, which must never be
/// reaped, or the database would vanish with it.
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    crate::migrator().run(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.session.cookie_secure = false;
    config.session.store = SessionStoreKind::Memory;
    config.password.argon2_memory_kib = TEST_ARGON2.memory_kib;
    config.password.argon2_iterations = TEST_ARGON2.iterations;
    config.password.argon2_parallelism = TEST_ARGON2.parallelism;
    config
}

pub async fn create_test_state() -> AppState {
    crate::build_state(create_test_pool().await, test_config()).expect("Failed to build test state")
}

/// The full application router, plus its state for seeding and inspecting data.
pub async fn create_test_app() -> (TestClient, AppState) {
    create_test_app_with(test_config()).await
}

pub async fn create_test_app_with(config: Config) -> (TestClient, AppState) {
    let app = Application::new_with_pool(config, Some(create_test_pool().await))
        .await
        .expect("Failed to create application");
    let (server, state) = app.into_test_server();
    (TestClient::new(server), state)
}

pub async fn create_test_user(state: &AppState, name: &str, email: &str, password: &str) -> UserId {
    state.users.insert(name, email, password).await.expect("Failed to create test user")
}

/// A browser stand-in: remembers the session cookie and the last CSRF token it was shown.
pub struct TestClient {
    pub server: TestServer,
    cookie_name: String,
    cookie: Option<String>,
    csrf_token: Option<String>,
}

impl TestClient {
    pub fn new(server: TestServer) -> Self {
        Self {
            server,
            cookie_name: test_config().session.cookie_name,
            cookie: None,
            csrf_token: None,
        }
    }

    /// The current session token, if the server has issued one.
    pub fn session_token(&self) -> Option<&str> {
        self.cookie
            .as_deref()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, token)| token)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token.as_deref()
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        let mut request = self.server.get(path);
        if let Some(cookie) = &self.cookie {
            request = request.add_header(header::COOKIE, cookie.clone());
        }
        let response = request.await;
        self.absorb(&response);
        response
    }

    /// Post a URL-encoded form, adding the remembered CSRF token unless the fields carry one.
    pub async fn post_form(&mut self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let mut body: Vec<(String, String)> = fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        if !fields.iter().any(|(name, _)| *name == CSRF_FIELD) {
            if let Some(token) = &self.csrf_token {
                body.push((CSRF_FIELD.to_string(), token.clone()));
            }
        }

        let mut request = self.server.post(path).form(&body);
        if let Some(cookie) = &self.cookie {
            request = request.add_header(header::COOKIE, cookie.clone());
        }
        let response = request.await;
        self.absorb(&response);
        response
    }

    /// Sign in through the login form, fetching the page first for its CSRF token.
    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.get("/user/login").await;
        self.post_form("/user/login", &[("email", email), ("password", password)]).await
    }

    fn absorb(&mut self, response: &TestResponse) {
        let prefix = format!("{}=", self.cookie_name);
        for value in response.headers().get_all(header::SET_COOKIE) {
            let Ok(cookie) = value.to_str() else { continue };
            if !cookie.starts_with(&prefix) {
                continue;
            }
            let pair = cookie.split(';').next().unwrap_or_default().trim().to_string();
            if cookie.contains("Max-Age=0") || pair == prefix {
                self.cookie = None;
            } else {
                self.cookie = Some(pair);
            }
        }

        if let Some(captures) = CSRF_INPUT_RX.captures(&response.text()) {
            self.csrf_token = Some(captures[1].to_string());
        }
    }
}
