//! # snippetbox: session-authenticated snippet sharing
//!
//! `snippetbox` is a small server-rendered web application for pasting and sharing text
//! snippets. Most of the crate is its security core: user accounts with hashed passwords,
//! server-side sessions, CSRF protection and the middleware that ties them together.
//!
//! ## Architecture
//!
//! The application is built on [Axum](https://github.com/tokio-rs/axum) for the HTTP layer and
//! uses SQLite (through sqlx) for users and, by default, sessions.
//!
//! ### Request Flow
//!
//! Every request passes through the standard chain: panic recovery, request logging and
//! security headers. Page routes then run the dynamic chain, which loads the session, checks the
//! CSRF token on anything that is not a safe method, and resolves the visitor's identity from the
//! session. Protected routes finally pass the authorization gate, which sends anonymous visitors
//! to the login page and remembers where they were going. See [`middleware`] for the exact
//! ordering.
//!
//! ### Core Components
//!
//! The **authentication layer** ([`auth`]) owns the credential store (signup, login, password
//! change), the identity resolver and the authorization gate.
//!
//! The **session layer** ([`session`]) maps the cookie token to a server-side data bag, with
//! token renewal on every change of authentication state.
//!
//! The **database layer** ([`db`]) uses the repository pattern over a borrowed connection.
//!
//! The **API layer** ([`api`]) holds the page handlers and their forms, rendered through
//! [`templates`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use snippetbox::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = snippetbox::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     snippetbox::telemetry::init_telemetry(&config.log)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod csrf;
pub mod db;
pub mod errors;
pub mod forms;
pub mod middleware;
pub mod session;
pub mod snippets;
mod static_assets;
pub mod telemetry;
pub mod templates;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::api::handlers::{account, pages, snippets as snippet_pages, users};
use crate::auth::credentials::CredentialStore;
use crate::config::SessionStoreKind;
use crate::middleware::Chain;
use crate::session::{MemoryStore, SessionManager, SessionStore, SqliteStore};
use crate::snippets::Snippets;
use crate::templates::Templates;

pub use config::Config;
pub use types::{SnippetId, UserId};

/// Application state shared across all request handlers.
///
/// Middleware takes only the piece it needs (`sessions`, `users` or `config.forms`); handlers
/// take the whole state.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool.clone())
///     .config(config)
///     .users(CredentialStore::new(pool, params)?)
///     .sessions(sessions)
///     .templates(Arc::new(Templates::new()?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub users: CredentialStore,
    pub sessions: SessionManager,
    pub templates: Arc<Templates>,
    #[builder(default)]
    pub snippets: Arc<Snippets>,
}

/// Get the snippetbox database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Assemble the shared state from a migrated pool.
pub fn build_state(pool: SqlitePool, config: Config) -> anyhow::Result<AppState> {
    let store: Arc<dyn SessionStore> = match config.session.store {
        SessionStoreKind::Memory => Arc::new(MemoryStore::new()),
        SessionStoreKind::Database => Arc::new(SqliteStore::new(pool.clone())),
    };
    let sessions = SessionManager::new(store, config.session.clone())?;
    let users = CredentialStore::new(pool.clone(), config.password.argon2_params())?;
    let templates = Templates::new()?;

    Ok(AppState::builder()
        .db(pool)
        .config(config)
        .users(users)
        .sessions(sessions)
        .templates(Arc::new(templates))
        .build())
}

/// Build the application router with every route and middleware chain.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> Router {
    let dynamic = Router::new()
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/snippet/view/{id}", get(snippet_pages::view))
        .route("/user/signup", get(users::signup_page).post(users::signup))
        .route("/user/login", get(users::login_page).post(users::login));

    let protected = Router::new()
        .route(
            "/snippet/create",
            get(snippet_pages::create_page).post(snippet_pages::create),
        )
        .route("/user/logout", post(users::logout))
        .route("/account/view", get(account::view))
        .route(
            "/account/password/update",
            get(account::password_page).post(account::password_update),
        );

    let router = Router::new()
        .route("/ping", get(pages::ping))
        .route("/static/{*path}", get(static_assets::serve_static))
        .merge(Chain::dynamic().wrap_routes(dynamic, state))
        .merge(Chain::protected().wrap_routes(protected, state))
        .with_state(state.clone());

    Chain::standard().wrap_all(router, state)
}

/// The assembled application: router, state and the session sweeper.
pub struct Application {
    router: Router,
    state: AppState,
    config: Config,
    pool: SqlitePool,
    shutdown_token: CancellationToken,
    cleanup: JoinHandle<()>,
}

impl Application {
    /// Connect to the configured database and build the application.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Build the application, reusing `pool` when given instead of connecting.
    pub async fn new_with_pool(config: Config, pool: Option<SqlitePool>) -> anyhow::Result<Self> {
        let pool = match pool {
            Some(pool) => pool,
            None => db::connect(&config.database).await?,
        };

        info!("Running database migrations...");
        migrator().run(&pool).await?;

        let state = build_state(pool.clone(), config.clone())?;

        let shutdown_token = CancellationToken::new();
        let cleanup = state
            .sessions
            .spawn_cleanup(config.session.cleanup_interval, shutdown_token.clone());

        let router = build_router(&state);

        Ok(Self {
            router,
            state,
            config,
            pool,
            shutdown_token,
            cleanup,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, AppState) {
        self.shutdown_token.cancel();
        let server = axum_test::TestServer::new(self.router).expect("Failed to create test server");
        (server, self.state)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("snippetbox listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping session cleanup...");
        self.shutdown_token.cancel();
        if let Err(e) = self.cleanup.await {
            tracing::warn!(error = %e, "Session cleanup task ended abnormally");
        }

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
