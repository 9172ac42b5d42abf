//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `SNIPPETBOX_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`, optional)
//! 2. **Environment variables** - Variables prefixed with `SNIPPETBOX_` override YAML values
//! 3. **DATABASE_URL** - Special case: overrides `database.url` if set
//! 4. **CLI flags** - `--addr` and `--dsn`
//!
//! Anything left unset falls back to the section's `Default` implementation.
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `SNIPPETBOX_SESSION__LIFETIME=2h` sets the `session.lifetime` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use snippetbox::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//! println!("Server will bind to {}", config.bind_address());
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! SNIPPETBOX_PORT=8080
//! DATABASE_URL="sqlite:///var/lib/snippetbox/app.db?mode=rwc"
//! SNIPPETBOX_SESSION__COOKIE_SECURE=false
//! SNIPPETBOX_PASSWORD__ARGON2_MEMORY_KIB=65536
//! ```

use chrono::Utc;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::auth::password::Argon2Params;
use crate::errors::Error;

/// Simple CLI args - config file plus the two overrides most often set at launch
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SNIPPETBOX_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,

    /// Listen address as `host:port` (`:4000` listens on all interfaces)
    #[arg(long, env = "SNIPPETBOX_ADDR")]
    pub addr: Option<String>,

    /// Database URL, overriding `database.url`
    #[arg(long, env = "SNIPPETBOX_DSN")]
    pub dsn: Option<String>,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub password: PasswordConfig,
    pub forms: FormsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://snippetbox.db?mode=rwc` or `sqlite::memory:`
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a pooled connection (also used as the SQLite busy timeout)
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

/// Session cookie and storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Absolute session lifetime, counted from creation
    #[serde(with = "humantime_serde")]
    pub lifetime: Duration,
    /// Expire sessions idle for longer than this. Unset means only the lifetime applies.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    /// Cookie name for session token
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    pub cookie_same_site: SameSite,
    /// Where session bags live
    pub store: SessionStoreKind,
    /// How often expired sessions are swept from the store
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => f.write_str("Strict"),
            SameSite::Lax => f.write_str("Lax"),
            SameSite::None => f.write_str("None"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    /// Process-local map; sessions are lost on restart
    Memory,
    /// The `sessions` table in the application database
    Database,
}

/// Password validation rules and hashing work factor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl PasswordConfig {
    pub fn argon2_params(&self) -> Argon2Params {
        Argon2Params {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormsConfig {
    /// Largest URL-encoded body accepted on form posts
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Default `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            database: DatabaseConfig::default(),
            session: SessionConfig::default(),
            password: PasswordConfig::default(),
            forms: FormsConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://snippetbox.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(12 * 60 * 60),
            idle_timeout: None,
            cookie_name: "session".to_string(),
            cookie_secure: true,
            cookie_same_site: SameSite::Lax,
            store: SessionStoreKind::Database,
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        let argon2 = Argon2Params::default();
        Self {
            min_length: 8,
            max_length: 64,
            argon2_memory_kib: argon2.memory_kib,
            argon2_iterations: argon2.iterations,
            argon2_parallelism: argon2.parallelism,
        }
    }
}

impl Default for FormsConfig {
    fn default() -> Self {
        Self { max_body_bytes: 1024 * 1024 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(dsn) = &args.dsn {
            config.database.url = dsn.clone();
        }
        if let Some(addr) = &args.addr {
            let (host, port) = parse_addr(addr).map_err(|e| figment::Error::from(e.to_string()))?;
            config.host = host;
            config.port = port;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("SNIPPETBOX_").split("__").ignore(&["config", "addr", "dsn"]))
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "database.url".into()))
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |message: String| Error::Internal {
            operation: format!("Config validation: {message}"),
        };

        if self.session.lifetime.is_zero() {
            return Err(invalid("session.lifetime must be greater than zero".to_string()));
        }

        let deadline = chrono::Duration::from_std(self.session.lifetime)
            .ok()
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        if deadline.is_none() {
            return Err(invalid(format!(
                "session.lifetime ({:?}) is too long to compute a deadline",
                self.session.lifetime
            )));
        }

        if let Some(idle) = self.session.idle_timeout {
            if idle.is_zero() || idle > self.session.lifetime {
                return Err(invalid(format!(
                    "session.idle_timeout ({idle:?}) must be non-zero and no longer than session.lifetime ({:?})",
                    self.session.lifetime
                )));
            }
        }

        if self.session.cookie_same_site == SameSite::None && !self.session.cookie_secure {
            return Err(invalid("session.cookie_same_site=none requires session.cookie_secure=true".to_string()));
        }

        if !is_cookie_token(&self.session.cookie_name) {
            return Err(invalid(format!(
                "session.cookie_name {:?} must be a non-empty cookie token (no spaces, controls or separators)",
                self.session.cookie_name
            )));
        }

        if self.password.min_length < 1 {
            return Err(invalid("password.min_length must be at least 1".to_string()));
        }

        if self.password.min_length > self.password.max_length {
            return Err(invalid(format!(
                "password.min_length ({}) cannot be greater than password.max_length ({})",
                self.password.min_length, self.password.max_length
            )));
        }

        self.password.argon2_params().to_argon2()?;

        if self.forms.max_body_bytes == 0 {
            return Err(invalid("forms.max_body_bytes must be greater than zero".to_string()));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// RFC 6265 cookie-name token: visible ASCII other than HTTP separators.
fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b))
}

/// Split `host:port`. An empty host means all interfaces.
fn parse_addr(addr: &str) -> Result<(String, u16), Error> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| Error::Internal {
        operation: format!("parse listen address {addr:?}: expected host:port"),
    })?;
    let port = port.parse::<u16>().map_err(|e| Error::Internal {
        operation: format!("parse listen port {port:?}: {e}"),
    })?;
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok((host.to_string(), port))
}
