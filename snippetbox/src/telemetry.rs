//! Tracing initialization.
//!
//! Logs go to stdout through a `tracing_subscriber` fmt layer, either as
//! human-readable lines or as one JSON object per event. The filter comes from
//! `RUST_LOG` when set, otherwise from `log.filter` in the configuration:
//!
//! ```bash
//! RUST_LOG="snippetbox=debug,tower_http=debug,sqlx=warn" snippetbox -f config.yaml
//! ```
//!
//! Every request runs inside the span opened by the request logging layer, so
//! events emitted while handling it carry the method and URI.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{LogConfig, LogFormat};

/// Build the filter: `RUST_LOG` if present, else the configured directive.
pub fn env_filter(config: &LogConfig) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(&config.filter)?),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(config: &LogConfig) -> anyhow::Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config)?);

    match config.format {
        LogFormat::Pretty => registry.with(fmt::layer()).try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(true))
            .try_init()?,
    }

    info!(format = ?config.format, "Telemetry initialized");
    Ok(())
}
