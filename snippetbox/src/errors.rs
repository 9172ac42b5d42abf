use crate::auth::credentials::CredentialError;
use crate::auth::middleware::LOGIN_PATH;
use crate::db::errors::DbError;
use crate::session::SessionError;
use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use std::backtrace::Backtrace;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated,

    /// Malformed request or failed CSRF check
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Credential store failure that the handler did not handle itself
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Session load, save or renewal failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Template lookup or rendering failure
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated => StatusCode::SEE_OTHER,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Database(DbError::NotFound) => StatusCode::NOT_FOUND,
            Error::Credentials(CredentialError::NoRecord) => StatusCode::NOT_FOUND,
            Error::Internal { .. }
            | Error::Database(_)
            | Error::Credentials(_)
            | Error::Session(_)
            | Error::Template(_)
            | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for errors that are the server's fault. These are logged with a backtrace and
    /// never described to the client.
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> &'static str {
        self.status_code().canonical_reason().unwrap_or("Internal Server Error")
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // The request span (method, uri) is attached to these events by the logging step.
        if self.is_internal() {
            tracing::error!(trace = %Backtrace::force_capture(), "Internal service error: {:#}", self);
        } else {
            match &self {
                Error::Unauthenticated => tracing::info!("Authentication error: {}", self),
                _ => tracing::debug!("Client error: {}", self),
            }
        }

        match self {
            Error::Unauthenticated => Redirect::to(LOGIN_PATH).into_response(),
            other => {
                let status = other.status_code();
                (
                    status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    other.user_message(),
                )
                    .into_response()
            }
        }
    }
}
