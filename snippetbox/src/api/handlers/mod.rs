//! HTTP request handlers for every page.
//!
//! # Handler Modules
//!
//! - [`pages`]: Home, about and the liveness probe
//! - [`snippets`]: Snippet viewing and creation
//! - [`users`]: Signup, login and logout
//! - [`account`]: Profile view and password change
//!
//! Handlers that render pages take a [`Page`], which gathers what every template needs from
//! the request: the session, the CSRF token and whether the visitor is logged in.

pub mod account;
pub mod pages;
pub mod snippets;
pub mod users;

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Serialize;

use crate::AppState;
use crate::auth::current_user::Identity;
use crate::csrf::CsrfToken;
use crate::errors::Error;
use crate::session::{Session, SessionError};
use crate::templates::TemplateData;
use crate::types::session_keys::{AUTHENTICATED_USER_ID, FLASH};

/// Request context for a rendered page.
#[derive(Debug, Clone)]
pub struct Page {
    pub session: Session,
    csrf_token: String,
    is_authenticated: bool,
}

impl<S: Send + Sync> FromRequestParts<S> for Page {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        let CsrfToken(csrf_token) = CsrfToken::from_request_parts(parts, state).await?;
        let identity = parts.extensions.get::<Identity>().copied().unwrap_or_default();

        Ok(Self {
            session,
            csrf_token,
            is_authenticated: identity.is_authenticated(),
        })
    }
}

impl Page {
    /// Template data for this request. Consumes the pending flash message, so call it only
    /// when a page is actually rendered.
    pub fn template_data(&self) -> TemplateData {
        TemplateData {
            flash: self.session.pop_string(FLASH),
            is_authenticated: self.is_authenticated,
            csrf_token: self.csrf_token.clone(),
            ..TemplateData::new()
        }
    }

    /// Template data carrying `form`, for pages that render one.
    pub fn form_data<F: Serialize>(&self, form: &F) -> Result<TemplateData, Error> {
        let mut data = self.template_data();
        data.form = Some(serde_json::to_value(form).map_err(anyhow::Error::from)?);
        Ok(data)
    }

    pub fn flash(&self, message: &str) {
        self.session.put(FLASH, message);
    }
}

/// Render a whole page before sending anything, so a template failure is a clean 500.
pub(crate) fn render(state: &AppState, status: StatusCode, name: &str, data: &TemplateData) -> Result<Response, Error> {
    let body = state.templates.render(name, data)?;
    Ok((status, Html(body)).into_response())
}

/// Drop the session's identity under a fresh token and send the visitor on with a flash.
pub(crate) async fn end_authenticated_session(session: &Session, flash: &str, to: &str) -> Result<Redirect, SessionError> {
    session.renew_token().await?;
    session.remove(AUTHENTICATED_USER_ID);
    session.put(FLASH, flash);
    Ok(Redirect::to(to))
}
