//! Cross-site request forgery protection.
//!
//! Each session carries one random token under the `csrf_token` key. Safe
//! requests only make sure the token exists and expose it to handlers as
//! [`CsrfToken`] so forms can embed it. Every other request must echo the token,
//! either in the `X-CSRF-Token` header or as the `csrf_token` field of a
//! URL-encoded body, or it is rejected with 400 before any handler runs.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{trace, warn};
use url::form_urlencoded;

use crate::config::FormsConfig;
use crate::crypto::{constant_time_eq, generate_token};
use crate::errors::Error;
use crate::session::Session;
use crate::types::session_keys::CSRF_TOKEN;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "csrf_token";

/// The session's anti-forgery token, for embedding in rendered forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

impl<S: Send + Sync> FromRequestParts<S> for CsrfToken {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<CsrfToken>().cloned().ok_or_else(|| Error::Internal {
            operation: "read CSRF token: CSRF middleware is not installed on this route".to_string(),
        })
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
}

fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Implementation for csrf_guard. Returns the request, with its body restored, when it may
/// proceed.
pub(crate) async fn check_csrf(forms: &FormsConfig, mut request: Request) -> Result<Request, Error> {
    let session = request.extensions().get::<Session>().cloned().ok_or_else(|| Error::Internal {
        operation: "check CSRF token: session middleware must run first".to_string(),
    })?;

    let expected = match session.get_string(CSRF_TOKEN) {
        token if !token.is_empty() => token,
        _ => {
            let token = generate_token();
            session.put(CSRF_TOKEN, token.as_str());
            token
        }
    };

    if !is_safe(request.method()) {
        let submitted = match request.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok()) {
            Some(token) => Some(token.to_string()),
            None if is_form(request.headers()) => {
                let body = axum::body::to_bytes(std::mem::take(request.body_mut()), forms.max_body_bytes)
                    .await
                    .map_err(|_| Error::BadRequest {
                        message: "Failed to read request body".to_string(),
                    })?;
                let token = form_urlencoded::parse(&body)
                    .find(|(name, _)| name == CSRF_FIELD)
                    .map(|(_, value)| value.into_owned());
                *request.body_mut() = Body::from(body);
                token
            }
            None => None,
        };

        let valid = submitted.is_some_and(|s| constant_time_eq(s.as_bytes(), expected.as_bytes()));
        if !valid {
            warn!(method = %request.method(), uri = %request.uri(), "CSRF token missing or invalid");
            return Err(Error::BadRequest {
                message: "CSRF token missing or invalid".to_string(),
            });
        }
        trace!("CSRF token accepted");
    }

    request.extensions_mut().insert(CsrfToken(expected));
    Ok(request)
}

/// Reject unsafe-method requests whose CSRF token does not match the session's.
pub async fn csrf_guard(State(forms): State<FormsConfig>, request: Request, next: Next) -> Result<Response, Error> {
    let request = check_csrf(&forms, request).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryStore, SessionManager, load_and_save};
    use crate::test_utils::test_config;
    use axum::{
        Form, Router,
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::{get, post},
    };
    use axum_test::TestServer;
    use std::collections::HashMap;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    struct Harness {
        server: TestServer,
        handler_calls: Arc<AtomicUsize>,
    }

    fn harness(max_body_bytes: usize) -> Harness {
        let config = test_config();
        let sessions = SessionManager::new(Arc::new(MemoryStore::new()), config.session).unwrap();
        let handler_calls = Arc::new(AtomicUsize::new(0));
        let calls = handler_calls.clone();

        let app = Router::new()
            .route("/form", get(|CsrfToken(token): CsrfToken| async move { token }))
            .route(
                "/submit",
                post(move |Form(fields): Form<HashMap<String, String>>| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        fields.get("title").cloned().unwrap_or_default()
                    }
                }),
            )
            .layer(from_fn_with_state(FormsConfig { max_body_bytes }, csrf_guard))
            .layer(from_fn_with_state(sessions, load_and_save));

        Harness {
            server: TestServer::new(app).unwrap(),
            handler_calls,
        }
    }

    /// GET the form page and return (session cookie pair, csrf token).
    async fn prime(server: &TestServer) -> (String, String) {
        let response = server.get("/form").await;
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let pair = cookie.split(';').next().unwrap().to_string();
        (pair, response.text())
    }

    #[test]
    fn test_safe_methods() {
        assert!(is_safe(&Method::GET));
        assert!(is_safe(&Method::HEAD));
        assert!(is_safe(&Method::OPTIONS));
        assert!(!is_safe(&Method::POST));
        assert!(!is_safe(&Method::PUT));
        assert!(!is_safe(&Method::DELETE));
        assert!(!is_safe(&Method::PATCH));
    }

    #[tokio::test]
    async fn token_is_stable_within_session() {
        let h = harness(1024);
        let (cookie, token) = prime(&h.server).await;
        assert_eq!(token.len(), 43);

        let again = h.server.get("/form").add_header(header::COOKIE, cookie).await.text();
        assert_eq!(again, token);
    }

    #[tokio::test]
    async fn matching_form_token_reaches_handler_with_body_intact() {
        let h = harness(1024);
        let (cookie, token) = prime(&h.server).await;

        let response = h
            .server
            .post("/submit")
            .add_header(header::COOKIE, cookie)
            .form(&[("csrf_token", token.as_str()), ("title", "An old silent pond")])
            .await;

        response.assert_status_ok();
        response.assert_text("An old silent pond");
        assert_eq!(h.handler_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn matching_header_token_is_accepted() {
        let h = harness(1024);
        let (cookie, token) = prime(&h.server).await;

        h.server
            .post("/submit")
            .add_header(header::COOKIE, cookie)
            .add_header(CSRF_HEADER, token)
            .form(&[("title", "x")])
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn mismatched_token_is_rejected_before_handler() {
        let h = harness(1024);
        let (cookie, _token) = prime(&h.server).await;

        let response = h
            .server
            .post("/submit")
            .add_header(header::COOKIE, cookie)
            .form(&[("csrf_token", "forged"), ("title", "x")])
            .await;

        response.assert_status_bad_request();
        assert_eq!(h.handler_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let h = harness(1024);
        let (cookie, _token) = prime(&h.server).await;

        let response = h.server.post("/submit").add_header(header::COOKIE, cookie).form(&[("title", "x")]).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(h.handler_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_from_another_session_is_rejected() {
        let h = harness(1024);
        let (_victim_cookie, victim_token) = prime(&h.server).await;
        let (attacker_cookie, _) = prime(&h.server).await;

        h.server
            .post("/submit")
            .add_header(header::COOKIE, attacker_cookie)
            .form(&[("csrf_token", victim_token.as_str())])
            .await
            .assert_status_bad_request();
        assert_eq!(h.handler_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let h = harness(16);
        let (cookie, token) = prime(&h.server).await;

        h.server
            .post("/submit")
            .add_header(header::COOKIE, cookie)
            .form(&[("csrf_token", token.as_str()), ("title", "far more than sixteen bytes")])
            .await
            .assert_status_bad_request();
    }
}
