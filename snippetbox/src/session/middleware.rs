use axum::{
    extract::{Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};

use super::SessionManager;
use crate::errors::Error;

/// Load the visitor's session before the inner service runs and save it afterwards.
///
/// Saving happens whatever the inner status code, so flash messages and CSRF
/// tokens written on an error path still persist.
pub async fn load_and_save(State(sessions): State<SessionManager>, mut request: Request, next: Next) -> Result<Response, Error> {
    let token = sessions.token_from_headers(request.headers());
    let session = sessions.load(token.as_deref()).await?;
    request.extensions_mut().insert(session.clone());

    let mut response = next.run(request).await;

    if let Some(cookie) = sessions.save(&session).await? {
        let headers = response.headers_mut();
        headers.append(header::SET_COOKIE, cookie);
        headers.append(header::VARY, HeaderValue::from_static("Cookie"));
        // Keep a stricter policy set further in, such as no-store on protected pages.
        headers
            .entry(header::CACHE_CONTROL)
            .or_insert(HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryStore, Session};
    use crate::test_utils::test_config;
    use axum::{Router, middleware::from_fn_with_state, routing::get};
    use axum_test::TestServer;
    use std::sync::Arc;

    fn app() -> Router {
        let sessions = SessionManager::new(Arc::new(MemoryStore::new()), test_config().session).unwrap();
        Router::new()
            .route(
                "/put",
                get(|session: Session| async move {
                    session.put("visits", session.get_int("visits") + 1);
                    "ok"
                }),
            )
            .route("/read", get(|session: Session| async move { session.get_int("visits").to_string() }))
            .layer(from_fn_with_state(sessions, load_and_save))
    }

    #[tokio::test]
    async fn session_survives_between_requests() {
        let server = TestServer::new(app()).unwrap();

        let first = server.get("/put").await;
        let cookie = first.headers().get(header::SET_COOKIE).expect("set-cookie").to_str().unwrap().to_string();
        let pair = cookie.split(';').next().unwrap().to_string();

        server.get("/put").add_header(header::COOKIE, pair.clone()).await;
        let read = server.get("/read").add_header(header::COOKIE, pair).await;
        read.assert_text("2");
    }

    #[tokio::test]
    async fn read_only_request_sets_no_cookie() {
        let server = TestServer::new(app()).unwrap();
        let response = server.get("/read").await;
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        response.assert_text("0");
    }

    #[tokio::test]
    async fn handler_without_middleware_gets_internal_error() {
        let app = Router::new().route("/read", get(|session: Session| async move { session.get_int("visits").to_string() }));
        let server = TestServer::new(app).unwrap();
        server.get("/read").expect_failure().await.assert_status_internal_server_error();
    }
}
