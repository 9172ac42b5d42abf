//! Request pipelines.
//!
//! Every route sits behind the [standard](Chain::standard) chain: panic recovery, request
//! logging and common security headers. Page routes additionally run the
//! [dynamic](Chain::dynamic) chain, and routes that need a logged-in user the
//! [protected](Chain::protected) one:
//!
//! ```text
//! standard:  RecoverPanic -> LogRequest -> CommonHeaders
//! dynamic:   LoadAndSave -> CsrfGuard -> Authenticate
//! protected: LoadAndSave -> CsrfGuard -> Authenticate -> RequireAuthentication
//! ```
//!
//! Steps are listed outermost first. The CSRF guard reads its token from the session, so it
//! must follow `LoadAndSave`, and it must reject forged requests before identity is consulted.

use std::any::Any;
use std::convert::Infallible;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::{Next, from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::Route,
};
use futures::FutureExt;
use tower::{Layer, Service};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, HttpMakeClassifier, TraceLayer};
use tracing::{Level, error};

use crate::AppState;
use crate::auth::middleware::{authenticate, require_authentication};
use crate::csrf::csrf_guard;
use crate::session::load_and_save;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

/// One reusable request-processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RecoverPanic,
    LogRequest,
    CommonHeaders,
    LoadAndSave,
    CsrfGuard,
    Authenticate,
    RequireAuthentication,
}

/// An ordered list of steps, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    pub fn standard() -> Self {
        Self::new([Step::RecoverPanic, Step::LogRequest, Step::CommonHeaders])
    }

    pub fn dynamic() -> Self {
        Self::new([Step::LoadAndSave, Step::CsrfGuard, Step::Authenticate])
    }

    pub fn protected() -> Self {
        Self::dynamic().then(Step::RequireAuthentication)
    }

    /// Append a step, which then runs innermost.
    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Wrap the router's matched routes only; unmatched paths fall through untouched.
    pub fn wrap_routes<S>(&self, router: Router<S>, state: &AppState) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.wrap(router, state, Scope::MatchedRoutes)
    }

    /// Wrap the whole router, fallback included.
    pub fn wrap_all<S>(&self, router: Router<S>, state: &AppState) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.wrap(router, state, Scope::Everything)
    }

    fn wrap<S>(&self, router: Router<S>, state: &AppState, scope: Scope) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Each layer call wraps everything added so far, so go innermost first.
        self.steps.iter().rev().fold(router, |router, step| match step {
            Step::RecoverPanic => scope.attach(router, from_fn(recover_panic)),
            Step::LogRequest => scope.attach(router, trace_layer()),
            Step::CommonHeaders => scope.attach(router, from_fn(common_headers)),
            Step::LoadAndSave => scope.attach(router, from_fn_with_state(state.sessions.clone(), load_and_save)),
            Step::CsrfGuard => scope.attach(router, from_fn_with_state(state.config.forms.clone(), csrf_guard)),
            Step::Authenticate => scope.attach(router, from_fn_with_state(state.users.clone(), authenticate)),
            Step::RequireAuthentication => scope.attach(router, from_fn(require_authentication)),
        })
    }
}

/// Which requests a chain applies to.
#[derive(Debug, Clone, Copy)]
enum Scope {
    /// `route_layer`: only requests that matched a route
    MatchedRoutes,
    /// `layer`: every request, fallback included
    Everything,
}

impl Scope {
    fn attach<S, L>(self, router: Router<S>, layer: L) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        match self {
            Scope::MatchedRoutes => router.route_layer(layer),
            Scope::Everything => router.layer(layer),
        }
    }
}

fn trace_layer() -> TraceLayer<HttpMakeClassifier> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

/// Turn a panic anywhere further down the stack into a 500 and close the connection.
pub async fn recover_panic(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            error!(
                %method,
                %uri,
                panic = panic_message(payload.as_ref()),
                trace = %Backtrace::force_capture(),
                "Recovered from panic while serving request"
            );
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Internal Server Error",
            )
                .into_response();
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

/// Add the browser hardening headers every response carries.
pub async fn common_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("origin-when-cross-origin"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("deny"));
    headers.insert(header::X_XSS_PROTECTION, HeaderValue::from_static("0"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_state;
    use axum::routing::{get, post};
    use axum_test::TestServer;

    #[test]
    fn protected_chain_extends_dynamic_chain() {
        let protected = Chain::protected();
        assert_eq!(&protected.steps()[..3], Chain::dynamic().steps());
        assert_eq!(protected.steps().last(), Some(&Step::RequireAuthentication));
        assert_eq!(
            Chain::standard().steps(),
            &[Step::RecoverPanic, Step::LogRequest, Step::CommonHeaders]
        );
    }

    #[test_log::test(tokio::test)]
    async fn panic_becomes_internal_server_error() {
        let state = create_test_state().await;
        async fn explode() -> &'static str {
            panic!("handler exploded")
        }
        let router = Router::new().route("/boom", get(explode));
        let server = TestServer::new(Chain::standard().wrap_all(router, &state)).unwrap();

        let response = server.get("/boom").expect_failure().await;
        response.assert_status_internal_server_error();
        response.assert_text("Internal Server Error");
        assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
        // Headers from steps inside the recovery boundary are lost with the panic.
        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_none());

        // The server keeps serving afterwards.
        let again = server.get("/boom").expect_failure().await;
        again.assert_status_internal_server_error();
    }

    #[test_log::test(tokio::test)]
    async fn security_headers_on_every_response() {
        let state = create_test_state().await;
        let router = Router::new().route("/ok", get(|| async { "ok" }));
        let server = TestServer::new(Chain::standard().wrap_all(router, &state)).unwrap();

        for response in [server.get("/ok").await, server.get("/missing").expect_failure().await] {
            let headers = response.headers();
            assert_eq!(headers.get(header::CONTENT_SECURITY_POLICY).unwrap(), CONTENT_SECURITY_POLICY);
            assert_eq!(headers.get(header::REFERRER_POLICY).unwrap(), "origin-when-cross-origin");
            assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
            assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "deny");
            assert_eq!(headers.get(header::X_XSS_PROTECTION).unwrap(), "0");
        }
    }

    #[test_log::test(tokio::test)]
    async fn dynamic_chain_rejects_forgery_before_handler() {
        let state = create_test_state().await;
        let router = Router::new().route("/submit", post(|| async { "handled" }));
        let server = TestServer::new(Chain::dynamic().wrap_routes(router, &state)).unwrap();

        server
            .post("/submit")
            .form(&[("csrf_token", "forged")])
            .expect_failure()
            .await
            .assert_status_bad_request();
    }

    #[test_log::test(tokio::test)]
    async fn protected_chain_redirects_anonymous_visitors() {
        let state = create_test_state().await;
        let router = Router::new().route("/secret", get(|| async { "secret" }));
        let server = TestServer::new(Chain::protected().wrap_routes(router, &state)).unwrap();

        let response = server.get("/secret").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/user/login");
    }

    #[test_log::test(tokio::test)]
    async fn route_layers_leave_unmatched_paths_alone() {
        let state = create_test_state().await;
        let router = Router::new().route("/secret", get(|| async { "secret" }));
        let server = TestServer::new(Chain::protected().wrap_routes(router, &state)).unwrap();

        server.get("/elsewhere").expect_failure().await.assert_status_not_found();
    }
}
