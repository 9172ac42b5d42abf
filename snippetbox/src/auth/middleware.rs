use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info};

use crate::auth::credentials::CredentialStore;
use crate::auth::current_user::Identity;
use crate::errors::Error;
use crate::session::Session;
use crate::types::session_keys::{AUTHENTICATED_USER_ID, REDIRECT_PATH_AFTER_LOGIN};

pub const LOGIN_PATH: &str = "/user/login";

/// Implementation for authenticate. Resolves the session's user id to an [`Identity`].
pub(crate) async fn resolve_identity(users: &CredentialStore, session: &Session) -> Result<Identity, Error> {
    let id = session.get_int(AUTHENTICATED_USER_ID);
    if id == 0 {
        return Ok(Identity::Anonymous);
    }

    if users.exists(id).await? {
        Ok(Identity::User(id))
    } else {
        info!(user_id = id, "Session refers to a user that no longer exists, clearing it");
        session.remove(AUTHENTICATED_USER_ID);
        Ok(Identity::Anonymous)
    }
}

/// Attach the request's [`Identity`] to its extensions.
pub async fn authenticate(State(users): State<CredentialStore>, mut request: Request, next: Next) -> Result<Response, Error> {
    let session = request.extensions().get::<Session>().cloned().ok_or_else(|| Error::Internal {
        operation: "resolve identity: session middleware must run first".to_string(),
    })?;

    let identity = resolve_identity(&users, &session).await?;
    debug!(?identity, "Resolved request identity");
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Redirect anonymous requests to the login page, remembering where they were headed.
///
/// This never authenticates anything itself; it trusts the [`Identity`] left by
/// [`authenticate`], and anything without one is anonymous.
pub async fn require_authentication(request: Request, next: Next) -> Result<Response, Error> {
    let identity = request.extensions().get::<Identity>().copied().unwrap_or_default();

    if !identity.is_authenticated() {
        let session = request.extensions().get::<Session>().ok_or_else(|| Error::Internal {
            operation: "stash login redirect: session middleware must run first".to_string(),
        })?;
        // Login resumes with a GET, so only GET targets are kept.
        if matches!(*request.method(), Method::GET | Method::HEAD) {
            let target = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri().path().to_string());
            session.put(REDIRECT_PATH_AFTER_LOGIN, target);
        }
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    }

    let mut response = next.run(request).await;
    // Pages behind login must not be served from a shared cache.
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}
