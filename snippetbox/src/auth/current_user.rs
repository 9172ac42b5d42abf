//! Resolved identity for the current request.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::errors::Error;
use crate::types::UserId;

/// Who the authentication middleware decided this request is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    User(UserId),
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User(_))
    }
}

/// Routes outside the dynamic chain never see the resolver, so they read as anonymous.
impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().copied().unwrap_or_default())
    }
}

/// Extractor for handlers that need an authenticated user. Anonymous requests are rejected
/// with a redirect to the login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Identity>() {
            Some(Identity::User(id)) => Ok(CurrentUser(*id)),
            _ => Err(Error::Unauthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(identity: Option<Identity>) -> Parts {
        let (mut parts, _) = Request::new(()).into_parts();
        if let Some(identity) = identity {
            parts.extensions.insert(identity);
        }
        parts
    }

    #[tokio::test]
    async fn missing_identity_is_anonymous() {
        let mut parts = parts_with(None);
        let identity = Identity::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(identity, Identity::Anonymous);
        assert!(!identity.is_authenticated());
    }

    #[tokio::test]
    async fn current_user_requires_user_identity() {
        let mut parts = parts_with(Some(Identity::User(7)));
        assert_eq!(CurrentUser::from_request_parts(&mut parts, &()).await.unwrap(), CurrentUser(7));

        let mut parts = parts_with(Some(Identity::Anonymous));
        assert!(matches!(
            CurrentUser::from_request_parts(&mut parts, &()).await,
            Err(Error::Unauthenticated)
        ));
    }
}
