//! Form decoding and validation.
//!
//! Form types live with their handlers in [`crate::api::models`]; each embeds a
//! [`Validator`] and implements [`Validated`] to expose it.

pub mod validator;

pub use validator::{Validated, Validator};

use axum::{
    Form,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::errors::Error;

/// `axum::Form`, but a body that cannot be decoded is a plain 400 rather than axum's 422,
/// which is reserved here for forms that decoded and then failed validation.
#[derive(Debug, Clone)]
pub struct PostForm<T>(pub T);

impl<T, S> FromRequest<S> for PostForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(PostForm(value)),
            Err(rejection) => Err(Error::BadRequest {
                message: rejection.body_text(),
            }),
        }
    }
}
