use axum::{extract::State, http::StatusCode, response::Response};
use tracing::instrument;

use super::{Page, render};
use crate::AppState;
use crate::errors::Error;

pub async fn ping() -> &'static str {
    "OK"
}

#[instrument(skip_all)]
pub async fn home(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    let mut data = page.template_data();
    data.snippets = state.snippets.latest();
    render(&state, StatusCode::OK, "home.html", &data)
}

#[instrument(skip_all)]
pub async fn about(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    render(&state, StatusCode::OK, "about.html", &page.template_data())
}
