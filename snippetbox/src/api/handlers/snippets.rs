use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{info, instrument};

use super::{Page, render};
use crate::AppState;
use crate::api::models::snippets::SnippetCreateForm;
use crate::auth::current_user::CurrentUser;
use crate::errors::Error;
use crate::forms::{PostForm, Validated};
use crate::types::SnippetId;

#[instrument(skip(state, page))]
pub async fn view(State(state): State<AppState>, page: Page, Path(id): Path<String>) -> Result<Response, Error> {
    let not_found = || Error::NotFound {
        resource: "Snippet".to_string(),
        id: id.clone(),
    };

    let snippet_id = id.parse::<SnippetId>().ok().filter(|id| *id >= 1).ok_or_else(not_found)?;
    let snippet = state.snippets.get(snippet_id).ok_or_else(not_found)?;

    let mut data = page.template_data();
    data.snippet = Some(snippet);
    render(&state, StatusCode::OK, "view.html", &data)
}

#[instrument(skip_all)]
pub async fn create_page(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    let data = page.form_data(&SnippetCreateForm::default())?;
    render(&state, StatusCode::OK, "create.html", &data)
}

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn create(
    State(state): State<AppState>,
    page: Page,
    CurrentUser(user_id): CurrentUser,
    PostForm(mut form): PostForm<SnippetCreateForm>,
) -> Result<Response, Error> {
    form.validate();
    if !form.valid() {
        let data = page.form_data(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "create.html", &data);
    }

    let id = state.snippets.insert(&form.title, &form.content, form.expires);
    info!(snippet_id = id, "Snippet created");

    page.flash("Snippet successfully created!");
    Ok(Redirect::to(&format!("/snippet/view/{id}")).into_response())
}
