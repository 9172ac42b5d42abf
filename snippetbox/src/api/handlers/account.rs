use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{info, instrument};

use super::{Page, end_authenticated_session, render};
use crate::AppState;
use crate::api::models::users::{AccountPasswordUpdateForm, WRONG_CURRENT_PASSWORD};
use crate::auth::credentials::CredentialError;
use crate::auth::current_user::CurrentUser;
use crate::auth::middleware::LOGIN_PATH;
use crate::errors::Error;
use crate::forms::{PostForm, Validated};

#[instrument(skip_all, fields(user_id = user_id))]
pub async fn view(State(state): State<AppState>, page: Page, CurrentUser(user_id): CurrentUser) -> Result<Response, Error> {
    let user = match state.users.get(user_id).await {
        Ok(user) => user,
        Err(CredentialError::NoRecord) => return Ok(Redirect::to(LOGIN_PATH).into_response()),
        Err(e) => return Err(e.into()),
    };

    let mut data = page.template_data();
    data.user = Some(user);
    render(&state, StatusCode::OK, "account.html", &data)
}

#[instrument(skip_all)]
pub async fn password_page(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    let data = page.form_data(&AccountPasswordUpdateForm::default())?;
    render(&state, StatusCode::OK, "password.html", &data)
}

/// Change the password, then log the user out everywhere this session was.
#[instrument(skip_all, fields(user_id = user_id))]
pub async fn password_update(
    State(state): State<AppState>,
    page: Page,
    CurrentUser(user_id): CurrentUser,
    PostForm(mut form): PostForm<AccountPasswordUpdateForm>,
) -> Result<Response, Error> {
    form.validate(&state.config.password);
    if !form.valid() {
        let data = page.form_data(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "password.html", &data);
    }

    match state
        .users
        .password_update(user_id, &form.current_password, &form.new_password)
        .await
    {
        Ok(()) => {}
        Err(CredentialError::InvalidCredentials) => {
            form.add_field_error("currentPassword", WRONG_CURRENT_PASSWORD);
            let data = page.form_data(&form)?;
            return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "password.html", &data);
        }
        Err(e) => return Err(e.into()),
    }

    info!("Password changed");
    let redirect = end_authenticated_session(
        &page.session,
        "Your password has been updated. Please log in again.",
        LOGIN_PATH,
    )
    .await?;
    Ok(redirect.into_response())
}
