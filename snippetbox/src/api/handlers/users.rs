use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, instrument};

use super::{Page, end_authenticated_session, render};
use crate::AppState;
use crate::api::models::users::{DUPLICATE_EMAIL, INVALID_CREDENTIALS, UserLoginForm, UserSignupForm};
use crate::auth::credentials::CredentialError;
use crate::auth::middleware::LOGIN_PATH;
use crate::errors::Error;
use crate::forms::{PostForm, Validated};
use crate::session::Session;
use crate::types::session_keys::{AUTHENTICATED_USER_ID, REDIRECT_PATH_AFTER_LOGIN};

#[instrument(skip_all)]
pub async fn signup_page(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    let data = page.form_data(&UserSignupForm::default())?;
    render(&state, StatusCode::OK, "signup.html", &data)
}

#[instrument(skip_all)]
pub async fn signup(State(state): State<AppState>, page: Page, PostForm(mut form): PostForm<UserSignupForm>) -> Result<Response, Error> {
    form.validate(&state.config.password);
    if !form.valid() {
        let data = page.form_data(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data);
    }

    match state.users.insert(&form.name, &form.email, &form.password).await {
        Ok(_) => {}
        Err(CredentialError::DuplicateEmail) => {
            form.add_field_error("email", DUPLICATE_EMAIL);
            let data = page.form_data(&form)?;
            return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "signup.html", &data);
        }
        Err(e) => return Err(e.into()),
    }

    page.flash("Your signup was successful. Please log in.");
    Ok(Redirect::to(LOGIN_PATH).into_response())
}

#[instrument(skip_all)]
pub async fn login_page(State(state): State<AppState>, page: Page) -> Result<Response, Error> {
    let data = page.form_data(&UserLoginForm::default())?;
    render(&state, StatusCode::OK, "login.html", &data)
}

#[instrument(skip_all)]
pub async fn login(State(state): State<AppState>, page: Page, PostForm(mut form): PostForm<UserLoginForm>) -> Result<Response, Error> {
    form.validate();
    if !form.valid() {
        let data = page.form_data(&form)?;
        return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data);
    }

    let user_id = match state.users.authenticate(&form.email, &form.password).await {
        Ok(id) => id,
        Err(CredentialError::InvalidCredentials) => {
            form.add_non_field_error(INVALID_CREDENTIALS);
            let data = page.form_data(&form)?;
            return render(&state, StatusCode::UNPROCESSABLE_ENTITY, "login.html", &data);
        }
        Err(e) => return Err(e.into()),
    };

    let session = &page.session;
    session.renew_token().await?;
    session.put(AUTHENTICATED_USER_ID, user_id);
    page.flash("You've been logged in successfully!");
    debug!(user_id, "User logged in");

    // Only ever a path stashed by the authorization gate, but never follow anything off-site.
    let target = session.pop_string(REDIRECT_PATH_AFTER_LOGIN);
    if target.starts_with('/') && !target.starts_with("//") {
        return Ok(Redirect::to(&target).into_response());
    }
    Ok(Redirect::to("/").into_response())
}

#[instrument(skip_all)]
pub async fn logout(session: Session) -> Result<Redirect, Error> {
    Ok(end_authenticated_session(&session, "You've been logged out successfully!", "/").await?)
}

#[cfg(test)]
mod tests {
    use crate::api::models::users::{DUPLICATE_EMAIL, INVALID_CREDENTIALS};
    use crate::test_utils::{TestClient, create_test_app, create_test_user};
    use crate::types::session_keys::AUTHENTICATED_USER_ID;
    use axum::http::{StatusCode, header};

    fn location(response: &axum_test::TestResponse) -> String {
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string()
    }

    async fn signup(client: &mut TestClient, name: &str, email: &str, password: &str) -> axum_test::TestResponse {
        client.get("/user/signup").await;
        client
            .post_form("/user/signup", &[("name", name), ("email", email), ("password", password)])
            .await
    }

    #[test_log::test(tokio::test)]
    async fn signup_redirects_to_login() {
        let (mut client, _state) = create_test_app().await;

        let response = signup(&mut client, "Bob", "bob@example.com", "validPa$$word").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/user/login");

        let login = client.get("/user/login").await;
        assert!(login.text().contains("Your signup was successful. Please log in."));
    }

    #[test_log::test(tokio::test)]
    async fn duplicate_signup_is_email_field_error() {
        let (mut client, _state) = create_test_app().await;
        signup(&mut client, "Bob", "bob@example.com", "validPa$$word")
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let response = signup(&mut client, "Bobby", "bob@example.com", "validPa$$word").await;
        response.assert_status_unprocessable_entity();
        let body = response.text();
        assert!(body.contains(DUPLICATE_EMAIL));
        // Non-sensitive input is preserved, the password is not.
        assert!(body.contains("value='Bobby'"));
        assert!(!body.contains("validPa$$word"));
    }

    #[test_log::test(tokio::test)]
    async fn invalid_signup_renders_field_errors() {
        let (mut client, state) = create_test_app().await;

        let response = signup(&mut client, "", "bob@", "short").await;
        response.assert_status_unprocessable_entity();
        let body = response.text();
        assert!(body.contains("This field cannot be blank"));
        assert!(body.contains("This field must be a valid email address"));
        assert!(body.contains("This field must be at least 8 characters long"));

        assert!(state.users.authenticate("bob@", "short").await.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn signup_without_csrf_token_never_reaches_handler() {
        let (client, state) = create_test_app().await;

        // No page was fetched, so there is no session and no token to echo.
        client
            .server
            .post("/user/signup")
            .form(&[("name", "Eve"), ("email", "eve@example.com"), ("password", "validPa$$word")])
            .expect_failure()
            .await
            .assert_status_bad_request();

        assert!(
            state.users.authenticate("eve@example.com", "validPa$$word").await.is_err(),
            "forged signup must not create a user"
        );
    }

    #[test_log::test(tokio::test)]
    async fn mismatched_csrf_token_is_rejected() {
        let (mut client, state) = create_test_app().await;
        create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;
        client.get("/user/login").await;

        let response = client
            .post_form(
                "/user/login",
                &[("email", "alice@example.com"), ("password", "pa$$word123"), ("csrf_token", "not-the-token")],
            )
            .await;
        response.assert_status_bad_request();
        assert!(response.headers().get(header::LOCATION).is_none());
    }

    #[test_log::test(tokio::test)]
    async fn login_renews_token_and_goes_home() {
        let (mut client, state) = create_test_app().await;
        let id = create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;

        client.get("/user/login").await;
        let before = client.session_token().map(str::to_string).expect("login page starts a session");

        let response = client.login("alice@example.com", "pa$$word123").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let after = client.session_token().map(str::to_string).expect("session kept after login");
        assert_ne!(before, after);
        assert!(state.sessions.store().find(&before).await.unwrap().is_none());
        let record = state.sessions.store().find(&after).await.unwrap().unwrap();
        assert_eq!(record.data[AUTHENTICATED_USER_ID], id);

        let home = client.get("/").await;
        let body = home.text();
        // Templates escape the apostrophe.
        assert!(body.contains("You&#x27;ve been logged in successfully!"));
        assert!(body.contains("Logout"));
    }

    #[test_log::test(tokio::test)]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (mut client, state) = create_test_app().await;
        create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;

        let wrong_password = client.login("alice@example.com", "not-her-password").await;
        wrong_password.assert_status_unprocessable_entity();
        let unknown_email = client.login("nobody@example.com", "pa$$word123").await;
        unknown_email.assert_status_unprocessable_entity();

        assert!(wrong_password.text().contains(INVALID_CREDENTIALS));
        assert!(unknown_email.text().contains(INVALID_CREDENTIALS));
    }

    #[test_log::test(tokio::test)]
    async fn protected_page_resumes_after_login() {
        let (mut client, state) = create_test_app().await;
        create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;

        let gate = client.get("/snippet/create").await;
        gate.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&gate), "/user/login");

        let response = client.login("alice@example.com", "pa$$word123").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/snippet/create");

        // The stashed target is used once.
        client.post_form("/user/logout", &[]).await;
        let again = client.login("alice@example.com", "pa$$word123").await;
        assert_eq!(location(&again), "/");
    }

    #[test_log::test(tokio::test)]
    async fn rejected_post_is_not_resumed_after_login() {
        let (mut client, state) = create_test_app().await;
        create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;

        // An anonymous visitor can still post to logout with a valid CSRF token.
        client.get("/user/login").await;
        let gate = client.post_form("/user/logout", &[]).await;
        gate.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&gate), "/user/login");

        let response = client.login("alice@example.com", "pa$$word123").await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        client.get(&location(&response)).await.assert_status_ok();
    }

    #[test_log::test(tokio::test)]
    async fn logout_renews_token_and_clears_identity() {
        let (mut client, state) = create_test_app().await;
        create_test_user(&state, "Alice", "alice@example.com", "pa$$word123").await;
        client.login("alice@example.com", "pa$$word123").await;
        let logged_in = client.session_token().map(str::to_string).unwrap();

        // Logout needs a token too; the home page hands one out.
        client.get("/").await;
        let response = client.post_form("/user/logout", &[]).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let logged_out = client.session_token().map(str::to_string).unwrap();
        assert_ne!(logged_in, logged_out);
        let record = state.sessions.store().find(&logged_out).await.unwrap().unwrap();
        assert!(!record.data.contains_key(AUTHENTICATED_USER_ID));

        let home = client.get("/").await;
        assert!(home.text().contains("You&#x27;ve been logged out successfully!"));
        client.get("/account/view").await.assert_status(StatusCode::SEE_OTHER);
    }

    #[test_log::test(tokio::test)]
    async fn logout_requires_login() {
        let (mut client, _state) = create_test_app().await;
        client.get("/user/login").await;
        let response = client.post_form("/user/logout", &[]).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/user/login");
    }
}
