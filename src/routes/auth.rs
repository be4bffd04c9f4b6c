use askama::Template;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::{password, session};
use crate::db::models::User;
use crate::db::queries;
use crate::error::AppResult;
use crate::extractors::{CurrentSession, Me};
use crate::routes::{redirect_with_notice, take_flash, Html};
use crate::state::AppState;

const LOGIN_FAILED: &str = "Account name or password is incorrect";
const INVALID_CREDENTIALS: &str =
    "Account names need at least 3 characters and passwords at least 6";
const ACCOUNT_TAKEN: &str = "That account name is already taken";

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub me: User,
    pub flash: String,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub me: User,
    pub flash: String,
}

#[derive(Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        .route("/logout", get(logout))
}

pub async fn login_page(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
) -> AppResult<Response> {
    if me.is_login() {
        return Ok(Redirect::to("/").into_response());
    }

    let flash = take_flash(&state, &current)?;
    Ok(Html(LoginTemplate { me, flash }).into_response())
}

pub async fn login(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    if me.is_login() {
        return Ok(Redirect::to("/").into_response());
    }

    let user = {
        let conn = state.db.get()?;
        queries::active_user_by_account_name(&conn, &form.account_name)?
    };

    match user {
        Some(user) if password::verify(&form.account_name, &form.password, &user.passhash) => {
            tracing::info!(user_id = user.id, "User logged in");
            sign_in(&state, &current, user.id)
        }
        _ => redirect_with_notice(&state, &current, "/login", LOGIN_FAILED),
    }
}

pub async fn register_page(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
) -> AppResult<Response> {
    if me.is_login() {
        return Ok(Redirect::to("/").into_response());
    }

    let flash = take_flash(&state, &current)?;
    Ok(Html(RegisterTemplate { me, flash }).into_response())
}

pub async fn register(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    Form(form): Form<CredentialsForm>,
) -> AppResult<Response> {
    if me.is_login() {
        return Ok(Redirect::to("/").into_response());
    }

    if !password::validate_user(&form.account_name, &form.password) {
        return redirect_with_notice(&state, &current, "/register", INVALID_CREDENTIALS);
    }

    let user_id = {
        let conn = state.db.get()?;
        if queries::account_exists(&conn, &form.account_name)? {
            None
        } else {
            let passhash = password::calculate_passhash(&form.account_name, &form.password);
            Some(queries::insert_user(&conn, &form.account_name, &passhash)?)
        }
    };

    match user_id {
        Some(user_id) => {
            tracing::info!(user_id, account_name = %form.account_name, "User registered");
            sign_in(&state, &current, user_id)
        }
        None => redirect_with_notice(&state, &current, "/register", ACCOUNT_TAKEN),
    }
}

pub async fn logout(State(state): State<AppState>, current: CurrentSession) -> AppResult<Response> {
    if let Some(token) = current.token() {
        session::delete_session(&state.db, token)?;
    }

    let cookie = session::clear_session_cookie(&state.config.auth.cookie_name);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}

/// Rotate the visitor's session into an authenticated one and go home.
fn sign_in(state: &AppState, current: &CurrentSession, user_id: i64) -> AppResult<Response> {
    let hours = state.config.auth.session_hours;
    let (token, _csrf_token) = session::start_login(&state.db, current.token(), user_id, hours)?;
    let cookie = session::session_cookie(&state.config.auth.cookie_name, &token, hours);

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response())
}
