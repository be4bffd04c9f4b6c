pub mod admin;
pub mod assets;
pub mod auth;
pub mod home;
pub mod image;
pub mod initialize;
pub mod posts;

use askama::Template;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::session;
use crate::error::AppResult;
use crate::extractors::CurrentSession;
use crate::state::AppState;

/// The full application router with shared state attached.
pub fn app(state: AppState) -> Router {
    let body_limit = state.config.storage.body_limit_bytes;

    Router::new()
        .merge(initialize::router())
        .merge(auth::router())
        .merge(home::router())
        .merge(posts::router())
        .merge(image::router())
        .merge(admin::router())
        .fallback(assets::fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Leave a one-shot notice on the visitor's session and redirect. Visitors
/// without a session get a fresh anonymous one to carry the notice.
pub fn redirect_with_notice(
    state: &AppState,
    current: &CurrentSession,
    to: &str,
    notice: &str,
) -> AppResult<Response> {
    if let Some(token) = current.token() {
        session::set_notice(&state.db, token, notice)?;
        return Ok(Redirect::to(to).into_response());
    }

    let hours = state.config.auth.session_hours;
    let token = session::create_session(&state.db, hours)?;
    session::set_notice(&state.db, &token, notice)?;
    let cookie = session::session_cookie(&state.config.auth.cookie_name, &token, hours);

    Ok(([(header::SET_COOKIE, cookie)], Redirect::to(to)).into_response())
}

/// Read and clear the visitor's pending notice.
pub fn take_flash(state: &AppState, current: &CurrentSession) -> AppResult<String> {
    match current.token() {
        Some(token) => Ok(session::take_notice(&state.db, token)?.unwrap_or_default()),
        None => Ok(String::new()),
    }
}
