use askama::Template;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use once_cell::sync::Lazy;
use regex::Regex;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::db::models::{Post, ProfileStats, User};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentSession, Me};
use crate::routes::Html;
use crate::state::AppState;

static PROFILE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\A/@([0-9a-zA-Z_]+)\z").unwrap());

#[derive(Template)]
#[template(path = "user.html")]
pub struct UserTemplate {
    pub me: User,
    pub user: User,
    pub posts: Vec<Post>,
    pub stats: ProfileStats,
}

/// Anything no route claimed: `/@{account}` profiles, then files from the
/// public directory.
pub async fn fallback(
    State(state): State<AppState>,
    current: CurrentSession,
    me: Me,
    req: Request,
) -> AppResult<Response> {
    let account = PROFILE_PATH
        .captures(req.uri().path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    match account {
        Some(account) => profile(&state, &current, me, &account).await,
        None => serve_public(&state, req).await,
    }
}

async fn profile(
    state: &AppState,
    current: &CurrentSession,
    Me(me): Me,
    account: &str,
) -> AppResult<Response> {
    let (user, rows, stats) = {
        let conn = state.db.get()?;
        let user = queries::active_user_by_account_name(&conn, account)?.ok_or(AppError::NotFound)?;
        let rows = queries::posts_by_user(&conn, user.id)?;
        let stats = queries::profile_stats(&conn, user.id)?;
        (user, rows, stats)
    };

    let posts = state
        .hydrator()
        .make_posts(rows, current.csrf_token(), false)
        .await?;

    Ok(Html(UserTemplate {
        me,
        user,
        posts,
        stats,
    })
    .into_response())
}

async fn serve_public(state: &AppState, req: Request) -> AppResult<Response> {
    let service = ServeDir::new(state.config.public_dir());
    match service.oneshot(req).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
