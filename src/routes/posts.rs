use askama::Template;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;

use crate::cache::{keys, ReadThrough};
use crate::db::models::{Post, User};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentSession, Me};
use crate::routes::Html;
use crate::state::AppState;

/// Bare list of posts appended by the pager; rendered without the layout.
#[derive(Template)]
#[template(path = "posts.html")]
pub struct PostsTemplate {
    pub posts: Vec<Post>,
}

#[derive(Template)]
#[template(path = "post_id.html")]
pub struct PostTemplate {
    pub me: User,
    pub post: Post,
}

#[derive(Deserialize)]
pub struct PagerQuery {
    pub max_created_at: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub post_id: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub csrf_token: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(older_posts))
        .route("/posts/{id}", get(show_post))
        .route("/comment", post(create_comment))
}

/// Parse the pager bound. Offsets are folded into UTC, the zone timestamps
/// are stored in.
fn parse_max_created_at(raw: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_utc())
}

pub async fn older_posts(
    State(state): State<AppState>,
    current: CurrentSession,
    Query(query): Query<PagerQuery>,
) -> AppResult<Response> {
    let raw = match query.max_created_at.as_deref() {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(().into_response()),
    };
    let max_created_at = parse_max_created_at(raw)
        .ok_or_else(|| AppError::BadRequest("max_created_at must be an ISO 8601 timestamp".into()))?;

    let rows = {
        let conn = state.db.get()?;
        queries::timeline(&conn, Some(&max_created_at))?
    };
    let posts = state
        .hydrator()
        .make_posts(rows, current.csrf_token(), false)
        .await?;

    if posts.is_empty() {
        return Err(AppError::NotFound);
    }

    Ok(Html(PostsTemplate { posts }).into_response())
}

pub async fn show_post(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let post_id: i64 = id.parse().map_err(|_| AppError::NotFound)?;

    let rows = {
        let conn = state.db.get()?;
        queries::post_by_id(&conn, post_id)?
    };
    let post = state
        .hydrator()
        .make_posts(rows, current.csrf_token(), true)
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound)?;

    Ok(Html(PostTemplate { me, post }).into_response())
}

pub async fn create_comment(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    if !me.is_login() {
        return Ok(Redirect::to("/login").into_response());
    }

    current.verify_csrf(&form.csrf_token)?;

    let post_id: i64 = form
        .post_id
        .parse()
        .map_err(|_| AppError::BadRequest("post_id must be an integer".into()))?;

    let comment_id = {
        let conn = state.db.get()?;
        queries::insert_comment(&conn, post_id, me.id, &form.comment)?
    };
    tracing::info!(comment_id, post_id, user_id = me.id, "Comment created");

    ReadThrough::new(state.cache.as_ref(), state.cache_ttl())
        .evict(&keys::post_comments(post_id))
        .await;

    Ok(Redirect::to(&format!("/posts/{}", post_id)).into_response())
}
