use askama::Template;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::db::models::User;
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentSession, Me};
use crate::routes::Html;
use crate::state::AppState;

#[derive(Template)]
#[template(path = "banned.html")]
pub struct BannedTemplate {
    pub me: User,
    pub users: Vec<User>,
    pub csrf_token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/banned", get(banned_page).post(ban_users))
}

/// Gate for admin pages: anonymous visitors go to the login page, other
/// non-admins get 403.
fn require_admin(me: &User) -> AppResult<Option<Response>> {
    if !me.is_login() {
        return Ok(Some(Redirect::to("/login").into_response()));
    }
    if !me.is_admin() {
        return Err(AppError::Forbidden);
    }
    Ok(None)
}

pub async fn banned_page(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
) -> AppResult<Response> {
    if let Some(redirect) = require_admin(&me)? {
        return Ok(redirect);
    }

    let users = {
        let conn = state.db.get()?;
        queries::bannable_users(&conn)?
    };

    Ok(Html(BannedTemplate {
        me,
        users,
        csrf_token: current.csrf_token().to_string(),
    })
    .into_response())
}

/// Collected fields of the ban form. `uid[]` repeats once per checked user.
#[derive(Debug, Default, PartialEq)]
struct BanForm {
    csrf_token: String,
    user_ids: Vec<i64>,
}

fn parse_ban_form(body: &[u8]) -> BanForm {
    let mut form = BanForm::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "csrf_token" => form.csrf_token = value.into_owned(),
            "uid[]" => {
                if let Ok(id) = value.parse() {
                    form.user_ids.push(id);
                }
            }
            _ => {}
        }
    }
    form
}

pub async fn ban_users(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    body: Bytes,
) -> AppResult<Response> {
    if let Some(redirect) = require_admin(&me)? {
        return Ok(redirect);
    }

    let form = parse_ban_form(&body);
    current.verify_csrf(&form.csrf_token)?;

    {
        let conn = state.db.get()?;
        for user_id in &form.user_ids {
            queries::ban_user(&conn, *user_id)?;
        }
    }
    tracing::info!(admin_id = me.id, banned = ?form.user_ids, "Users banned");

    Ok(Redirect::to("/admin/banned").into_response())
}
