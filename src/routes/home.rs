use askama::Template;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::db::models::{Post, User};
use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentSession, Me};
use crate::images::{validate_upload, UploadRejection};
use crate::routes::{redirect_with_notice, take_flash, Html};
use crate::state::AppState;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub me: User,
    pub posts: Vec<Post>,
    pub csrf_token: String,
    pub flash: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index).post(upload))
}

pub async fn index(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
) -> AppResult<Response> {
    let rows = {
        let conn = state.db.get()?;
        queries::timeline(&conn, None)?
    };
    let posts = state
        .hydrator()
        .make_posts(rows, current.csrf_token(), false)
        .await?;
    let flash = take_flash(&state, &current)?;

    Ok(Html(IndexTemplate {
        me,
        posts,
        csrf_token: current.csrf_token().to_string(),
        flash,
    })
    .into_response())
}

/// Fields of the upload form.
#[derive(Default)]
struct UploadForm {
    csrf_token: String,
    body: String,
    file: Option<(Option<String>, Vec<u8>)>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "csrf_token" => form.csrf_token = field.text().await?,
            "body" => form.body = field.text().await?,
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                // A file input left empty still sends an unnamed, empty part.
                if !data.is_empty() {
                    form.file = Some((content_type, data.to_vec()));
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

pub async fn upload(
    State(state): State<AppState>,
    current: CurrentSession,
    Me(me): Me,
    multipart: Multipart,
) -> AppResult<Response> {
    if !me.is_login() {
        return Ok(Redirect::to("/login").into_response());
    }

    let form = match read_upload_form(multipart).await {
        Ok(form) => form,
        // The body cap cut the upload short; nothing was stored.
        Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::info!(user_id = me.id, "Upload rejected: body limit exceeded");
            let notice = UploadRejection::TooLarge.to_string();
            return redirect_with_notice(&state, &current, "/", &notice);
        }
        Err(e) => return Err(AppError::BadRequest(e.body_text())),
    };
    current.verify_csrf(&form.csrf_token)?;

    let (content_type, data) = match form.file {
        Some(file) => file,
        None => {
            let notice = UploadRejection::Missing.to_string();
            return redirect_with_notice(&state, &current, "/", &notice);
        }
    };

    let kind = match validate_upload(content_type.as_deref(), data.len()) {
        Ok(kind) => kind,
        Err(rejection) => {
            tracing::info!(user_id = me.id, size = data.len(), "Upload rejected: {}", rejection);
            return redirect_with_notice(&state, &current, "/", &rejection.to_string());
        }
    };

    let post_id = {
        let conn = state.db.get()?;
        queries::insert_post(&conn, me.id, kind.mime(), &data, &form.body)?
    };
    tracing::info!(post_id, user_id = me.id, "Post created");

    if let Err(e) = state.images.write(post_id, kind, &data).await {
        tracing::warn!(post_id, error = %e, "Failed to mirror image");
    }

    Ok(Redirect::to(&format!("/posts/{}", post_id)).into_response())
}
