use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::images::{parse_image_file, ImageKind};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/image/{file}", get(serve))
}

/// Serve `/image/{id}.{ext}` from the database when the extension agrees
/// with the stored MIME type. The filesystem mirror is restored on the way
/// out.
pub async fn serve(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    let (post_id, ext) = parse_image_file(&file).ok_or(AppError::NotFound)?;

    let image = {
        let conn = state.db.get()?;
        queries::image_by_post_id(&conn, post_id)?
    }
    .ok_or(AppError::NotFound)?;

    let kind = match (ImageKind::from_ext(ext), ImageKind::from_mime(&image.mime)) {
        (Some(requested), Some(stored)) if requested == stored => stored,
        _ => return Err(AppError::NotFound),
    };

    state.images.ensure(post_id, kind, &image.imgdata).await;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, kind.mime())],
        image.imgdata,
    )
        .into_response())
}
