use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::db;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/initialize", get(initialize))
}

/// Reset the store to its seed state and drop every cached entry.
pub async fn initialize(State(state): State<AppState>) -> AppResult<StatusCode> {
    db::reset_to_seed(&state.db)?;
    state.cache.flush().await?;
    tracing::info!("Store reset to seed state");
    Ok(StatusCode::OK)
}
