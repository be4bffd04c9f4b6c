//! Maps a session to the logged-in user through a short-lived cache.

use std::time::Duration;

use crate::cache::{keys, KvCache, ReadThrough};
use crate::db::models::User;
use crate::db::queries;
use crate::error::AppError;
use crate::state::DbPool;

/// Resolve `user_id` from the session to a [`User`].
///
/// Fails open: a missing id, unknown user, store error or cache error all
/// yield the anonymous user.
pub async fn resolve_user(
    db: &DbPool,
    cache: &dyn KvCache,
    ttl: Duration,
    user_id: Option<i64>,
) -> User {
    let Some(user_id) = user_id else {
        return User::default();
    };

    let memo = ReadThrough::new(cache, ttl);
    let lookup = memo
        .get_or_populate(&keys::user(user_id), || -> Result<User, AppError> {
            let conn = db.get()?;
            queries::user_by_id(&conn, user_id)?.ok_or(AppError::NotFound)
        })
        .await;

    match lookup {
        Ok(user) => user,
        Err(AppError::NotFound) => User::default(),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Session user lookup failed");
            User::default()
        }
    }
}
