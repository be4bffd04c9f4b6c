use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::resolve_user;
use crate::auth::session::{load_session, SessionData};
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// The server-side session named by the request's cookie, if any.
///
/// Loaded at most once per request and shared through the request
/// extensions. A session that cannot be loaded is treated as absent.
#[derive(Debug, Clone, Default)]
pub struct CurrentSession(pub Option<SessionData>);

impl CurrentSession {
    pub fn token(&self) -> Option<&str> {
        self.0.as_ref().map(|s| s.token.as_str())
    }

    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().and_then(|s| s.user_id)
    }

    /// The CSRF token to embed in forms. Empty for anonymous sessions.
    pub fn csrf_token(&self) -> &str {
        self.0
            .as_ref()
            .and_then(|s| s.csrf_token.as_deref())
            .unwrap_or("")
    }

    /// Exact comparison of a submitted form token with the stored one.
    pub fn verify_csrf(&self, submitted: &str) -> AppResult<()> {
        match self.0.as_ref().and_then(|s| s.csrf_token.as_deref()) {
            Some(expected) if expected == submitted => Ok(()),
            _ => Err(AppError::InvalidCsrf),
        }
    }
}

impl FromRequestParts<AppState> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<CurrentSession>() {
            return Ok(session.clone());
        }

        let session = match get_cookie_value(parts, &state.config.auth.cookie_name) {
            Some(token) => match load_session(&state.db, token) {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load session");
                    None
                }
            },
            None => None,
        };

        let session = CurrentSession(session);
        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

/// The logged-in user, or the anonymous default user (id 0).
#[derive(Debug, Clone)]
pub struct Me(pub User);

impl FromRequestParts<AppState> for Me {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = CurrentSession::from_request_parts(parts, state).await?;
        let user = resolve_user(
            &state.db,
            state.cache.as_ref(),
            state.cache_ttl(),
            session.user_id(),
        )
        .await;
        Ok(Me(user))
    }
}

fn get_cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_cookie(cookie: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let parts = parts_with_cookie("theme=dark; iscogram_session=abc123; lang=en");
        assert_eq!(get_cookie_value(&parts, "iscogram_session"), Some("abc123"));
        assert_eq!(get_cookie_value(&parts, "missing"), None);
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        let parts = parts_with_cookie("iscogram_session=");
        assert_eq!(get_cookie_value(&parts, "iscogram_session"), None);
    }

    #[test]
    fn csrf_must_match_exactly() {
        let session = CurrentSession(Some(SessionData {
            token: "t".into(),
            user_id: Some(1),
            csrf_token: Some("deadbeef".into()),
            notice: None,
        }));
        assert!(session.verify_csrf("deadbeef").is_ok());
        assert!(matches!(session.verify_csrf("DEADBEEF"), Err(AppError::InvalidCsrf)));
        assert!(matches!(session.verify_csrf(""), Err(AppError::InvalidCsrf)));
    }

    #[test]
    fn anonymous_session_rejects_any_csrf_token() {
        let session = CurrentSession::default();
        assert_eq!(session.csrf_token(), "");
        assert!(session.verify_csrf("").is_err());
        assert_eq!(session.user_id(), None);
    }
}
