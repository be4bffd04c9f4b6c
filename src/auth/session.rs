use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::error::AppResult;
use crate::state::DbPool;

/// Server-side session bag referenced by the session cookie.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    pub token: String,
    pub user_id: Option<i64>,
    pub csrf_token: Option<String>,
    pub notice: Option<String>,
}

/// Create an empty session. Returns the session token.
pub fn create_session(pool: &DbPool, hours: u64) -> AppResult<String> {
    let conn = pool.get()?;
    let token = generate_token();

    conn.execute(
        "INSERT INTO sessions (token, expires_at) VALUES (?1, datetime('now', ?2))",
        params![token, format!("+{} hours", hours)],
    )?;

    Ok(token)
}

/// Load a session that has not expired.
pub fn load_session(pool: &DbPool, token: &str) -> AppResult<Option<SessionData>> {
    let conn = pool.get()?;
    let session = conn
        .query_row(
            "SELECT token, user_id, csrf_token, notice FROM sessions
             WHERE token = ?1 AND expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(SessionData {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    csrf_token: row.get(2)?,
                    notice: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(session)
}

/// Start an authenticated session for `user_id`, replacing `previous`.
/// Returns the new session token and its CSRF token.
pub fn start_login(
    pool: &DbPool,
    previous: Option<&str>,
    user_id: i64,
    hours: u64,
) -> AppResult<(String, String)> {
    let conn = pool.get()?;
    let token = generate_token();
    let csrf_token = generate_csrf_token();

    if let Some(previous) = previous {
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![previous])?;
    }
    conn.execute(
        "INSERT INTO sessions (token, user_id, csrf_token, expires_at)
         VALUES (?1, ?2, ?3, datetime('now', ?4))",
        params![token, user_id, csrf_token, format!("+{} hours", hours)],
    )?;

    Ok((token, csrf_token))
}

pub fn set_notice(pool: &DbPool, token: &str, notice: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "UPDATE sessions SET notice = ?2 WHERE token = ?1",
        params![token, notice],
    )?;
    Ok(())
}

/// Read and clear the one-shot notice.
pub fn take_notice(pool: &DbPool, token: &str) -> AppResult<Option<String>> {
    let conn = pool.get()?;
    let notice: Option<String> = conn
        .query_row(
            "SELECT notice FROM sessions WHERE token = ?1",
            params![token],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    if notice.is_some() {
        conn.execute(
            "UPDATE sessions SET notice = NULL WHERE token = ?1",
            params![token],
        )?;
    }
    Ok(notice)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

// -- Cookie helpers --

pub fn session_cookie(name: &str, token: &str, max_age_hours: u64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name,
        token,
        max_age_hours * 3600
    )
}

pub fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0", name)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// 16 random bytes as hex.
pub fn generate_csrf_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    fn setup() -> (tempfile::TempDir, DbPool) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = create_pool(&tmp.path().join("test.db")).unwrap();
        run_migrations(&pool).unwrap();
        (tmp, pool)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn csrf_token_is_32_lowercase_hex_chars() {
        let token = generate_csrf_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(token, generate_csrf_token());
    }

    #[test]
    fn anonymous_session_round_trip() {
        let (_tmp, pool) = setup();
        let token = create_session(&pool, 1).unwrap();

        let session = load_session(&pool, &token).unwrap().unwrap();
        assert_eq!(session.user_id, None);
        assert_eq!(session.csrf_token, None);
        assert!(load_session(&pool, "missing").unwrap().is_none());
    }

    #[test]
    fn notice_is_shown_once() {
        let (_tmp, pool) = setup();
        let token = create_session(&pool, 1).unwrap();

        set_notice(&pool, &token, "hello").unwrap();
        assert_eq!(take_notice(&pool, &token).unwrap().as_deref(), Some("hello"));
        assert_eq!(take_notice(&pool, &token).unwrap(), None);
    }

    #[test]
    fn login_rotates_the_token() {
        let (_tmp, pool) = setup();
        let anonymous = create_session(&pool, 1).unwrap();

        let (token, csrf) = start_login(&pool, Some(&anonymous), 42, 1).unwrap();
        assert_ne!(token, anonymous);
        assert!(load_session(&pool, &anonymous).unwrap().is_none());

        let session = load_session(&pool, &token).unwrap().unwrap();
        assert_eq!(session.user_id, Some(42));
        assert_eq!(session.csrf_token, Some(csrf));
    }

    #[test]
    fn expired_sessions_are_ignored() {
        let (_tmp, pool) = setup();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ('old', 1, datetime('now', '-1 hours'))",
            [],
        )
        .unwrap();
        drop(conn);

        assert!(load_session(&pool, "old").unwrap().is_none());
    }

    #[test]
    fn delete_session_logs_out() {
        let (_tmp, pool) = setup();
        let (token, _) = start_login(&pool, None, 1, 1).unwrap();
        delete_session(&pool, &token).unwrap();
        assert!(load_session(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn cookie_helpers() {
        assert_eq!(
            session_cookie("sid", "abc", 2),
            "sid=abc; HttpOnly; SameSite=Strict; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("sid").contains("Max-Age=0"));
    }
}
