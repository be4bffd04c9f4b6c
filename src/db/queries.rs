//! Relational queries. All functions are synchronous and take a borrowed
//! connection; callers scope the pooled connection so it is never held
//! across an `.await`.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Comment, ImageRecord, Post, ProfileStats, User};

/// Number of posts on one page of the timeline.
pub const POSTS_PER_PAGE: usize = 20;

/// Comments shown per post in listings.
pub const RECENT_COMMENTS: usize = 3;

const POST_COLUMNS: &str = "p.id, p.user_id, p.body, p.mime, p.created_at,
    u.id, u.account_name, u.authority, u.del_flg, u.created_at";

const USER_COLUMNS: &str = "id, account_name, passhash, authority, del_flg, created_at";

/// Timestamps are stored at second precision in this text form.
pub fn db_time(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        account_name: row.get(1)?,
        passhash: row.get(2)?,
        authority: row.get(3)?,
        del_flg: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        body: row.get(2)?,
        mime: row.get(3)?,
        created_at: row.get(4)?,
        user: User {
            id: row.get(5)?,
            account_name: row.get(6)?,
            passhash: String::new(),
            authority: row.get(7)?,
            del_flg: row.get(8)?,
            created_at: row.get(9)?,
        },
        ..Post::default()
    })
}

// -- Users --

pub fn user_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        params![id],
        user_from_row,
    )
    .optional()
}

/// Look up a user that has not been banned.
pub fn active_user_by_account_name(
    conn: &Connection,
    account_name: &str,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM users WHERE account_name = ?1 AND del_flg = 0",
            USER_COLUMNS
        ),
        params![account_name],
        user_from_row,
    )
    .optional()
}

pub fn account_exists(conn: &Connection, account_name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE account_name = ?1",
        params![account_name],
        |row| row.get(0),
    )
}

pub fn insert_user(conn: &Connection, account_name: &str, passhash: &str) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO users (account_name, passhash) VALUES (?1, ?2)",
        params![account_name, passhash],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Normal-authority users that are not banned, newest first.
pub fn bannable_users(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE authority = 0 AND del_flg = 0 ORDER BY created_at DESC, id DESC",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn ban_user(conn: &Connection, user_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET del_flg = 1 WHERE id = ?1",
        params![user_id],
    )?;
    Ok(())
}

// -- Posts --

/// Newest posts from users that are not banned, optionally no newer than
/// `max_created_at`.
pub fn timeline(
    conn: &Connection,
    max_created_at: Option<&NaiveDateTime>,
) -> rusqlite::Result<Vec<Post>> {
    let posts = match max_created_at {
        Some(max) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts p
                 JOIN users u ON p.user_id = u.id
                 WHERE u.del_flg = 0 AND p.created_at <= ?1
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?2",
                POST_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![db_time(max), POSTS_PER_PAGE as i64], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM posts p
                 JOIN users u ON p.user_id = u.id
                 WHERE u.del_flg = 0
                 ORDER BY p.created_at DESC, p.id DESC
                 LIMIT ?1",
                POST_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![POSTS_PER_PAGE as i64], post_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        }
    };
    Ok(posts)
}

/// A single post whose owner is not banned. Returned as a list so it can be
/// fed straight to the hydrator.
pub fn post_by_id(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts p
         JOIN users u ON p.user_id = u.id
         WHERE u.del_flg = 0 AND p.id = ?1",
        POST_COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![post_id], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Every post of one user, newest first. The hydrator truncates to a page.
pub fn posts_by_user(conn: &Connection, user_id: i64) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM posts p
         JOIN users u ON p.user_id = u.id
         WHERE u.del_flg = 0 AND u.id = ?1
         ORDER BY p.created_at DESC, p.id DESC",
        POST_COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![user_id], post_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn insert_post(
    conn: &Connection,
    user_id: i64,
    mime: &str,
    imgdata: &[u8],
    body: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO posts (user_id, mime, imgdata, body) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, mime, imgdata, body],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Image payload of any post, regardless of the owner's ban state.
pub fn image_by_post_id(conn: &Connection, post_id: i64) -> rusqlite::Result<Option<ImageRecord>> {
    conn.query_row(
        "SELECT mime, imgdata FROM posts WHERE id = ?1",
        params![post_id],
        |row| {
            Ok(ImageRecord {
                mime: row.get(0)?,
                imgdata: row.get(1)?,
            })
        },
    )
    .optional()
}

// -- Comments --

pub fn comment_count(conn: &Connection, post_id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}

/// Comments of a post joined with their authors, newest first. Limited to
/// the latest [`RECENT_COMMENTS`] unless `all_comments` is set.
pub fn comments_for_post(
    conn: &Connection,
    post_id: i64,
    all_comments: bool,
) -> rusqlite::Result<Vec<Comment>> {
    let mut sql = String::from(
        "SELECT c.id, c.post_id, c.user_id, c.comment, c.created_at,
                u.id, u.account_name, u.authority, u.del_flg, u.created_at
         FROM comments c
         JOIN users u ON c.user_id = u.id
         WHERE c.post_id = ?1
         ORDER BY c.created_at DESC, c.id DESC",
    );
    if !all_comments {
        sql.push_str(&format!(" LIMIT {}", RECENT_COMMENTS));
    }

    let mut stmt = conn.prepare(&sql)?;
    let comments = stmt
        .query_map(params![post_id], |row| {
            Ok(Comment {
                id: row.get(0)?,
                post_id: row.get(1)?,
                user_id: row.get(2)?,
                comment: row.get(3)?,
                created_at: row.get(4)?,
                user: User {
                    id: row.get(5)?,
                    account_name: row.get(6)?,
                    passhash: String::new(),
                    authority: row.get(7)?,
                    del_flg: row.get(8)?,
                    created_at: row.get(9)?,
                },
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn insert_comment(
    conn: &Connection,
    post_id: i64,
    user_id: i64,
    comment: &str,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO comments (post_id, user_id, comment) VALUES (?1, ?2, ?3)",
        params![post_id, user_id, comment],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn profile_stats(conn: &Connection, user_id: i64) -> rusqlite::Result<ProfileStats> {
    let post_count = conn.query_row(
        "SELECT COUNT(*) FROM posts WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let comment_count = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    let commented_count = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
        params![user_id],
        |row| row.get(0),
    )?;

    Ok(ProfileStats {
        post_count,
        comment_count,
        commented_count,
    })
}
