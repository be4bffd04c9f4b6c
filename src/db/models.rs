use chrono::{NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::images::ImageKind;

/// Authority value of an administrator.
pub const AUTHORITY_ADMIN: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub account_name: String,
    /// Never written to the cache.
    #[serde(skip)]
    pub passhash: String,
    pub authority: i64,
    pub del_flg: i64,
    pub created_at: NaiveDateTime,
}

impl User {
    /// The anonymous user has id 0.
    pub fn is_login(&self) -> bool {
        self.id != 0
    }

    pub fn is_admin(&self) -> bool {
        self.authority == AUTHORITY_ADMIN
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub comment: String,
    pub created_at: NaiveDateTime,
    pub user: User,
}

/// A post as shown in listings. The image payload is not loaded here; the
/// comment fields and CSRF token are filled in per request.
#[derive(Debug, Clone, Default)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub body: String,
    pub mime: String,
    pub created_at: NaiveDateTime,
    pub user: User,
    pub comment_count: i64,
    pub comments: Vec<Comment>,
    pub csrf_token: String,
}

impl Post {
    pub fn image_url(&self) -> String {
        let ext = ImageKind::from_mime(&self.mime)
            .map(|kind| format!(".{}", kind.ext()))
            .unwrap_or_default();
        format!("/image/{}{}", self.id, ext)
    }

    /// ISO-8601 timestamp used by the `max_created_at` pager.
    pub fn created_at_iso(&self) -> String {
        iso8601(&self.created_at)
    }
}

/// Raw image row served by `/image/{id}.{ext}`.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub mime: String,
    pub imgdata: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfileStats {
    pub post_count: i64,
    /// Comments written by the user.
    pub comment_count: i64,
    /// Comments received on the user's posts.
    pub commented_count: i64,
}

pub fn iso8601(dt: &NaiveDateTime) -> String {
    Utc.from_utc_datetime(dt)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}
