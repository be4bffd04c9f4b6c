//! Turns post rows into fully populated posts for rendering.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{keys, KvCache, ReadThrough};
use crate::db::models::{Comment, Post};
use crate::db::queries::{self, POSTS_PER_PAGE};
use crate::error::AppResult;
use crate::state::DbPool;

pub struct Hydrator<'a> {
    db: &'a DbPool,
    memo: ReadThrough<'a>,
}

impl<'a> Hydrator<'a> {
    pub fn new(db: &'a DbPool, cache: &'a dyn KvCache, ttl: Duration) -> Self {
        Self {
            db,
            memo: ReadThrough::new(cache, ttl),
        }
    }

    /// Attach comment counts, comments (oldest first) and the CSRF token to
    /// each row, keeping row order and stopping at one page of posts.
    ///
    /// With `all_comments` unset only the latest three comments are loaded.
    /// Any store or cache failure aborts the whole batch.
    pub async fn make_posts(
        &self,
        rows: Vec<Post>,
        csrf_token: &str,
        all_comments: bool,
    ) -> AppResult<Vec<Post>> {
        let count_keys: Vec<String> = rows.iter().map(|p| keys::comment_count(p.id)).collect();
        let mut counts: HashMap<String, i64> = self.memo.get_many(&count_keys).await?;

        let comment_keys: Vec<String> = rows
            .iter()
            .map(|p| keys::comments(p.id, all_comments))
            .collect();
        let mut cached_comments: HashMap<String, Vec<Comment>> =
            self.memo.get_many(&comment_keys).await?;

        let mut posts = Vec::with_capacity(rows.len().min(POSTS_PER_PAGE));
        for mut post in rows {
            let count_key = keys::comment_count(post.id);
            post.comment_count = match counts.remove(&count_key) {
                Some(count) => count,
                None => {
                    let count = {
                        let conn = self.db.get()?;
                        queries::comment_count(&conn, post.id)?
                    };
                    self.memo.put(&count_key, &count).await;
                    count
                }
            };

            let comments_key = keys::comments(post.id, all_comments);
            let mut comments = match cached_comments.remove(&comments_key) {
                Some(comments) => comments,
                None => {
                    let comments = {
                        let conn = self.db.get()?;
                        queries::comments_for_post(&conn, post.id, all_comments)?
                    };
                    self.memo.put(&comments_key, &comments).await;
                    comments
                }
            };

            // Stored newest first; shown oldest first.
            comments.reverse();
            post.comments = comments;
            post.csrf_token = csrf_token.to_string();

            posts.push(post);
            if posts.len() >= POSTS_PER_PAGE {
                break;
            }
        }

        Ok(posts)
    }
}
