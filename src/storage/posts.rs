use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, NewPost, Post, PostRow, StoreError};

/// Maximum number of posts to return from any single query (OOM protection)
const MAX_POSTS: i64 = 2000;

impl Database {
    // ========================================================================
    // Post Mutations
    // ========================================================================

    /// Insert a post, failing with [`StoreError::DuplicateUrl`] when a post
    /// with the same URL already exists.
    ///
    /// The duplicate check is the UNIQUE constraint on `posts.url`; racing
    /// inserts for the same URL from concurrent workers are resolved by
    /// SQLite, not by a read-then-write in this process.
    pub async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts (id, created_at, updated_at, title, description, published_at, url, feed_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, created_at, updated_at, title, description, published_at, url, feed_id
        "#,
        )
        .bind(post.id)
        .bind(to_millis(post.created_at))
        .bind(to_millis(post.updated_at))
        .bind(&post.title)
        .bind(&post.description)
        .bind(to_millis(post.published_at))
        .bind(&post.url)
        .bind(post.feed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::DuplicateUrl(post.url.clone())
            } else {
                StoreError::from_sqlx(e)
            }
        })?;

        Ok(row.into_post())
    }

    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Posts for one feed, newest publication first.
    pub async fn get_posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, created_at, updated_at, title, description, published_at, url, feed_id
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(MAX_POSTS)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Total number of stored posts.
    pub async fn count_posts(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count.0)
    }
}
