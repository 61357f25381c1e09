use async_trait::async_trait;
use uuid::Uuid;

use super::schema::Database;
use super::types::{Feed, NewPost, Post, StoreError};

/// The three store operations the scraper depends on.
///
/// Implementations must make `insert_post` reject an already-stored URL
/// with [`StoreError::DuplicateUrl`] atomically (a unique constraint), since
/// workers insert concurrently.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Up to `limit` feeds, never-fetched first, then oldest `last_fetched_at`.
    async fn select_stale_feeds(&self, limit: usize) -> Result<Vec<Feed>, StoreError>;

    /// Set the feed's `last_fetched_at` to now.
    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError>;

    /// Persist a post; duplicate URLs fail with [`StoreError::DuplicateUrl`].
    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn select_stale_feeds(&self, limit: usize) -> Result<Vec<Feed>, StoreError> {
        Database::select_stale_feeds(self, limit).await
    }

    async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError> {
        Database::mark_feed_fetched(self, feed_id).await
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, StoreError> {
        Database::insert_post(self, &post).await
    }
}
