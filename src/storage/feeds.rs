use chrono::Utc;
use uuid::Uuid;

use super::schema::Database;
use super::types::{to_millis, Feed, FeedRow, StoreError, User, UserRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a feed owner.
    pub async fn insert_user(&self, name: &str) -> Result<User, StoreError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, created_at, updated_at, name)
            VALUES (?, ?, ?, ?)
            RETURNING id, created_at, updated_at, name
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.into_user())
    }

    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed for scraping. The URL must not already be registered.
    pub async fn insert_feed(
        &self,
        user_id: Uuid,
        name: &str,
        url: &str,
    ) -> Result<Feed, StoreError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            INSERT INTO feeds (id, created_at, updated_at, name, url, user_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, created_at, updated_at, name, url, user_id, last_fetched_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(now)
        .bind(now)
        .bind(name)
        .bind(url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if StoreError::is_unique_violation(&e) {
                StoreError::DuplicateFeedUrl(url.to_string())
            } else {
                StoreError::from_sqlx(e)
            }
        })?;

        Ok(row.into_feed())
    }

    /// Look up a single feed.
    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, StoreError> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Feeds most overdue for fetching, at most `limit`.
    ///
    /// Never-fetched feeds come first, then ascending `last_fetched_at`.
    /// Ties fall back to creation order.
    pub async fn select_stale_feeds(&self, limit: usize) -> Result<Vec<Feed>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT id, created_at, updated_at, name, url, user_id, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(FeedRow::into_feed).collect())
    }

    /// Stamp `last_fetched_at` (and `updated_at`) with the current time.
    pub async fn mark_feed_fetched(&self, feed_id: Uuid) -> Result<Feed, StoreError> {
        let now = to_millis(Utc::now());
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            UPDATE feeds SET last_fetched_at = ?, updated_at = ?
            WHERE id = ?
            RETURNING id, created_at, updated_at, name, url, user_id, last_fetched_at
        "#,
        )
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        row.map(FeedRow::into_feed)
            .ok_or(StoreError::FeedNotFound(feed_id))
    }

    /// Overwrite `last_fetched_at`. Used to seed deterministic fixtures.
    pub async fn set_last_fetched_at(
        &self,
        feed_id: Uuid,
        at: Option<chrono::DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE feeds SET last_fetched_at = ? WHERE id = ?")
            .bind(at.map(to_millis))
            .bind(feed_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::FeedNotFound(feed_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn test_db() -> (Database, User) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.insert_user("alice").await.unwrap();
        (db, user)
    }

    #[tokio::test]
    async fn test_insert_feed_starts_unfetched() {
        let (db, user) = test_db().await;

        let feed = db
            .insert_feed(user.id, "Example", "http://ex.com/rss")
            .await
            .unwrap();

        assert_eq!(feed.name, "Example");
        assert_eq!(feed.url, "http://ex.com/rss");
        assert_eq!(feed.user_id, user.id);
        assert!(feed.last_fetched_at.is_none());
        assert_eq!(db.get_feed(feed.id).await.unwrap(), Some(feed));
    }

    #[tokio::test]
    async fn test_insert_feed_duplicate_url_rejected() {
        let (db, user) = test_db().await;

        db.insert_feed(user.id, "One", "http://ex.com/rss")
            .await
            .unwrap();
        let err = db
            .insert_feed(user.id, "Two", "http://ex.com/rss")
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateFeedUrl(url) if url == "http://ex.com/rss"));
    }

    #[tokio::test]
    async fn test_select_stale_orders_null_first_then_oldest() {
        let (db, user) = test_db().await;
        let now = Utc::now();

        let newer = db.insert_feed(user.id, "t2", "http://ex.com/t2").await.unwrap();
        let never = db.insert_feed(user.id, "null", "http://ex.com/null").await.unwrap();
        let older = db.insert_feed(user.id, "t1", "http://ex.com/t1").await.unwrap();

        db.set_last_fetched_at(older.id, Some(now - Duration::hours(2)))
            .await
            .unwrap();
        db.set_last_fetched_at(newer.id, Some(now - Duration::hours(1)))
            .await
            .unwrap();

        let selected = db.select_stale_feeds(2).await.unwrap();
        let names: Vec<_> = selected.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["null", "t1"]);
        assert_eq!(selected[0].id, never.id);
    }

    #[tokio::test]
    async fn test_select_stale_respects_limit_and_empty_store() {
        let (db, user) = test_db().await;
        assert!(db.select_stale_feeds(5).await.unwrap().is_empty());

        for i in 0..4 {
            db.insert_feed(user.id, &format!("f{i}"), &format!("http://ex.com/{i}"))
                .await
                .unwrap();
        }

        assert_eq!(db.select_stale_feeds(3).await.unwrap().len(), 3);
        assert_eq!(db.select_stale_feeds(10).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_mark_feed_fetched_moves_feed_to_back() {
        let (db, user) = test_db().await;
        let a = db.insert_feed(user.id, "a", "http://ex.com/a").await.unwrap();
        let b = db.insert_feed(user.id, "b", "http://ex.com/b").await.unwrap();

        let marked = db.mark_feed_fetched(a.id).await.unwrap();
        assert!(marked.last_fetched_at.is_some());
        assert!(marked.updated_at >= a.updated_at);

        let selected = db.select_stale_feeds(2).await.unwrap();
        assert_eq!(selected[0].id, b.id);
        assert_eq!(selected[1].id, a.id);
    }

    #[tokio::test]
    async fn test_mark_unknown_feed_is_not_found() {
        let (db, _) = test_db().await;
        let missing = Uuid::new_v4();

        let err = db.mark_feed_fetched(missing).await.unwrap_err();
        assert!(matches!(err, StoreError::FeedNotFound(id) if id == missing));
    }
}
