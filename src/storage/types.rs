use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Errors surfaced by the persistent store.
///
/// `DuplicateUrl` is the one variant callers are expected to treat as benign:
/// it is raised by the UNIQUE constraint on `posts.url`, never by an
/// in-process existence check.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A post with this source URL already exists
    #[error("duplicate post URL: {0}")]
    DuplicateUrl(String),

    /// A feed with this URL already exists
    #[error("duplicate feed URL: {0}")]
    DuplicateFeedUrl(String),

    /// No feed with the given id
    #[error("feed not found: {0}")]
    FeedNotFound(Uuid),

    /// Another process holds a lock on the database file
    #[error("database is locked by another process")]
    Locked,

    /// Migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, detecting SQLite lock conditions.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5) and SQLITE_LOCKED (6)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Locked;
        }

        StoreError::Other(err)
    }

    /// True when a sqlx error is a UNIQUE constraint violation.
    pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }

    /// True for the benign duplicate-post outcome.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateUrl(_))
    }
}

// ============================================================================
// Timestamp Helpers
// ============================================================================

/// Timestamps are persisted as integer milliseconds since the Unix epoch so
/// that SQL ordering on them is numeric.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
}

impl UserRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            name: self.name,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    pub last_fetched_at: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            name: self.name,
            url: self.url,
            user_id: self.user_id,
            last_fetched_at: self.last_fetched_at.map(from_millis),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
    pub title: String,
    pub description: Option<String>,
    pub published_at: i64,
    pub url: String,
    pub feed_id: Uuid,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
            title: self.title,
            description: self.description,
            published_at: from_millis(self.published_at),
            url: self.url,
            feed_id: self.feed_id,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Owner of one or more feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
}

/// A subscribed syndication source.
///
/// `url` is globally unique. The scraper only ever mutates
/// `last_fetched_at` (and `updated_at` alongside it).
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub url: String,
    pub user_id: Uuid,
    /// `None` until the feed has been picked up by a scrape cycle
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// One stored entry derived from a feed, identified by its source URL.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    /// `None` means the item carried no description; never `Some("")`
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub feed_id: Uuid,
}

/// Insert parameters for a post. The caller supplies identity and timestamps.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub url: String,
    pub feed_id: Uuid,
}
