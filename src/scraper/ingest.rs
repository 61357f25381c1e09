use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::feed::RssItem;
use crate::storage::{FeedStore, NewPost, Post, StoreError};

/// What to do with an item whose `pubDate` cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidDatePolicy {
    /// Drop the item; it is not stored.
    #[default]
    Skip,
    /// Store the item with the Unix epoch as its publication time.
    Epoch,
}

/// Per-item failures. The worker logs these and moves on to the next item.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The item has no link, and the link is the post's identity
    #[error("item has no link")]
    MissingLink,

    /// `pubDate` is not an RFC 1123 / RFC 2822 date
    #[error("invalid publication date '{value}': {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },

    /// Any store failure other than a duplicate URL
    #[error("failed to store post: {0}")]
    Store(#[source] StoreError),
}

/// Result of ingesting one item.
#[derive(Debug)]
pub enum Ingested {
    Inserted(Post),
    /// A post with this URL already exists; nothing was written
    Duplicate,
}

/// Empty descriptions are stored as absent, never as `""`.
pub fn normalize_description(raw: &str) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

/// Parses an RSS `pubDate`, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
///
/// Uses the RFC 2822 grammar, which also accepts obsolete zone names such
/// as `GMT` that RFC 1123 dates often carry.
pub fn parse_published_at(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc2822(raw.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Converts one parsed item into a post and stores it.
///
/// A duplicate URL is reported as [`Ingested::Duplicate`], not as an error.
pub async fn ingest_item<S>(
    store: &S,
    feed_id: Uuid,
    item: &RssItem,
    policy: InvalidDatePolicy,
) -> Result<Ingested, IngestError>
where
    S: FeedStore + ?Sized,
{
    if item.link.trim().is_empty() {
        return Err(IngestError::MissingLink);
    }

    let published_at = match parse_published_at(&item.pub_date) {
        Ok(ts) => ts,
        Err(source) => match policy {
            InvalidDatePolicy::Skip => {
                return Err(IngestError::InvalidDate {
                    value: item.pub_date.clone(),
                    source,
                })
            }
            InvalidDatePolicy::Epoch => {
                tracing::warn!(
                    url = %item.link,
                    pub_date = %item.pub_date,
                    error = %source,
                    "Unparseable publication date, storing epoch"
                );
                DateTime::<Utc>::UNIX_EPOCH
            }
        },
    };

    let now = Utc::now();
    let post = NewPost {
        id: Uuid::new_v4(),
        created_at: now,
        updated_at: now,
        title: item.title.clone(),
        description: normalize_description(&item.description),
        published_at,
        url: item.link.clone(),
        feed_id,
    };

    match store.insert_post(post).await {
        Ok(post) => Ok(Ingested::Inserted(post)),
        Err(e) if e.is_duplicate() => Ok(Ingested::Duplicate),
        Err(e) => Err(IngestError::Store(e)),
    }
}
