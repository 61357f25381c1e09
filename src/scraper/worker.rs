use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ingest::{ingest_item, IngestError, Ingested, InvalidDatePolicy};
use crate::feed::{FeedSource, FetchError};
use crate::storage::{Feed, FeedStore, StoreError};

/// Reasons a feed produced no items on this turn.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to mark feed as fetched: {0}")]
    MarkFetched(#[source] StoreError),
    #[error("failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("shutdown requested before the fetch completed")]
    Cancelled,
}

/// Per-feed counts for one scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Items present in the fetched document
    pub items_seen: usize,
    pub inserted: usize,
    /// Items whose URL was already stored
    pub duplicates: usize,
    /// Items dropped because of an item-level error
    pub skipped: usize,
}

/// Result of one fetch worker, handed back to the scheduler.
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: Uuid,
    pub feed_name: String,
    pub result: Result<IngestSummary, WorkerError>,
}

/// Runs one feed through mark → fetch → ingest.
///
/// Never fails: every error is logged here and carried in the returned
/// [`FeedOutcome`], so one feed cannot affect its siblings in the cycle.
pub async fn scrape_feed<S, F>(
    store: &S,
    source: &F,
    feed: &Feed,
    policy: InvalidDatePolicy,
    shutdown: &CancellationToken,
) -> FeedOutcome
where
    S: FeedStore + ?Sized,
    F: FeedSource + ?Sized,
{
    let result = run(store, source, feed, policy, shutdown).await;

    match &result {
        Ok(summary) => tracing::info!(
            feed = %feed.name,
            items = summary.items_seen,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            skipped = summary.skipped,
            "Feed collected"
        ),
        Err(WorkerError::Cancelled) => tracing::info!(
            feed = %feed.name,
            url = %feed.url,
            "Feed scrape cancelled by shutdown"
        ),
        Err(e) => tracing::warn!(
            feed_id = %feed.id,
            feed = %feed.name,
            url = %feed.url,
            error = %e,
            "Feed scrape failed"
        ),
    }

    FeedOutcome {
        feed_id: feed.id,
        feed_name: feed.name.clone(),
        result,
    }
}

async fn run<S, F>(
    store: &S,
    source: &F,
    feed: &Feed,
    policy: InvalidDatePolicy,
    shutdown: &CancellationToken,
) -> Result<IngestSummary, WorkerError>
where
    S: FeedStore + ?Sized,
    F: FeedSource + ?Sized,
{
    if shutdown.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }

    // Staleness-avoidance policy: the feed is stamped as fetched before the
    // network call. A slow or hanging feed is therefore not re-selected by
    // the next cycle, at the cost of a failed fetch also counting as a fetch;
    // it is retried only when it comes round again in the ordering.
    store
        .mark_feed_fetched(feed.id)
        .await
        .map_err(WorkerError::MarkFetched)?;

    let document = tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Err(WorkerError::Cancelled),
        fetched = source.fetch(&feed.url) => fetched?,
    };

    let mut summary = IngestSummary {
        items_seen: document.items.len(),
        ..IngestSummary::default()
    };

    for item in &document.items {
        match ingest_item(store, feed.id, item, policy).await {
            Ok(Ingested::Inserted(_)) => summary.inserted += 1,
            Ok(Ingested::Duplicate) => summary.duplicates += 1,
            Err(e) => {
                summary.skipped += 1;
                match e {
                    IngestError::Store(_) => tracing::error!(
                        feed = %feed.name,
                        url = %item.link,
                        error = %e,
                        "Failed to store post"
                    ),
                    _ => tracing::warn!(
                        feed = %feed.name,
                        url = %item.link,
                        error = %e,
                        "Skipping feed item"
                    ),
                }
            }
        }
    }

    Ok(summary)
}
