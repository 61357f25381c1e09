//! The scraping core: periodic cycles of bounded, concurrent feed fetches.
//!
//! - [`scheduler`] - tick loop, stale-feed selection and the per-cycle barrier
//! - [`worker`] - one feed: mark fetched, fetch, ingest
//! - [`ingest`] - one item: validate, normalize, store
//!
//! Everything here is written against the [`FeedStore`](crate::storage::FeedStore)
//! and [`FeedSource`](crate::feed::FeedSource) traits, so the core runs
//! unchanged over SQLite and reqwest in production and over in-process
//! stubs in tests.

mod ingest;
mod scheduler;
mod worker;

#[cfg(test)]
mod testing;

pub use ingest::{
    ingest_item, normalize_description, parse_published_at, IngestError, Ingested,
    InvalidDatePolicy,
};
pub use scheduler::{
    start_scraping, CycleReport, Scheduler, SchedulerError, SchedulerState, ScraperSettings,
};
pub use worker::{scrape_feed, FeedOutcome, IngestSummary, WorkerError};
