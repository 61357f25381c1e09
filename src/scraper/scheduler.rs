//! Periodic scrape cycles.
//!
//! Each tick selects up to `concurrency` stale feeds, runs one worker per
//! feed, and waits for all of them before the next tick is considered.
//! Selection therefore never overlaps with in-flight workers.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::ingest::InvalidDatePolicy;
use super::worker::{scrape_feed, FeedOutcome, IngestSummary};
use crate::feed::FeedSource;
use crate::storage::{FeedStore, StoreError};

/// Rejected scheduler settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("concurrency must be at least 1")]
    InvalidConcurrency,
    #[error("interval must be greater than zero")]
    InvalidInterval,
}

/// Validated scheduler settings.
#[derive(Debug, Clone, Copy)]
pub struct ScraperSettings {
    concurrency: NonZeroUsize,
    interval: Duration,
    invalid_date_policy: InvalidDatePolicy,
}

impl ScraperSettings {
    pub fn new(concurrency: usize, interval: Duration) -> Result<Self, SchedulerError> {
        let concurrency =
            NonZeroUsize::new(concurrency).ok_or(SchedulerError::InvalidConcurrency)?;
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }
        Ok(Self {
            concurrency,
            interval,
            invalid_date_policy: InvalidDatePolicy::default(),
        })
    }

    pub fn with_invalid_date_policy(mut self, policy: InvalidDatePolicy) -> Self {
        self.invalid_date_policy = policy;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn invalid_date_policy(&self) -> InvalidDatePolicy {
        self.invalid_date_policy
    }
}

/// Where the scheduler is within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// Querying the store for stale feeds
    Selecting,
    /// Spawning one worker per selected feed
    Dispatching,
    /// Waiting for every worker of the cycle to finish
    AwaitingBarrier,
    /// Shutdown observed; no further cycles run
    Stopped,
}

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Feeds handed to workers
    pub selected: usize,
    /// One entry per worker that returned
    pub outcomes: Vec<FeedOutcome>,
    /// Set when the cycle was skipped because selection failed
    pub selection_error: Option<StoreError>,
    /// Workers that panicked instead of returning
    pub panicked: usize,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Sum of the per-feed summaries of successful workers.
    pub fn totals(&self) -> IngestSummary {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .fold(IngestSummary::default(), |acc, s| IngestSummary {
                items_seen: acc.items_seen + s.items_seen,
                inserted: acc.inserted + s.inserted,
                duplicates: acc.duplicates + s.duplicates,
                skipped: acc.skipped + s.skipped,
            })
    }
}

pub struct Scheduler<S: ?Sized, F: ?Sized> {
    store: Arc<S>,
    source: Arc<F>,
    settings: ScraperSettings,
    shutdown: CancellationToken,
    state: SchedulerState,
}

impl<S, F> Scheduler<S, F>
where
    S: FeedStore + ?Sized + 'static,
    F: FeedSource + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        source: Arc<F>,
        settings: ScraperSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            shutdown,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Runs cycles until the shutdown token is cancelled.
    ///
    /// The first cycle starts immediately. A cycle that overruns the
    /// interval delays the next one; missed ticks are dropped rather than
    /// replayed back to back.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            concurrency = self.settings.concurrency(),
            interval_secs = self.settings.interval.as_secs_f64(),
            "Scraper started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.run_cycle().await;
        }

        self.transition(SchedulerState::Stopped);
        tracing::info!("Scraper stopped");
    }

    /// Runs exactly one select → dispatch → barrier cycle.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        if self.shutdown.is_cancelled() {
            return report;
        }

        self.transition(SchedulerState::Selecting);
        let limit = self.settings.concurrency();
        let mut feeds = match self.store.select_stale_feeds(limit).await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select feeds, skipping cycle");
                report.selection_error = Some(e);
                self.transition(SchedulerState::Idle);
                return report;
            }
        };
        feeds.truncate(limit);
        report.selected = feeds.len();

        if feeds.is_empty() {
            tracing::debug!("No feeds to scrape");
            self.transition(SchedulerState::Idle);
            return report;
        }
        tracing::info!(feeds = feeds.len(), "Starting scrape cycle");

        self.transition(SchedulerState::Dispatching);
        let mut workers = JoinSet::new();
        for feed in feeds {
            let store = Arc::clone(&self.store);
            let source = Arc::clone(&self.source);
            let shutdown = self.shutdown.clone();
            let policy = self.settings.invalid_date_policy;
            workers.spawn(async move {
                scrape_feed(&*store, &*source, &feed, policy, &shutdown).await
            });
        }

        self.transition(SchedulerState::AwaitingBarrier);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    report.panicked += 1;
                    if e.is_panic() {
                        tracing::error!(error = %panic_message(e.into_panic()), "Feed worker panicked");
                    } else {
                        tracing::error!(error = %e, "Feed worker did not complete");
                    }
                }
            }
        }

        let totals = report.totals();
        tracing::info!(
            feeds = report.selected,
            succeeded = report.succeeded(),
            failed = report.failed(),
            panicked = report.panicked,
            inserted = totals.inserted,
            "Scrape cycle complete"
        );

        self.transition(SchedulerState::Idle);
        report
    }

    fn transition(&mut self, next: SchedulerState) {
        tracing::trace!(from = ?self.state, to = ?next, "Scheduler state");
        self.state = next;
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Scrapes every `interval` with at most `concurrency` fetches in flight.
///
/// Returns once `shutdown` is cancelled and the current cycle has drained.
///
/// # Errors
///
/// Returns [`SchedulerError`] if `concurrency` or `interval` is zero.
pub async fn start_scraping<S, F>(
    store: Arc<S>,
    source: Arc<F>,
    concurrency: usize,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), SchedulerError>
where
    S: FeedStore + ?Sized + 'static,
    F: FeedSource + ?Sized + 'static,
{
    let settings = ScraperSettings::new(concurrency, interval)?;
    Scheduler::new(store, source, settings, shutdown).run().await;
    Ok(())
}
