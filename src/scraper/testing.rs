//! Shared fixtures for scraper unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::feed::{FeedSource, FetchError, RssFeed, RssItem};
use crate::storage::{Database, Feed};

pub(crate) const PUB_DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

pub(crate) fn feed_url(tag: &str) -> String {
    format!("http://{tag}.example.com/rss")
}

pub(crate) fn item(tag: &str, n: usize) -> RssItem {
    RssItem {
        title: format!("{tag} post {n}"),
        link: format!("http://{tag}.example.com/posts/{n}"),
        description: format!("about {tag} {n}"),
        pub_date: PUB_DATE.to_string(),
    }
}

/// Creates `count` feeds named `f0..` owned by one user.
pub(crate) async fn seed_feeds(db: &Database, count: usize) -> Vec<Feed> {
    let user = db.insert_user("tester").await.unwrap();
    let mut feeds = Vec::with_capacity(count);
    for i in 0..count {
        let tag = format!("f{i}");
        feeds.push(db.insert_feed(user.id, &tag, &feed_url(&tag)).await.unwrap());
    }
    feeds
}

pub(crate) enum StubResponse {
    Items(Vec<RssItem>),
    Fail,
    Panic,
}

/// In-process [`FeedSource`] that records concurrency.
///
/// `in_flight` is shareable so a store wrapper can observe it too.
pub(crate) struct StubSource {
    responses: Mutex<HashMap<String, StubResponse>>,
    delay: Duration,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
}

impl StubSource {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            delay,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn respond(self, url: &str, response: StubResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), response);
        self
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FeedSource for StubSource {
    async fn fetch(&self, url: &str) -> Result<RssFeed, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Decrements even when the fetch future is dropped mid-sleep
        let guard = InFlightGuard(&self.in_flight);
        tokio::time::sleep(self.delay).await;
        drop(guard);

        // Resolve under the lock, panic outside it so the mutex is not poisoned
        let result = match self.responses.lock().unwrap().get(url) {
            Some(StubResponse::Items(items)) => Some(Ok(RssFeed {
                title: url.to_string(),
                items: items.clone(),
                ..RssFeed::default()
            })),
            Some(StubResponse::Fail) => Some(Err(FetchError::HttpStatus(503))),
            Some(StubResponse::Panic) => None,
            None => Some(Ok(RssFeed::default())),
        };
        match result {
            Some(result) => result,
            None => panic!("stub source panic for {url}"),
        }
    }
}
