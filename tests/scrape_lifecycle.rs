//! End-to-end scrape cycles: real HTTP source against a mock server, real
//! SQLite store in memory.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rssagg::feed::{HttpFeedSource, DEFAULT_USER_AGENT};
use rssagg::scraper::{start_scraping, Scheduler, ScraperSettings};
use rssagg::storage::{Database, Feed};

fn rss(items: &[(&str, &str)]) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Example</title><link>http://ex.com</link>"#,
    );
    for (link, pub_date) in items {
        body.push_str(&format!(
            "<item><title>{link}</title><link>{link}</link><description>d</description><pubDate>{pub_date}</pubDate></item>"
        ));
    }
    body.push_str("</channel></rss>");
    body
}

const DATE: &str = "Mon, 02 Jan 2006 15:04:05 -0700";

async fn mount(server: &MockServer, route: &str, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn seed(db: &Database, feeds: &[(&str, String)]) -> Vec<Feed> {
    let user = db.insert_user("alice").await.unwrap();
    let mut out = Vec::new();
    for (name, url) in feeds {
        out.push(db.insert_feed(user.id, name, url).await.unwrap());
    }
    out
}

fn source() -> Arc<HttpFeedSource> {
    Arc::new(HttpFeedSource::new(DEFAULT_USER_AGENT, Duration::from_secs(5), 1024 * 1024).unwrap())
}

#[tokio::test]
async fn test_feed_marked_while_slow_fetch_in_flight_and_posts_stored() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/rss",
        ResponseTemplate::new(200)
            .set_body_string(rss(&[("http://ex.com/1", DATE), ("http://ex.com/2", DATE)]))
            .set_delay(Duration::from_millis(300)),
    )
    .await;

    let db = Database::open(":memory:").await.unwrap();
    let feed = seed(&db, &[("example", format!("{}/rss", server.uri()))])
        .await
        .remove(0);
    assert!(feed.last_fetched_at.is_none());

    let shutdown = CancellationToken::new();
    let scraper = tokio::spawn(start_scraping(
        Arc::new(db.clone()),
        source(),
        10,
        Duration::from_millis(50),
        shutdown.clone(),
    ));

    // Mid-fetch: already marked, nothing stored, no second request despite
    // several elapsed intervals
    tokio::time::sleep(Duration::from_millis(150)).await;
    let during = db.get_feed(feed.id).await.unwrap().unwrap();
    assert!(during.last_fetched_at.is_some());
    assert_eq!(db.count_posts().await.unwrap(), 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown.cancel();
    scraper.await.unwrap().unwrap();

    let posts = db.get_posts_for_feed(feed.id).await.unwrap();
    let mut urls: Vec<&str> = posts.iter().map(|p| p.url.as_str()).collect();
    urls.sort();
    assert_eq!(urls, vec!["http://ex.com/1", "http://ex.com/2"]);
    assert!(posts.iter().all(|p| p.feed_id == feed.id));
}

#[tokio::test]
async fn test_refetching_same_document_stores_nothing_new() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/rss",
        ResponseTemplate::new(200)
            .set_body_string(rss(&[("http://ex.com/1", DATE), ("http://ex.com/2", DATE)])),
    )
    .await;

    let db = Database::open(":memory:").await.unwrap();
    seed(&db, &[("example", format!("{}/rss", server.uri()))]).await;
    let settings = ScraperSettings::new(1, Duration::from_secs(3600)).unwrap();
    let mut scheduler = Scheduler::new(
        Arc::new(db.clone()),
        source(),
        settings,
        CancellationToken::new(),
    );

    let first = scheduler.run_cycle().await.totals();
    let second = scheduler.run_cycle().await.totals();

    assert_eq!((first.inserted, first.duplicates), (2, 0));
    assert_eq!((second.inserted, second.duplicates), (0, 2));
    assert_eq!(db.count_posts().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failing_feed_isolated_from_healthy_feed() {
    let server = MockServer::start().await;
    mount(&server, "/a", ResponseTemplate::new(500)).await;
    mount(
        &server,
        "/b",
        ResponseTemplate::new(200).set_body_string(rss(&[
            ("http://b.ex.com/1", DATE),
            ("http://b.ex.com/2", DATE),
            ("http://b.ex.com/3", DATE),
        ])),
    )
    .await;

    let db = Database::open(":memory:").await.unwrap();
    let feeds = seed(
        &db,
        &[
            ("a", format!("{}/a", server.uri())),
            ("b", format!("{}/b", server.uri())),
        ],
    )
    .await;
    let settings = ScraperSettings::new(2, Duration::from_secs(3600)).unwrap();
    let mut scheduler = Scheduler::new(
        Arc::new(db.clone()),
        source(),
        settings,
        CancellationToken::new(),
    );

    let report = scheduler.run_cycle().await;

    assert_eq!(report.selected, 2);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(db.get_posts_for_feed(feeds[0].id).await.unwrap().len(), 0);
    assert_eq!(db.get_posts_for_feed(feeds[1].id).await.unwrap().len(), 3);
    for feed in &feeds {
        let stored = db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(stored.last_fetched_at.is_some(), "{} not marked", feed.name);
    }
}

#[tokio::test]
async fn test_bad_item_does_not_drop_rest_of_document() {
    let server = MockServer::start().await;
    mount(
        &server,
        "/rss",
        ResponseTemplate::new(200).set_body_string(rss(&[
            ("http://ex.com/1", DATE),
            ("http://ex.com/2", "2006-01-02"),
            ("http://ex.com/3", DATE),
        ])),
    )
    .await;

    let db = Database::open(":memory:").await.unwrap();
    let feed = seed(&db, &[("example", format!("{}/rss", server.uri()))])
        .await
        .remove(0);
    let settings = ScraperSettings::new(1, Duration::from_secs(3600)).unwrap();
    let mut scheduler = Scheduler::new(
        Arc::new(db.clone()),
        source(),
        settings,
        CancellationToken::new(),
    );

    let totals = scheduler.run_cycle().await.totals();

    assert_eq!(totals.items_seen, 3);
    assert_eq!(totals.inserted, 2);
    assert_eq!(totals.skipped, 1);
    assert_eq!(db.get_posts_for_feed(feed.id).await.unwrap().len(), 2);
}
