//! Feed source client: HTTP retrieval and RSS parsing.
//!
//! - [`parser`] - RSS 2.0 `channel`/`item` parsing with `quick-xml`
//! - [`client`] - the [`FeedSource`] seam and its reqwest implementation
//!
//! A fetch either yields the whole parsed document or a single
//! [`FetchError`]; there is no best-effort partial result.
//!
//! # Example
//!
//! ```ignore
//! use rssagg::feed::{FeedSource, HttpFeedSource};
//!
//! let source = HttpFeedSource::with_defaults()?;
//! let feed = source.fetch("https://example.com/rss").await?;
//! for item in &feed.items {
//!     println!("{} {}", item.pub_date, item.title);
//! }
//! ```

mod client;
mod parser;

pub use client::{
    FeedSource, FetchError, HttpFeedSource, DEFAULT_MAX_FEED_BYTES, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_USER_AGENT,
};
pub use parser::{parse_rss, ParseError, RssFeed, RssItem};
