//! rssagg: a scheduled RSS scraper.
//!
//! Feeds registered in the store are polled in cycles. Each cycle picks the
//! stalest feeds, fetches them concurrently, and stores every new item as a
//! post. See [`scraper`] for the cycle semantics.

pub mod config;
pub mod feed;
pub mod scraper;
pub mod storage;
