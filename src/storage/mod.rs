//! Persistent store for feeds and their posts.
//!
//! The scraper talks to storage only through the [`FeedStore`] trait.
//! [`Database`] is the SQLite implementation; it also carries the seeding
//! and read helpers used by operators and tests.

mod feeds;
mod posts;
mod schema;
mod store;
mod types;

pub use schema::Database;
pub use store::FeedStore;
pub use types::{Feed, NewPost, Post, StoreError, User};
