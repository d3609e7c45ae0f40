//! reviewsync - review store and sync pipeline for scraped place reviews.
//!
//! Scraped reviews are kept in a local SQLite database with change
//! detection, soft deletion and an audit trail, and then pushed to
//! downstream targets (object storage, a document store, a JSON backup)
//! through a fixed pipeline of sync tasks.

pub mod config;
pub mod identity;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod repository;
pub mod sync;
