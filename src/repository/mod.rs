//! Repository layer for review persistence.
//!
//! Everything lives in one SQLite file opened in WAL mode. Each
//! [`ReviewStore`] owns its own connection and is meant to be used by one
//! writer; open another store for another thread.

mod review_store;
mod schema;
mod storage;

pub use review_store::{EnumerationPass, ReviewStore, StoreStats, SyncFilter, TableCounts};
pub use schema::SCHEMA_VERSION;
pub use storage::ReviewStorage;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

/// How long a writer waits for the lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised by the review store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Review {review_id} in {place_id} kept changing after {attempts} attempts")]
    Conflict {
        review_id: String,
        place_id: String,
        attempts: u32,
    },
    #[error("Missing migration for schema version {0}")]
    MissingMigration(i64),
    #[error("Database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Open a connection with the pragmas every store relies on.
pub(crate) fn connect(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(conn)
}

/// Current time in the fixed-width form used for every stored timestamp.
///
/// Fixed width keeps lexicographic order equal to chronological order.
pub(crate) fn now_timestamp() -> String {
    format_timestamp(&Utc::now())
}

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
