//! SQLite-backed review store.
//!
//! This module is split into submodules:
//! - `places`: place rows and alias resolution
//! - `reviews`: upsert with dual-hash change detection and optimistic retries
//! - `stale`: stale detection and manual hide/restore
//! - `sessions`: scrape session bookkeeping
//! - `history`: audit trail reads and pruning
//! - `checkpoints`: per-target sync checkpoints
//! - `sync_queries`: incremental reads and object-store image tracking
//! - `export`: JSON and CSV exports
//! - `maintenance`: clearing, statistics, vacuum
//! - `helpers`: row parsing

mod checkpoints;
mod export;
mod helpers;
mod history;
mod maintenance;
mod places;
mod reviews;
mod sessions;
mod stale;
mod sync_queries;

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::schema;
use super::{RepositoryError, Result};

pub use maintenance::{StoreStats, TableCounts};
pub use stale::EnumerationPass;
pub use sync_queries::SyncFilter;

/// Maximum optimistic write attempts before giving up with a conflict.
pub(crate) const MAX_WRITE_ATTEMPTS: u32 = 3;

/// The review store. Owns one connection; open one store per writer.
pub struct ReviewStore {
    db_path: PathBuf,
    conn: Connection,
}

impl ReviewStore {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to date.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = super::connect(db_path)?;
        schema::init_schema(&conn)?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Stored schema version.
    pub fn schema_version(&self) -> Result<i64> {
        Ok(schema::read_version(&self.conn)?.unwrap_or(0))
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, committing on success and rolling
    /// back on any error.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.conn.execute("BEGIN IMMEDIATE", [])?;

        let result = f(&self.conn);

        match result {
            Ok(value) => match self.conn.execute("COMMIT", []) {
                Ok(_) => Ok(value),
                Err(e) => {
                    let _ = self.conn.execute("ROLLBACK", []);
                    Err(RepositoryError::from(e))
                }
            },
            Err(e) => {
                let _ = self.conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}
