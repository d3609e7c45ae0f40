//! Clearing, statistics and vacuum.

use std::collections::BTreeMap;
use std::fs;

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::info;

use super::{ReviewStore, Result};
use crate::models::PlaceSummary;
use crate::repository::parse_datetime_opt;

/// Row counts keyed by table name.
pub type TableCounts = BTreeMap<String, i64>;

/// Tables holding per-place data, children first.
const PLACE_TABLES: &[&str] = &[
    "review_history",
    "sync_checkpoints",
    "reviews",
    "scrape_sessions",
    "place_aliases",
    "places",
];

/// Database overview for `db-stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub table_counts: TableCounts,
    pub db_size_bytes: u64,
    pub places: Vec<PlaceSummary>,
}

impl ReviewStore {
    /// Delete a place and everything that hangs off it. Returns what was
    /// there before the delete.
    pub fn clear_place(&self, place_id: &str) -> Result<TableCounts> {
        let counts = self.write(|conn| {
            let mut counts = TableCounts::new();
            for table in PLACE_TABLES {
                let column = if *table == "place_aliases" {
                    "canonical_id"
                } else {
                    "place_id"
                };
                let count: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", table, column),
                    params![place_id],
                    |row| row.get(0),
                )?;
                counts.insert(table.to_string(), count);
            }
            conn.execute("DELETE FROM places WHERE place_id = ?1", params![place_id])?;
            Ok(counts)
        })?;
        info!(place_id, ?counts, "Cleared place");
        Ok(counts)
    }

    /// Empty every data table, keeping the schema and its version.
    pub fn clear_all(&self) -> Result<TableCounts> {
        let counts = self.write(|conn| {
            let counts = table_counts(conn)?;
            for table in PLACE_TABLES {
                conn.execute(&format!("DELETE FROM {}", table), [])?;
            }
            Ok(counts)
        })?;
        info!(?counts, "Cleared all review data");
        Ok(counts)
    }

    pub fn get_stats(&self) -> Result<StoreStats> {
        let table_counts = table_counts(&self.conn)?;
        let db_size_bytes = fs::metadata(&self.db_path).map(|m| m.len()).unwrap_or(0);

        let mut stmt = self.conn.prepare(
            r#"
            SELECT place_id, place_name, total_reviews, last_scraped
            FROM places
            ORDER BY last_scraped DESC, place_id
            "#,
        )?;
        let places = stmt
            .query_map([], |row| {
                Ok(PlaceSummary {
                    place_id: row.get(0)?,
                    place_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    total_reviews: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                    last_scraped: parse_datetime_opt(row.get(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(StoreStats {
            table_counts,
            db_size_bytes,
            places,
        })
    }

    /// Reclaim free pages.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM")?;
        Ok(())
    }
}

fn table_counts(conn: &Connection) -> Result<TableCounts> {
    let mut counts = TableCounts::new();
    for table in PLACE_TABLES {
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        counts.insert(table.to_string(), count);
    }
    Ok(counts)
}
