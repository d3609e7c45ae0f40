//! Append-only audit trail.

use chrono::{Datelike, Duration, Utc};
use rusqlite::{params, Connection};
use tracing::info;

use super::helpers::row_to_history;
use super::{ReviewStore, Result};
use crate::models::{HistoryEntry, NewHistoryEntry};
use crate::repository::{format_timestamp, now_timestamp};

/// Append one entry. Must run inside the transaction that made the change.
pub(super) fn insert_history(conn: &Connection, entry: &NewHistoryEntry<'_>) -> Result<()> {
    let changed = entry
        .changed_fields
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        r#"
        INSERT INTO review_history (
            review_id, place_id, session_id, actor, action, changed_fields,
            old_content_hash, new_content_hash, old_engagement_hash, new_engagement_hash,
            timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            entry.review_id,
            entry.place_id,
            entry.session_id,
            entry.actor.as_str(),
            entry.action.as_str(),
            changed,
            entry.old_content_hash,
            entry.new_content_hash,
            entry.old_engagement_hash,
            entry.new_engagement_hash,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

impl ReviewStore {
    /// Full history of one review, oldest first.
    pub fn get_review_history(&self, review_id: &str, place_id: &str) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT * FROM review_history
            WHERE review_id = ?1 AND place_id = ?2
            ORDER BY timestamp, history_id
            "#,
        )?;
        let entries = stmt
            .query_map(params![review_id, place_id], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Everything recorded during one session.
    pub fn get_session_history(&self, session_id: i64) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT * FROM review_history WHERE session_id = ?1 ORDER BY timestamp, history_id",
        )?;
        let entries = stmt
            .query_map(params![session_id], row_to_history)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Delete history older than `older_than_days`. With `dry_run` only
    /// counts. Returns the number of entries affected.
    pub fn prune_history(&self, older_than_days: u32, dry_run: bool) -> Result<usize> {
        let cutoff = Duration::try_days(i64::from(older_than_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .filter(|cutoff| cutoff.year() >= 1);
        let Some(cutoff) = cutoff else {
            // Nothing is older than year one.
            return Ok(0);
        };
        let cutoff = format_timestamp(&cutoff);

        if dry_run {
            let count: i64 = self.conn.query_row(
                "SELECT COUNT(*) FROM review_history WHERE timestamp < ?1",
                params![cutoff],
                |row| row.get(0),
            )?;
            return Ok(count as usize);
        }

        let deleted = self.write(|conn| {
            Ok(conn.execute(
                "DELETE FROM review_history WHERE timestamp < ?1",
                params![cutoff],
            )?)
        })?;
        info!(deleted, older_than_days, "Pruned review history");
        Ok(deleted)
    }
}
