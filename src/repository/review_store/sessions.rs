//! Scrape session bookkeeping.

use rusqlite::{params, OptionalExtension};

use super::helpers::row_to_session;
use super::{ReviewStore, Result};
use crate::models::{ScrapeSession, SessionStatus, SessionTotals};
use crate::repository::now_timestamp;

impl ReviewStore {
    /// Open a running session for a place and return its id.
    pub fn start_session(&self, place_id: &str, sort_by: Option<&str>, action: &str) -> Result<i64> {
        self.write(|conn| {
            conn.execute(
                r#"
                INSERT INTO scrape_sessions (place_id, action, started_at, status, sort_by)
                VALUES (?1, ?2, ?3, 'running', ?4)
                "#,
                params![place_id, action, now_timestamp(), sort_by],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Finish a running session. Returns false if it was already finished
    /// or does not exist; terminal sessions are never rewritten.
    pub fn end_session(
        &self,
        session_id: i64,
        status: SessionStatus,
        totals: SessionTotals,
        error: Option<&str>,
    ) -> Result<bool> {
        self.write(|conn| {
            let updated = conn.execute(
                r#"
                UPDATE scrape_sessions SET
                    completed_at = ?1, status = ?2, reviews_found = ?3,
                    reviews_new = ?4, reviews_updated = ?5, error_message = ?6
                WHERE session_id = ?7 AND status = 'running'
                "#,
                params![
                    now_timestamp(),
                    status.as_str(),
                    totals.found,
                    totals.new,
                    totals.updated,
                    error,
                    session_id
                ],
            )?;
            Ok(updated > 0)
        })
    }

    pub fn get_session(&self, session_id: i64) -> Result<Option<ScrapeSession>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM scrape_sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?)
    }
}
