//! Per-target sync checkpoints.

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::helpers::row_to_checkpoint;
use super::{ReviewStore, Result};
use crate::models::{CheckpointStatus, CheckpointUpdate, SyncCheckpoint, SyncStatusRow};
use crate::repository::now_timestamp;

impl ReviewStore {
    pub fn get_sync_checkpoint(&self, place_id: &str, target: &str) -> Result<Option<SyncCheckpoint>> {
        Ok(self
            .conn
            .query_row(
                "SELECT * FROM sync_checkpoints WHERE place_id = ?1 AND target = ?2",
                params![place_id, target],
                row_to_checkpoint,
            )
            .optional()?)
    }

    /// Record the outcome of one sync attempt.
    ///
    /// A success advances `last_synced_*` and the cursor and resets the
    /// attempt counter. A partial result keeps the last good position and
    /// only bumps the counter and records the error.
    pub fn update_sync_checkpoint(
        &self,
        place_id: &str,
        target: &str,
        update: &CheckpointUpdate,
    ) -> Result<()> {
        self.write(|conn| {
            match update.status {
                CheckpointStatus::Ok => {
                    conn.execute(
                        r#"
                        INSERT INTO sync_checkpoints (
                            place_id, target, last_synced_at, last_synced_session,
                            cursor_review_id, cursor_updated_at, attempt_count, status, error_message
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 'ok', NULL)
                        ON CONFLICT(place_id, target) DO UPDATE SET
                            last_synced_at = excluded.last_synced_at,
                            last_synced_session = excluded.last_synced_session,
                            cursor_review_id = excluded.cursor_review_id,
                            cursor_updated_at = excluded.cursor_updated_at,
                            attempt_count = 0,
                            status = 'ok',
                            error_message = NULL
                        "#,
                        params![
                            place_id,
                            target,
                            now_timestamp(),
                            update.session_id,
                            update.cursor_review_id,
                            update.cursor_updated_at,
                        ],
                    )?;
                }
                CheckpointStatus::Partial => {
                    conn.execute(
                        r#"
                        INSERT INTO sync_checkpoints (place_id, target, attempt_count, status, error_message)
                        VALUES (?1, ?2, 1, 'partial', ?3)
                        ON CONFLICT(place_id, target) DO UPDATE SET
                            attempt_count = sync_checkpoints.attempt_count + 1,
                            status = 'partial',
                            error_message = excluded.error_message
                        "#,
                        params![place_id, target, update.error],
                    )?;
                }
            }
            Ok(())
        })?;
        debug!(place_id, target, status = update.status.as_str(), "Updated sync checkpoint");
        Ok(())
    }

    /// Forget a checkpoint so the next run syncs the target from scratch.
    pub fn reset_sync_checkpoint(&self, place_id: &str, target: &str) -> Result<bool> {
        let deleted = self.write(|conn| {
            Ok(conn.execute(
                "DELETE FROM sync_checkpoints WHERE place_id = ?1 AND target = ?2",
                params![place_id, target],
            )?)
        })?;
        if deleted > 0 {
            info!(place_id, target, "Reset sync checkpoint");
        }
        Ok(deleted > 0)
    }

    /// Every checkpoint with the name of its place.
    pub fn get_all_sync_status(&self) -> Result<Vec<SyncStatusRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT c.*, p.place_name AS place_name
            FROM sync_checkpoints c
            LEFT JOIN places p ON p.place_id = c.place_id
            ORDER BY c.place_id, c.target
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SyncStatusRow {
                    checkpoint: row_to_checkpoint(row)?,
                    place_name: row.get("place_name")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{open_store, seed_place};
    use super::*;
    use crate::models::SyncTarget;

    #[test]
    fn partial_keeps_last_good_position() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let target = SyncTarget::JsonBackup.as_str();
        let session = store.start_session("P", None, "scrape").unwrap();

        let ok = CheckpointUpdate::success(Some(session))
            .with_cursor(Some("r9".into()), Some("2026-01-01T00:00:00.000000Z".into()));
        store.update_sync_checkpoint("P", target, &ok).unwrap();

        store
            .update_sync_checkpoint("P", target, &CheckpointUpdate::partial(None, "disk full"))
            .unwrap();
        store
            .update_sync_checkpoint("P", target, &CheckpointUpdate::partial(None, "still full"))
            .unwrap();

        let cp = store.get_sync_checkpoint("P", target).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Partial);
        assert_eq!(cp.attempt_count, 2);
        assert_eq!(cp.error_message.as_deref(), Some("still full"));
        assert_eq!(cp.last_synced_session, Some(session));
        assert_eq!(cp.cursor_review_id.as_deref(), Some("r9"));

        store
            .update_sync_checkpoint("P", target, &CheckpointUpdate::success(Some(session)))
            .unwrap();
        let cp = store.get_sync_checkpoint("P", target).unwrap().unwrap();
        assert_eq!(cp.status, CheckpointStatus::Ok);
        assert_eq!(cp.attempt_count, 0);
        assert!(cp.error_message.is_none());
    }

    #[test]
    fn first_failure_counts_one_attempt() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .update_sync_checkpoint("P", "s3", &CheckpointUpdate::partial(None, "denied"))
            .unwrap();
        let cp = store.get_sync_checkpoint("P", "s3").unwrap().unwrap();
        assert_eq!(cp.attempt_count, 1);
        assert!(cp.last_synced_at.is_none());
    }

    #[test]
    fn reset_and_status_listing() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .update_sync_checkpoint("P", "json", &CheckpointUpdate::success(None))
            .unwrap();
        store
            .update_sync_checkpoint("P", "s3", &CheckpointUpdate::success(None))
            .unwrap();

        let all = store.get_all_sync_status().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].place_name.as_deref(), Some("Cafe"));

        assert!(store.reset_sync_checkpoint("P", "json").unwrap());
        assert!(!store.reset_sync_checkpoint("P", "json").unwrap());
        assert!(store.get_sync_checkpoint("P", "json").unwrap().is_none());
    }
}
