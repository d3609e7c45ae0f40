//! Stale detection and manual hide/restore.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use tracing::{info, warn};

use super::history::insert_history;
use super::reviews::{refresh_total_reviews, review_ids_in};
use super::{ReviewStore, Result};
use crate::models::{Actor, HistoryAction, NewHistoryEntry};
use crate::repository::now_timestamp;

/// How complete the enumeration behind a set of scraped ids was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationPass {
    /// Every currently visible review was enumerated.
    Exhaustive,
    /// The scrape stopped early or was cut short.
    Partial,
}

impl ReviewStore {
    /// Soft-delete every live review of `place_id` that is not in `scraped_ids`.
    ///
    /// Only an exhaustive pass can prove a review is gone, so a partial pass
    /// deletes nothing. Returns the number of reviews soft-deleted.
    pub fn mark_stale(
        &self,
        place_id: &str,
        session_id: Option<i64>,
        scraped_ids: &HashSet<String>,
        pass: EnumerationPass,
    ) -> Result<usize> {
        if pass == EnumerationPass::Partial {
            warn!(place_id, "Skipping stale detection after a partial scrape");
            return Ok(0);
        }
        if scraped_ids.is_empty() {
            return Ok(0);
        }

        let marked = self.write(|conn| {
            let live = review_ids_in(conn, place_id)?;
            let mut stale: Vec<&String> = live.difference(scraped_ids).collect();
            stale.sort();

            for review_id in &stale {
                soft_delete(conn, review_id, place_id, session_id, Actor::Scraper)?;
            }
            if !stale.is_empty() {
                refresh_total_reviews(conn, place_id)?;
            }
            Ok(stale.len())
        })?;

        if marked > 0 {
            info!(place_id, marked, "Marked stale reviews as deleted");
        }
        Ok(marked)
    }

    /// Manually hide a live review. Returns false if it is missing or already hidden.
    pub fn hide_review(&self, review_id: &str, place_id: &str) -> Result<bool> {
        self.write(|conn| {
            let hidden = soft_delete(conn, review_id, place_id, None, Actor::CliHide)?;
            if hidden {
                refresh_total_reviews(conn, place_id)?;
            }
            Ok(hidden)
        })
    }

    /// Manually restore a hidden review. Returns false if it is missing or live.
    pub fn restore_review(&self, review_id: &str, place_id: &str) -> Result<bool> {
        self.write(|conn| {
            let restored = conn.execute(
                r#"
                UPDATE reviews SET is_deleted = 0, last_modified = ?1, row_version = row_version + 1
                WHERE review_id = ?2 AND place_id = ?3 AND is_deleted = 1
                "#,
                params![now_timestamp(), review_id, place_id],
            )? > 0;

            if restored {
                insert_history(
                    conn,
                    &NewHistoryEntry {
                        actor: Actor::CliRestore,
                        ..NewHistoryEntry::new(review_id, place_id, HistoryAction::Restore)
                    },
                )?;
                refresh_total_reviews(conn, place_id)?;
            }
            Ok(restored)
        })
    }
}

fn soft_delete(
    conn: &Connection,
    review_id: &str,
    place_id: &str,
    session_id: Option<i64>,
    actor: Actor,
) -> Result<bool> {
    let updated = conn.execute(
        r#"
        UPDATE reviews SET is_deleted = 1, last_modified = ?1, row_version = row_version + 1
        WHERE review_id = ?2 AND place_id = ?3 AND is_deleted = 0
        "#,
        params![now_timestamp(), review_id, place_id],
    )?;
    if updated == 0 {
        return Ok(false);
    }

    insert_history(
        conn,
        &NewHistoryEntry {
            session_id,
            actor,
            ..NewHistoryEntry::new(review_id, place_id, HistoryAction::SoftDelete)
        },
    )?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{observation, open_store, seed_place};
    use super::*;
    use crate::models::{ScrapeMode, UpsertOutcome};

    fn ids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn full_lifecycle_ends_in_restore() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let r1 = observation("r1", "Great!");
        assert_eq!(
            store.upsert_review("P", &r1, None, ScrapeMode::Update).unwrap(),
            UpsertOutcome::New
        );
        store
            .upsert_review("P", &observation("r2", "Fine"), None, ScrapeMode::Update)
            .unwrap();

        let marked = store
            .mark_stale("P", None, &ids(&["r2"]), EnumerationPass::Exhaustive)
            .unwrap();
        assert_eq!(marked, 1);
        assert!(store.get_review("r1", "P").unwrap().unwrap().is_deleted);
        assert_eq!(store.get_place("P").unwrap().unwrap().total_reviews, 1);

        assert_eq!(
            store.upsert_review("P", &r1, None, ScrapeMode::Update).unwrap(),
            UpsertOutcome::Restored
        );
        let row = store.get_review("r1", "P").unwrap().unwrap();
        assert!(!row.is_deleted);
        let actions: Vec<_> = store
            .get_review_history("r1", "P")
            .unwrap()
            .into_iter()
            .map(|h| h.action)
            .collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Insert, HistoryAction::SoftDelete, HistoryAction::Restore]
        );
    }

    #[test]
    fn stale_detection_is_scoped_to_the_place() {
        let (_dir, store) = open_store();
        seed_place(&store, "A");
        seed_place(&store, "B");
        store
            .upsert_review("A", &observation("a1", "x"), None, ScrapeMode::Update)
            .unwrap();
        store
            .upsert_review("B", &observation("b1", "y"), None, ScrapeMode::Update)
            .unwrap();

        store
            .mark_stale("A", None, &ids(&["other"]), EnumerationPass::Exhaustive)
            .unwrap();

        assert!(store.get_review("a1", "A").unwrap().unwrap().is_deleted);
        assert!(!store.get_review("b1", "B").unwrap().unwrap().is_deleted);
    }

    #[test]
    fn partial_pass_deletes_nothing() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .upsert_review("P", &observation("r1", "x"), None, ScrapeMode::Update)
            .unwrap();

        let marked = store
            .mark_stale("P", None, &ids(&["r9"]), EnumerationPass::Partial)
            .unwrap();
        assert_eq!(marked, 0);
        let marked = store
            .mark_stale("P", None, &HashSet::new(), EnumerationPass::Exhaustive)
            .unwrap();
        assert_eq!(marked, 0);
        assert!(!store.get_review("r1", "P").unwrap().unwrap().is_deleted);
    }

    #[test]
    fn manual_hide_and_restore_use_cli_actors() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .upsert_review("P", &observation("r1", "x"), None, ScrapeMode::Update)
            .unwrap();

        assert!(store.hide_review("r1", "P").unwrap());
        assert!(!store.hide_review("r1", "P").unwrap());
        assert!(store.restore_review("r1", "P").unwrap());
        assert!(!store.restore_review("r1", "P").unwrap());
        assert!(!store.hide_review("missing", "P").unwrap());

        let history = store.get_review_history("r1", "P").unwrap();
        assert_eq!(history[1].actor, Actor::CliHide);
        assert_eq!(history[1].action, HistoryAction::SoftDelete);
        assert_eq!(history[2].actor, Actor::CliRestore);
        assert_eq!(history[2].action, HistoryAction::Restore);
        assert_eq!(store.get_review("r1", "P").unwrap().unwrap().row_version, 3);
    }
}
