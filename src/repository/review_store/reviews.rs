//! Review upsert with dual-hash change detection.
//!
//! Writes are optimistic: the row is read without holding the write lock,
//! merged in memory, and written back with `WHERE row_version = ?`. Losing
//! that race means another writer got there first, so the row is read
//! again and the merge redone. The last of [`MAX_WRITE_ATTEMPTS`] reads the
//! row inside the write transaction, so a live row always gets written.

use std::collections::{BTreeMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::helpers::row_to_review;
use super::history::insert_history;
use super::{ReviewStore, Result, MAX_WRITE_ATTEMPTS};
use crate::models::{
    ChangedFields, HistoryAction, NewHistoryEntry, OwnerResponse, ReviewObservation, ScrapeMode,
    StoredReview, UpsertCounts, UpsertOutcome,
};
use crate::repository::{now_timestamp, RepositoryError};

/// Field values produced by merging an observation into a stored row.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MergedReview {
    pub author: String,
    pub rating: f64,
    pub text: BTreeMap<String, String>,
    pub review_date: String,
    pub raw_date: String,
    pub likes: i64,
    pub user_images: Vec<String>,
    pub profile_url: String,
    pub profile_picture: String,
    pub owner_responses: BTreeMap<String, OwnerResponse>,
}

impl ReviewStore {
    /// Get one review, deleted or not.
    pub fn get_review(&self, review_id: &str, place_id: &str) -> Result<Option<StoredReview>> {
        read_review(&self.conn, review_id, place_id)
    }

    /// Reviews for a place, newest first.
    pub fn get_reviews(
        &self,
        place_id: &str,
        limit: Option<usize>,
        offset: usize,
        include_deleted: bool,
    ) -> Result<Vec<StoredReview>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = self.conn.prepare(
            r#"
            SELECT * FROM reviews
            WHERE place_id = ?1 AND (?2 OR is_deleted = 0)
            ORDER BY created_date DESC, review_id
            LIMIT ?3 OFFSET ?4
            "#,
        )?;
        let reviews = stmt
            .query_map(
                params![place_id, include_deleted, limit, offset as i64],
                row_to_review,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    /// Count reviews for a place.
    pub fn count_reviews(&self, place_id: &str, include_deleted: bool) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE place_id = ?1 AND (?2 OR is_deleted = 0)",
            params![place_id, include_deleted],
            |row| row.get(0),
        )?)
    }

    /// Ids of every non-deleted review of a place.
    pub fn get_review_ids(&self, place_id: &str) -> Result<HashSet<String>> {
        review_ids_in(&self.conn, place_id)
    }

    /// Whether `content_hash` differs from what is stored. Unknown reviews count as changed.
    pub fn review_changed(&self, review_id: &str, place_id: &str, content_hash: &str) -> Result<bool> {
        let stored: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT content_hash FROM reviews WHERE review_id = ?1 AND place_id = ?2",
                params![review_id, place_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match stored {
            Some(hash) => hash.as_deref() != Some(content_hash),
            None => true,
        })
    }

    /// Whether a scraper should stop paging: true once this unchanged review
    /// would make `threshold` unchanged reviews in a row.
    pub fn should_stop(
        &self,
        review_id: &str,
        place_id: &str,
        content_hash: &str,
        consecutive_unchanged: u32,
        threshold: u32,
    ) -> Result<bool> {
        if self.review_changed(review_id, place_id, content_hash)? {
            return Ok(false);
        }
        Ok(consecutive_unchanged + 1 >= threshold)
    }

    /// Apply one observation. See the module docs for the retry scheme.
    pub fn upsert_review(
        &self,
        place_id: &str,
        observation: &ReviewObservation,
        session_id: Option<i64>,
        mode: ScrapeMode,
    ) -> Result<UpsertOutcome> {
        let review_id = observation.review_id.as_str();
        let content_hash = observation.content_hash();
        let engagement_hash = observation.engagement_hash();

        for attempt in 1..MAX_WRITE_ATTEMPTS {
            let done = match read_review(&self.conn, review_id, place_id)? {
                None => self
                    .write(|conn| {
                        insert_review_in(conn, place_id, observation, session_id, &content_hash, &engagement_hash)
                    })?
                    .then_some(UpsertOutcome::New),
                Some(existing) => match plan_update(&existing, observation, mode, &content_hash, &engagement_hash) {
                    Plan::Touch => {
                        touch_last_seen(&self.conn, review_id, place_id, session_id)?;
                        Some(UpsertOutcome::Unchanged)
                    }
                    Plan::Write { merged, changed_fields } => self
                        .write(|conn| {
                            write_merged_in(
                                conn,
                                &existing,
                                &merged,
                                session_id,
                                &content_hash,
                                &engagement_hash,
                                changed_fields,
                            )
                        })?
                        .then(|| written_outcome(&existing)),
                },
            };
            if let Some(outcome) = done {
                return Ok(outcome);
            }
            debug!(review_id, place_id, attempt, "Lost a write race, re-reading");
        }

        // Last attempt: read under the write lock so no other writer can move the row.
        let done = self.write(|conn| {
            let Some(existing) = read_review(conn, review_id, place_id)? else {
                let inserted =
                    insert_review_in(conn, place_id, observation, session_id, &content_hash, &engagement_hash)?;
                return Ok(inserted.then_some(UpsertOutcome::New));
            };
            match plan_update(&existing, observation, mode, &content_hash, &engagement_hash) {
                Plan::Touch => {
                    touch_last_seen(conn, review_id, place_id, session_id)?;
                    Ok(Some(UpsertOutcome::Unchanged))
                }
                Plan::Write { merged, changed_fields } => Ok(write_merged_in(
                    conn,
                    &existing,
                    &merged,
                    session_id,
                    &content_hash,
                    &engagement_hash,
                    changed_fields,
                )?
                .then(|| written_outcome(&existing))),
            }
        })?;

        match done {
            Some(outcome) => Ok(outcome),
            None => {
                warn!(review_id, place_id, "Giving up on review after repeated conflicts");
                Err(RepositoryError::Conflict {
                    review_id: review_id.to_string(),
                    place_id: place_id.to_string(),
                    attempts: MAX_WRITE_ATTEMPTS,
                })
            }
        }
    }

    /// Apply a batch and refresh the place's review total once at the end.
    pub fn flush_batch(
        &self,
        place_id: &str,
        observations: &[ReviewObservation],
        session_id: Option<i64>,
        mode: ScrapeMode,
    ) -> Result<UpsertCounts> {
        let mut counts = UpsertCounts::default();
        for observation in observations {
            let outcome = self.upsert_review(place_id, observation, session_id, mode)?;
            counts.record(outcome);
        }
        self.write(|conn| refresh_total_reviews(conn, place_id))?;
        debug!(
            place_id,
            new = counts.new,
            updated = counts.updated,
            restored = counts.restored,
            unchanged = counts.unchanged,
            "Flushed review batch"
        );
        Ok(counts)
    }
}

/// What an observation does to an existing row.
enum Plan {
    /// Nothing to apply; only `last_seen_session` moves.
    Touch,
    Write {
        merged: MergedReview,
        changed_fields: ChangedFields,
    },
}

fn plan_update(
    existing: &StoredReview,
    observation: &ReviewObservation,
    mode: ScrapeMode,
    content_hash: &str,
    engagement_hash: &str,
) -> Plan {
    let content_changed = existing.content_hash != content_hash;
    let engagement_changed = existing.engagement_hash != engagement_hash;

    if !existing.is_deleted && (mode == ScrapeMode::NewOnly || (!content_changed && !engagement_changed)) {
        return Plan::Touch;
    }

    let mut changed_fields = ChangedFields::new();
    if content_changed {
        changed_fields.insert(
            "content_hash".to_string(),
            [existing.content_hash.clone(), content_hash.to_string()],
        );
    }
    if engagement_changed {
        changed_fields.insert(
            "engagement_hash".to_string(),
            [existing.engagement_hash.clone(), engagement_hash.to_string()],
        );
    }

    Plan::Write {
        merged: merge_observation(existing, observation),
        changed_fields,
    }
}

fn written_outcome(existing: &StoredReview) -> UpsertOutcome {
    if existing.is_deleted {
        UpsertOutcome::Restored
    } else {
        UpsertOutcome::Updated
    }
}

fn read_review(conn: &Connection, review_id: &str, place_id: &str) -> Result<Option<StoredReview>> {
    Ok(conn
        .query_row(
            "SELECT * FROM reviews WHERE review_id = ?1 AND place_id = ?2",
            params![review_id, place_id],
            row_to_review,
        )
        .optional()?)
}

/// Insert a brand-new row. Returns false if another writer inserted it first.
fn insert_review_in(
    conn: &Connection,
    place_id: &str,
    observation: &ReviewObservation,
    session_id: Option<i64>,
    content_hash: &str,
    engagement_hash: &str,
) -> Result<bool> {
    let text = serde_json::to_string(&observation.text_map())?;
    let images = serde_json::to_string(&dedup_images(&[], &observation.photo_urls))?;
    let owner = serde_json::to_string(&observation.owner_map())?;

    let now = now_timestamp();
    let inserted = conn.execute(
        r#"
        INSERT INTO reviews (
            review_id, place_id, author, rating, review_text, review_date,
            raw_date, likes, user_images, profile_url, profile_picture,
            owner_responses, created_date, last_modified, last_seen_session,
            last_changed_session, is_deleted, content_hash, engagement_hash, row_version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?14, ?14, 0, ?15, ?16, 1)
        ON CONFLICT(review_id, place_id) DO NOTHING
        "#,
        params![
            observation.review_id,
            place_id,
            observation.author,
            observation.rating,
            text,
            observation.review_date,
            observation.raw_date,
            observation.likes,
            images,
            observation.profile_url,
            observation.avatar_url,
            owner,
            now,
            session_id,
            content_hash,
            engagement_hash,
        ],
    )?;
    if inserted == 0 {
        return Ok(false);
    }

    insert_history(
        conn,
        &NewHistoryEntry {
            session_id,
            new_content_hash: Some(content_hash),
            new_engagement_hash: Some(engagement_hash),
            ..NewHistoryEntry::new(&observation.review_id, place_id, HistoryAction::Insert)
        },
    )?;
    Ok(true)
}

/// Write a merged row if nobody bumped `row_version` since `existing` was read.
fn write_merged_in(
    conn: &Connection,
    existing: &StoredReview,
    merged: &MergedReview,
    session_id: Option<i64>,
    content_hash: &str,
    engagement_hash: &str,
    changed_fields: ChangedFields,
) -> Result<bool> {
    let text = serde_json::to_string(&merged.text)?;
    let images = serde_json::to_string(&merged.user_images)?;
    let owner = serde_json::to_string(&merged.owner_responses)?;
    let action = if existing.is_deleted {
        HistoryAction::Restore
    } else {
        HistoryAction::Update
    };

    let updated = conn.execute(
        r#"
        UPDATE reviews SET
            author = ?1, rating = ?2, review_text = ?3, review_date = ?4,
            raw_date = ?5, likes = ?6, user_images = ?7, profile_url = ?8,
            profile_picture = ?9, owner_responses = ?10, last_modified = ?11,
            last_seen_session = ?12, last_changed_session = ?12,
            is_deleted = 0, content_hash = ?13, engagement_hash = ?14,
            row_version = row_version + 1
        WHERE review_id = ?15 AND place_id = ?16 AND row_version = ?17
        "#,
        params![
            merged.author,
            merged.rating,
            text,
            merged.review_date,
            merged.raw_date,
            merged.likes,
            images,
            merged.profile_url,
            merged.profile_picture,
            owner,
            now_timestamp(),
            session_id,
            content_hash,
            engagement_hash,
            existing.review_id,
            existing.place_id,
            existing.row_version,
        ],
    )?;
    if updated == 0 {
        return Ok(false);
    }

    insert_history(
        conn,
        &NewHistoryEntry {
            session_id,
            changed_fields: (!changed_fields.is_empty()).then_some(changed_fields),
            old_content_hash: Some(existing.content_hash.as_str()),
            new_content_hash: Some(content_hash),
            old_engagement_hash: Some(existing.engagement_hash.as_str()),
            new_engagement_hash: Some(engagement_hash),
            ..NewHistoryEntry::new(&existing.review_id, &existing.place_id, action)
        },
    )?;
    if existing.is_deleted {
        refresh_total_reviews(conn, &existing.place_id)?;
    }
    Ok(true)
}

fn touch_last_seen(conn: &Connection, review_id: &str, place_id: &str, session_id: Option<i64>) -> Result<()> {
    conn.execute(
        "UPDATE reviews SET last_seen_session = ?1 WHERE review_id = ?2 AND place_id = ?3",
        params![session_id, review_id, place_id],
    )?;
    Ok(())
}

pub(super) fn review_ids_in(conn: &Connection, place_id: &str) -> Result<HashSet<String>> {
    let mut stmt =
        conn.prepare("SELECT review_id FROM reviews WHERE place_id = ?1 AND is_deleted = 0")?;
    let ids = stmt
        .query_map(params![place_id], |row| row.get(0))?
        .collect::<std::result::Result<HashSet<String>, _>>()?;
    Ok(ids)
}

/// Recompute the denormalized non-deleted review count.
pub(super) fn refresh_total_reviews(conn: &Connection, place_id: &str) -> Result<()> {
    conn.execute(
        r#"
        UPDATE places SET total_reviews = (
            SELECT COUNT(*) FROM reviews WHERE place_id = ?1 AND is_deleted = 0
        )
        WHERE place_id = ?1
        "#,
        params![place_id],
    )?;
    Ok(())
}

/// Fold a fresh observation into the stored row.
///
/// Language maps gain new keys and take the new text for existing ones,
/// image lists are unioned in first-seen order, the longer avatar URL wins,
/// likes never go down, and empty observed fields keep the stored value.
pub(crate) fn merge_observation(existing: &StoredReview, observation: &ReviewObservation) -> MergedReview {
    let mut text = existing.text.clone();
    text.extend(observation.text_map());

    let mut owner_responses = existing.owner_responses.clone();
    owner_responses.extend(observation.owner_map());

    let avatar = &observation.avatar_url;
    let profile_picture = if !avatar.is_empty()
        && (existing.profile_picture.is_empty() || avatar.len() > existing.profile_picture.len())
    {
        avatar.clone()
    } else {
        existing.profile_picture.clone()
    };

    MergedReview {
        author: non_empty_or(&observation.author, &existing.author),
        rating: if observation.rating != 0.0 {
            observation.rating
        } else {
            existing.rating
        },
        text,
        review_date: non_empty_or(&observation.review_date, &existing.review_date),
        raw_date: non_empty_or(&observation.raw_date, &existing.raw_date),
        likes: observation.likes.max(existing.likes),
        user_images: dedup_images(&existing.user_images, &observation.photo_urls),
        profile_url: non_empty_or(&observation.profile_url, &existing.profile_url),
        profile_picture,
        owner_responses,
    }
}

fn non_empty_or(new: &str, old: &str) -> String {
    if new.is_empty() {
        old.to_string()
    } else {
        new.to_string()
    }
}

fn dedup_images(existing: &[String], observed: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(observed)
        .filter(|url| !url.is_empty() && seen.insert(url.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{observation, open_store, seed_place};
    use super::*;

    #[test]
    fn same_observation_twice_is_new_then_unchanged() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let obs = observation("r1", "Great!");

        let first = store.upsert_review("P", &obs, None, ScrapeMode::Update).unwrap();
        let second = store.upsert_review("P", &obs, None, ScrapeMode::Update).unwrap();

        assert_eq!(first, UpsertOutcome::New);
        assert_eq!(second, UpsertOutcome::Unchanged);
        let row = store.get_review("r1", "P").unwrap().unwrap();
        assert_eq!(row.row_version, 1);
        assert_eq!(store.get_review_history("r1", "P").unwrap().len(), 1);
    }

    #[test]
    fn reparsed_date_alone_is_unchanged() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let obs = observation("r1", "Great!");
        store.upsert_review("P", &obs, None, ScrapeMode::Update).unwrap();

        let mut next_day = obs.clone();
        next_day.review_date = "2026-08-17T00:00:00Z".to_string();
        let outcome = store
            .upsert_review("P", &next_day, None, ScrapeMode::Update)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
    }

    #[test]
    fn text_edit_updates_and_records_hashes() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .upsert_review("P", &observation("r1", "Great!"), None, ScrapeMode::Update)
            .unwrap();
        let before = store.get_review("r1", "P").unwrap().unwrap();

        let outcome = store
            .upsert_review("P", &observation("r1", "Amazing!"), None, ScrapeMode::Update)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let after = store.get_review("r1", "P").unwrap().unwrap();
        assert_eq!(after.row_version, 2);
        assert_ne!(after.content_hash, before.content_hash);
        assert_eq!(after.engagement_hash, before.engagement_hash);
        assert_eq!(after.text.get("en").map(String::as_str), Some("Amazing!"));

        let history = store.get_review_history("r1", "P").unwrap();
        let update = history.last().unwrap();
        assert_eq!(update.action, HistoryAction::Update);
        assert_eq!(update.old_content_hash.as_deref(), Some(before.content_hash.as_str()));
        assert_eq!(update.new_content_hash.as_deref(), Some(after.content_hash.as_str()));
        let fields = update.changed_fields.as_ref().unwrap();
        assert!(fields.contains_key("content_hash"));
        assert!(!fields.contains_key("engagement_hash"));
    }

    #[test]
    fn new_only_mode_never_rewrites_existing_rows() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .upsert_review("P", &observation("r1", "Great!"), None, ScrapeMode::Update)
            .unwrap();

        let outcome = store
            .upsert_review("P", &observation("r1", "Edited"), None, ScrapeMode::NewOnly)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        let row = store.get_review("r1", "P").unwrap().unwrap();
        assert_eq!(row.text.get("en").map(String::as_str), Some("Great!"));
        assert_eq!(row.row_version, 1);
    }

    #[test]
    fn merge_unions_and_keeps_best_values() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let mut first = observation("r1", "Great!");
        first.likes = 7;
        first.photo_urls = vec!["a.jpg".to_string(), "b.jpg".to_string()];
        first.avatar_url = "https://img/long-avatar-url".to_string();
        store.upsert_review("P", &first, None, ScrapeMode::Update).unwrap();

        let mut second = observation("r1", "Genial!");
        second.lang = "es".to_string();
        second.likes = 3;
        second.author.clear();
        second.photo_urls = vec!["b.jpg".to_string(), "c.jpg".to_string()];
        second.avatar_url = "https://img/short".to_string();
        second.owner_text = "Gracias".to_string();
        store.upsert_review("P", &second, None, ScrapeMode::Update).unwrap();

        let row = store.get_review("r1", "P").unwrap().unwrap();
        assert_eq!(row.text.len(), 2);
        assert_eq!(row.user_images, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(row.likes, 7);
        assert_eq!(row.author, "Dana");
        assert_eq!(row.profile_picture, "https://img/long-avatar-url");
        assert_eq!(row.owner_responses["en"].text, "Gracias");
    }

    #[test]
    fn stale_row_version_loses_the_race() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        store
            .upsert_review("P", &observation("r1", "Great!"), None, ScrapeMode::Update)
            .unwrap();
        let stale = store.get_review("r1", "P").unwrap().unwrap();

        // Another writer gets in first.
        store
            .upsert_review("P", &observation("r1", "Amazing!"), None, ScrapeMode::Update)
            .unwrap();

        let edit = observation("r1", "Superb!");
        let merged = merge_observation(&stale, &edit);
        let written = store
            .write(|conn| {
                write_merged_in(
                    conn,
                    &stale,
                    &merged,
                    None,
                    &edit.content_hash(),
                    &edit.engagement_hash(),
                    ChangedFields::new(),
                )
            })
            .unwrap();
        assert!(!written);

        // The public path re-reads and succeeds.
        let outcome = store.upsert_review("P", &edit, None, ScrapeMode::Update).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(store.get_review("r1", "P").unwrap().unwrap().row_version, 3);
    }

    #[test]
    fn flush_batch_counts_and_refreshes_total() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let batch = vec![observation("r1", "One"), observation("r2", "Two")];
        let counts = store.flush_batch("P", &batch, None, ScrapeMode::Update).unwrap();
        assert_eq!(counts.new, 2);

        let counts = store.flush_batch("P", &batch, None, ScrapeMode::Update).unwrap();
        assert_eq!(counts.unchanged, 2);
        assert_eq!(store.get_place("P").unwrap().unwrap().total_reviews, 2);
        assert_eq!(store.count_reviews("P", false).unwrap(), 2);
    }

    #[test]
    fn pagination_and_stop_signal() {
        let (_dir, store) = open_store();
        seed_place(&store, "P");
        let batch: Vec<_> = (0..5)
            .map(|i| observation(&format!("r{}", i), "text"))
            .collect();
        store.flush_batch("P", &batch, None, ScrapeMode::Update).unwrap();

        assert_eq!(store.get_reviews("P", Some(2), 0, false).unwrap().len(), 2);
        assert_eq!(store.get_reviews("P", Some(10), 4, false).unwrap().len(), 1);
        assert_eq!(store.get_reviews("P", None, 0, false).unwrap().len(), 5);

        let hash = batch[0].content_hash();
        assert!(!store.review_changed("r0", "P", &hash).unwrap());
        assert!(store.review_changed("nope", "P", &hash).unwrap());
        assert!(!store.should_stop("r0", "P", &hash, 1, 3).unwrap());
        assert!(store.should_stop("r0", "P", &hash, 2, 3).unwrap());
    }
}
