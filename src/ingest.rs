//! Scrape ingestion.
//!
//! A scraper hands over one [`ScrapeBatch`] per place. Ingestion records the
//! place, applies the reviews under a new session, soft-deletes reviews that
//! disappeared from an exhaustive pass and then hands the live set to the
//! sync pipeline.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::identity::extract_place_id;
use crate::models::{ReviewObservation, ScrapeMode, SessionStatus, SessionTotals, UpsertCounts};
use crate::repository::{EnumerationPass, Result, ReviewStorage};
use crate::sync::{SyncOrchestrator, SyncReport};

/// Everything a scraper observed for one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeBatch {
    pub original_url: String,
    /// URL the browser ended up on after redirects.
    pub resolved_url: String,
    pub place_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub sort_by: Option<String>,
    pub reviews: Vec<ReviewObservation>,
    /// Whether the scraper paged through every review of the place.
    pub exhaustive: bool,
}

impl ScrapeBatch {
    fn pass(&self) -> EnumerationPass {
        if self.exhaustive {
            EnumerationPass::Exhaustive
        } else {
            EnumerationPass::Partial
        }
    }
}

/// What one ingestion run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeReport {
    pub place_id: String,
    pub session_id: i64,
    pub counts: UpsertCounts,
    pub soft_deleted: usize,
    pub sync: SyncReport,
}

/// Ingest one batch and run the sync pipeline over the place's live reviews.
///
/// A storage failure ends the session as failed and is returned; pipeline
/// task failures are only reported.
pub fn run_scrape<S: ReviewStorage + ?Sized>(
    store: &S,
    orchestrator: &SyncOrchestrator,
    mode: ScrapeMode,
    batch: &ScrapeBatch,
) -> Result<ScrapeReport> {
    let derived_id = extract_place_id(&batch.original_url, &batch.resolved_url);
    let resolved_url = (!batch.resolved_url.is_empty()).then_some(batch.resolved_url.as_str());
    let place_id = store.upsert_place(
        &derived_id,
        &batch.place_name,
        &batch.original_url,
        resolved_url,
        batch.latitude,
        batch.longitude,
    )?;
    if place_id != derived_id {
        info!(alias = %derived_id, place_id = %place_id, "Place resolved through alias");
    }

    let session_id = store.start_session(&place_id, batch.sort_by.as_deref(), "scrape")?;
    info!(place_id = %place_id, session_id, reviews = batch.reviews.len(), mode = mode.as_str(), "Ingesting scrape batch");

    let applied = apply_batch(store, &place_id, session_id, mode, batch);
    let (counts, soft_deleted) = match applied {
        Ok(applied) => applied,
        Err(err) => {
            error!(place_id = %place_id, session_id, error = %err, "Scrape ingestion failed");
            let message = err.to_string();
            if let Err(close_err) = store.end_session(
                session_id,
                SessionStatus::Failed,
                SessionTotals::default(),
                Some(&message),
            ) {
                warn!(session_id, error = %close_err, "Could not close failed scrape session");
            }
            return Err(err);
        }
    };

    let totals = SessionTotals {
        found: batch.reviews.len() as i64,
        new: counts.new as i64,
        updated: (counts.updated + counts.restored) as i64,
    };
    store.end_session(session_id, SessionStatus::Completed, totals, None)?;
    info!(
        place_id = %place_id,
        session_id,
        new = counts.new,
        updated = counts.updated,
        restored = counts.restored,
        unchanged = counts.unchanged,
        soft_deleted,
        "Scrape session completed"
    );

    let reviews = store.live_reviews(&place_id)?;
    let seen: HashSet<String> = batch.reviews.iter().map(|r| r.review_id.clone()).collect();
    let sync = orchestrator.run(store, &place_id, Some(session_id), &reviews, Some(&seen));

    Ok(ScrapeReport {
        place_id,
        session_id,
        counts,
        soft_deleted,
        sync,
    })
}

fn apply_batch<S: ReviewStorage + ?Sized>(
    store: &S,
    place_id: &str,
    session_id: i64,
    mode: ScrapeMode,
    batch: &ScrapeBatch,
) -> Result<(UpsertCounts, usize)> {
    let counts = store.flush_batch(place_id, &batch.reviews, Some(session_id), mode)?;
    let seen: HashSet<String> = batch.reviews.iter().map(|r| r.review_id.clone()).collect();
    let soft_deleted = store.mark_stale(place_id, Some(session_id), &seen, batch.pass())?;
    Ok((counts, soft_deleted))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::Settings;
    use crate::models::{CheckpointUpdate, StoredReview, SyncCheckpoint};
    use crate::repository::{RepositoryError, ReviewStore};

    fn review(id: &str, text: &str) -> ReviewObservation {
        ReviewObservation {
            review_id: id.to_string(),
            text: text.to_string(),
            rating: 5.0,
            raw_date: "a week ago".to_string(),
            ..Default::default()
        }
    }

    fn batch(reviews: Vec<ReviewObservation>, exhaustive: bool) -> ScrapeBatch {
        ScrapeBatch {
            original_url: "https://www.google.com/maps/place/Cafe/data=!4m2!3m1!1s0x1:0xabc123".to_string(),
            place_name: "Cafe".to_string(),
            reviews,
            exhaustive,
            ..Default::default()
        }
    }

    fn setup() -> (tempfile::TempDir, ReviewStore, SyncOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let store = ReviewStore::open(&dir.path().join("reviews.db")).unwrap();
        let orchestrator = SyncOrchestrator::new(Settings {
            backup_to_json: true,
            json_path: dir.path().join("backup.json"),
            seen_ids_path: dir.path().join("seen.ids"),
            ..Settings::default()
        });
        (dir, store, orchestrator)
    }

    #[test]
    fn first_scrape_inserts_and_syncs() {
        let (dir, store, orchestrator) = setup();
        let report = run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good"), review("b", "fine")], true),
        )
        .unwrap();

        assert_eq!(report.place_id, "0x1:0xabc123");
        assert_eq!(report.counts.new, 2);
        assert_eq!(report.soft_deleted, 0);
        assert_eq!(report.sync.failures(), 0);

        let session = store.get_session(report.session_id).unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.reviews_found, 2);
        assert_eq!(session.reviews_new, 2);

        let place = store.get_place(&report.place_id).unwrap().unwrap();
        assert_eq!(place.total_reviews, 2);
        assert!(dir.path().join("backup.json").exists());
        assert!(dir.path().join("seen.ids").exists());
    }

    #[test]
    fn exhaustive_rescrape_soft_deletes_missing_reviews() {
        let (_dir, store, orchestrator) = setup();
        run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good"), review("b", "fine")], true),
        )
        .unwrap();

        let report = run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "better now")], true),
        )
        .unwrap();

        assert_eq!(report.counts.updated, 1);
        assert_eq!(report.soft_deleted, 1);
        let b = store.get_review("b", &report.place_id).unwrap().unwrap();
        assert!(b.is_deleted);

        let session = store.get_session(report.session_id).unwrap().unwrap();
        assert_eq!(session.reviews_updated, 1);
    }

    #[test]
    fn partial_rescrape_keeps_unseen_reviews() {
        let (_dir, store, orchestrator) = setup();
        run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good"), review("b", "fine")], true),
        )
        .unwrap();

        let report = run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good")], false),
        )
        .unwrap();

        assert_eq!(report.soft_deleted, 0);
        assert_eq!(report.counts.unchanged, 1);
        assert_eq!(store.count_reviews(&report.place_id, false).unwrap(), 2);
    }

    #[test]
    fn returning_review_counts_as_updated() {
        let (_dir, store, orchestrator) = setup();
        let full = batch(vec![review("a", "good"), review("b", "fine")], true);
        run_scrape(&store, &orchestrator, ScrapeMode::Update, &full).unwrap();
        run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good")], true),
        )
        .unwrap();

        let report = run_scrape(&store, &orchestrator, ScrapeMode::Update, &full).unwrap();
        assert_eq!(report.counts.restored, 1);
        let session = store.get_session(report.session_id).unwrap().unwrap();
        assert_eq!(session.reviews_updated, 1);
    }

    /// Delegates to a real store but fails the batch write and the session close.
    struct FailingStore {
        inner: ReviewStore,
    }

    impl ReviewStorage for FailingStore {
        fn upsert_place(
            &self,
            place_id: &str,
            place_name: &str,
            original_url: &str,
            resolved_url: Option<&str>,
            latitude: Option<f64>,
            longitude: Option<f64>,
        ) -> Result<String> {
            self.inner
                .upsert_place(place_id, place_name, original_url, resolved_url, latitude, longitude)
        }

        fn start_session(&self, place_id: &str, sort_by: Option<&str>, action: &str) -> Result<i64> {
            self.inner.start_session(place_id, sort_by, action)
        }

        fn end_session(
            &self,
            _session_id: i64,
            _status: SessionStatus,
            _totals: SessionTotals,
            _error: Option<&str>,
        ) -> Result<bool> {
            Err(RepositoryError::NotFound("session table".to_string()))
        }

        fn flush_batch(
            &self,
            _place_id: &str,
            _observations: &[ReviewObservation],
            _session_id: Option<i64>,
            _mode: ScrapeMode,
        ) -> Result<UpsertCounts> {
            Err(RepositoryError::NotFound("reviews table".to_string()))
        }

        fn mark_stale(
            &self,
            place_id: &str,
            session_id: Option<i64>,
            scraped_ids: &HashSet<String>,
            pass: EnumerationPass,
        ) -> Result<usize> {
            self.inner.mark_stale(place_id, session_id, scraped_ids, pass)
        }

        fn live_reviews(&self, place_id: &str) -> Result<Vec<StoredReview>> {
            ReviewStorage::live_reviews(&self.inner, place_id)
        }

        fn get_sync_checkpoint(&self, place_id: &str, target: &str) -> Result<Option<SyncCheckpoint>> {
            self.inner.get_sync_checkpoint(place_id, target)
        }

        fn update_sync_checkpoint(&self, place_id: &str, target: &str, update: &CheckpointUpdate) -> Result<()> {
            self.inner.update_sync_checkpoint(place_id, target, update)
        }

        fn mark_images_uploaded(
            &self,
            review_id: &str,
            place_id: &str,
            image_urls: &BTreeMap<String, String>,
            profile_url: Option<&str>,
        ) -> Result<bool> {
            self.inner
                .mark_images_uploaded(review_id, place_id, image_urls, profile_url)
        }
    }

    #[test]
    fn storage_error_survives_failed_session_close() {
        let (_dir, store, orchestrator) = setup();
        let store = FailingStore { inner: store };

        let result = run_scrape(
            &store,
            &orchestrator,
            ScrapeMode::Update,
            &batch(vec![review("a", "good")], true),
        );

        match result {
            Err(RepositoryError::NotFound(what)) => assert_eq!(what, "reviews table"),
            Err(other) => panic!("wrong error returned: {}", other),
            Ok(_) => panic!("batch failure was swallowed"),
        }
    }
}
