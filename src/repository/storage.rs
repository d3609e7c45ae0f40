//! The storage seam used by ingestion and the sync pipeline.

use std::collections::{BTreeMap, HashSet};

use super::{EnumerationPass, Result, ReviewStore};
use crate::models::{
    CheckpointUpdate, ReviewObservation, ScrapeMode, SessionStatus, SessionTotals, StoredReview,
    SyncCheckpoint, UpsertCounts,
};

/// Operations the scrape and sync flows need from a review store.
///
/// Implementations hold their own connection and are used from one thread
/// at a time.
pub trait ReviewStorage: Send {
    fn upsert_place(
        &self,
        place_id: &str,
        place_name: &str,
        original_url: &str,
        resolved_url: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<String>;

    fn start_session(&self, place_id: &str, sort_by: Option<&str>, action: &str) -> Result<i64>;

    fn end_session(
        &self,
        session_id: i64,
        status: SessionStatus,
        totals: SessionTotals,
        error: Option<&str>,
    ) -> Result<bool>;

    fn flush_batch(
        &self,
        place_id: &str,
        observations: &[ReviewObservation],
        session_id: Option<i64>,
        mode: ScrapeMode,
    ) -> Result<UpsertCounts>;

    fn mark_stale(
        &self,
        place_id: &str,
        session_id: Option<i64>,
        scraped_ids: &HashSet<String>,
        pass: EnumerationPass,
    ) -> Result<usize>;

    /// Live reviews of a place, newest first.
    fn live_reviews(&self, place_id: &str) -> Result<Vec<StoredReview>>;

    fn get_sync_checkpoint(&self, place_id: &str, target: &str) -> Result<Option<SyncCheckpoint>>;

    fn update_sync_checkpoint(&self, place_id: &str, target: &str, update: &CheckpointUpdate) -> Result<()>;

    fn mark_images_uploaded(
        &self,
        review_id: &str,
        place_id: &str,
        image_urls: &BTreeMap<String, String>,
        profile_url: Option<&str>,
    ) -> Result<bool>;
}

impl ReviewStorage for ReviewStore {
    fn upsert_place(
        &self,
        place_id: &str,
        place_name: &str,
        original_url: &str,
        resolved_url: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<String> {
        ReviewStore::upsert_place(self, place_id, place_name, original_url, resolved_url, latitude, longitude)
    }

    fn start_session(&self, place_id: &str, sort_by: Option<&str>, action: &str) -> Result<i64> {
        ReviewStore::start_session(self, place_id, sort_by, action)
    }

    fn end_session(
        &self,
        session_id: i64,
        status: SessionStatus,
        totals: SessionTotals,
        error: Option<&str>,
    ) -> Result<bool> {
        ReviewStore::end_session(self, session_id, status, totals, error)
    }

    fn flush_batch(
        &self,
        place_id: &str,
        observations: &[ReviewObservation],
        session_id: Option<i64>,
        mode: ScrapeMode,
    ) -> Result<UpsertCounts> {
        ReviewStore::flush_batch(self, place_id, observations, session_id, mode)
    }

    fn mark_stale(
        &self,
        place_id: &str,
        session_id: Option<i64>,
        scraped_ids: &HashSet<String>,
        pass: EnumerationPass,
    ) -> Result<usize> {
        ReviewStore::mark_stale(self, place_id, session_id, scraped_ids, pass)
    }

    fn live_reviews(&self, place_id: &str) -> Result<Vec<StoredReview>> {
        self.get_reviews(place_id, None, 0, false)
    }

    fn get_sync_checkpoint(&self, place_id: &str, target: &str) -> Result<Option<SyncCheckpoint>> {
        ReviewStore::get_sync_checkpoint(self, place_id, target)
    }

    fn update_sync_checkpoint(&self, place_id: &str, target: &str, update: &CheckpointUpdate) -> Result<()> {
        ReviewStore::update_sync_checkpoint(self, place_id, target, update)
    }

    fn mark_images_uploaded(
        &self,
        review_id: &str,
        place_id: &str,
        image_urls: &BTreeMap<String, String>,
        profile_url: Option<&str>,
    ) -> Result<bool> {
        ReviewStore::mark_images_uploaded(self, review_id, place_id, image_urls, profile_url)
    }
}
