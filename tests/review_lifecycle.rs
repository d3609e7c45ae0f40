//! End-to-end review lifecycle through ingestion and the sync pipeline.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use reviewsync::config::Settings;
use reviewsync::ingest::{run_scrape, ScrapeBatch};
use reviewsync::models::{
    CheckpointStatus, HistoryAction, ReviewDocument, ReviewObservation, ScrapeMode,
};
use reviewsync::repository::ReviewStore;
use reviewsync::sync::{DocumentWriter, SyncOrchestrator, SyncTask, TaskOutcome};

const PLACE_URL: &str = "https://www.google.com/maps/place/Cafe/@1,2,17z/data=!4m6!3m5!1s0x14a:0x9f2b";

#[derive(Clone, Default)]
struct RecordingStore {
    batches: Arc<Mutex<Vec<Vec<String>>>>,
    down: Arc<Mutex<bool>>,
}

impl DocumentWriter for RecordingStore {
    fn existing_ids(&self, _place_id: &str) -> anyhow::Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    fn write(&self, _place_id: &str, documents: &[ReviewDocument]) -> anyhow::Result<usize> {
        if *self.down.lock().unwrap() {
            anyhow::bail!("server selection timeout");
        }
        self.batches
            .lock()
            .unwrap()
            .push(documents.iter().map(|d| d.review_id.clone()).collect());
        Ok(documents.len())
    }
}

fn r1(text: &str, review_date: &str) -> ReviewObservation {
    ReviewObservation {
        review_id: "r1".to_string(),
        text: text.to_string(),
        rating: 5.0,
        raw_date: "2 months ago".to_string(),
        review_date: review_date.to_string(),
        author: "Dana".to_string(),
        ..Default::default()
    }
}

fn other(id: &str) -> ReviewObservation {
    ReviewObservation {
        review_id: id.to_string(),
        text: format!("review {}", id),
        rating: 3.0,
        raw_date: "a year ago".to_string(),
        ..Default::default()
    }
}

fn batch(reviews: Vec<ReviewObservation>) -> ScrapeBatch {
    ScrapeBatch {
        original_url: PLACE_URL.to_string(),
        place_name: "Cafe".to_string(),
        reviews,
        exhaustive: true,
        ..Default::default()
    }
}

#[test]
fn review_is_inserted_updated_deleted_and_restored() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReviewStore::open(&dir.path().join("reviews.db")).unwrap();
    let settings = Settings {
        use_mongodb: true,
        backup_to_json: true,
        json_path: dir.path().join("backup.json"),
        seen_ids_path: dir.path().join("seen.ids"),
        ..Settings::default()
    };
    let target = RecordingStore::default();
    let orchestrator = SyncOrchestrator::new(settings).with_document_store(Box::new(target.clone()));
    let scrape = |reviews| run_scrape(&store, &orchestrator, ScrapeMode::Update, &batch(reviews)).unwrap();

    let first = scrape(vec![r1("Great!", "2026-08-16T00:00:00Z"), other("r2")]);
    let place = first.place_id.clone();
    assert_eq!(place, "0x14a:0x9f2b");
    assert_eq!(first.counts.new, 2);
    assert_eq!(store.get_review("r1", &place).unwrap().unwrap().row_version, 1);

    // Same review, freshly parsed date.
    let second = scrape(vec![r1("Great!", "2026-08-17T00:00:00Z"), other("r2")]);
    assert_eq!(second.counts.unchanged, 2);
    assert_eq!(store.get_review("r1", &place).unwrap().unwrap().row_version, 1);

    let third = scrape(vec![r1("Amazing!", "2026-08-17T00:00:00Z"), other("r2")]);
    assert_eq!(third.counts.updated, 1);
    let row = store.get_review("r1", &place).unwrap().unwrap();
    assert_eq!(row.row_version, 2);
    assert_eq!(row.text.get("en").map(String::as_str), Some("Amazing!"));

    let history = store.get_review_history("r1", &place).unwrap();
    let update = history
        .iter()
        .find(|h| h.action == HistoryAction::Update)
        .unwrap();
    assert_ne!(update.old_content_hash, update.new_content_hash);
    assert_eq!(update.old_engagement_hash, update.new_engagement_hash);

    let fourth = scrape(vec![other("r2")]);
    assert_eq!(fourth.soft_deleted, 1);
    let row = store.get_review("r1", &place).unwrap().unwrap();
    assert!(row.is_deleted);
    assert_eq!(store.get_place(&place).unwrap().unwrap().total_reviews, 1);

    let fifth = scrape(vec![r1("Amazing!", "2026-08-18T00:00:00Z"), other("r2")]);
    assert_eq!(fifth.counts.restored, 1);
    let row = store.get_review("r1", &place).unwrap().unwrap();
    assert!(!row.is_deleted);

    let actions: Vec<HistoryAction> = store
        .get_review_history("r1", &place)
        .unwrap()
        .iter()
        .map(|h| h.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Insert,
            HistoryAction::Update,
            HistoryAction::SoftDelete,
            HistoryAction::Restore,
        ]
    );

    // The pipeline saw only live reviews after the delete.
    let batches = target.batches.lock().unwrap();
    assert_eq!(batches.len(), 5);
    assert_eq!(batches[3], vec!["r2".to_string()]);
}

#[test]
fn failing_target_leaves_partial_checkpoint_until_next_success() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReviewStore::open(&dir.path().join("reviews.db")).unwrap();
    let settings = Settings {
        use_mongodb: true,
        backup_to_json: true,
        json_path: dir.path().join("backup.json"),
        seen_ids_path: dir.path().join("seen.ids"),
        ..Settings::default()
    };
    let target = RecordingStore::default();
    let orchestrator = SyncOrchestrator::new(settings).with_document_store(Box::new(target.clone()));

    *target.down.lock().unwrap() = true;
    let report = run_scrape(&store, &orchestrator, ScrapeMode::Update, &batch(vec![other("r2")])).unwrap();
    assert!(matches!(
        report.sync.outcome(SyncTask::DocumentStore),
        Some(TaskOutcome::Failed(_))
    ));
    assert_eq!(report.sync.outcome(SyncTask::JsonBackup), Some(&TaskOutcome::Completed));

    let place = report.place_id.clone();
    let checkpoint = store.get_sync_checkpoint(&place, "mongodb").unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Partial);
    assert_eq!(checkpoint.attempt_count, 1);
    assert!(checkpoint.last_synced_at.is_none());

    *target.down.lock().unwrap() = false;
    let report = run_scrape(&store, &orchestrator, ScrapeMode::Update, &batch(vec![other("r2")])).unwrap();
    assert_eq!(report.sync.failures(), 0);

    let checkpoint = store.get_sync_checkpoint(&place, "mongodb").unwrap().unwrap();
    assert_eq!(checkpoint.status, CheckpointStatus::Ok);
    assert_eq!(checkpoint.attempt_count, 0);
    assert_eq!(checkpoint.last_synced_session, Some(report.session_id));
    assert_eq!(checkpoint.cursor_review_id.as_deref(), Some("r2"));
    assert!(checkpoint.error_message.is_none());
}
