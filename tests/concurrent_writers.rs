//! Several writers on one database file.
//!
//! Each thread opens its own store and keeps rewriting the same review.
//! Every update must land: `row_version` moves exactly once per update and
//! leaves one history entry, and no writer gives up with `Conflict`.

use std::path::{Path, PathBuf};
use std::thread;

use reviewsync::models::{HistoryAction, ReviewObservation, ScrapeMode, UpsertOutcome};
use reviewsync::repository::ReviewStore;

const ROUNDS: u64 = 50;
const WRITERS: [&str; 4] = ["a", "b", "c", "d"];

fn observation(text: String) -> ReviewObservation {
    ReviewObservation {
        review_id: "shared".to_string(),
        text,
        rating: 4.0,
        raw_date: "a day ago".to_string(),
        ..Default::default()
    }
}

fn writer(path: PathBuf, tag: &'static str) -> thread::JoinHandle<u64> {
    thread::spawn(move || {
        let store = ReviewStore::open(&path).unwrap();
        let mut updated = 0;
        for round in 0..ROUNDS {
            let obs = observation(format!("{}-{}", tag, round));
            match store.upsert_review("P", &obs, None, ScrapeMode::Update) {
                Ok(UpsertOutcome::Updated) => updated += 1,
                Ok(other) => panic!("unexpected outcome {:?}", other),
                Err(e) => panic!("writer {} failed in round {}: {}", tag, round, e),
            }
        }
        updated
    })
}

fn seed(path: &Path) {
    let store = ReviewStore::open(path).unwrap();
    store
        .upsert_place("P", "Cafe", "https://example.com", None, None, None)
        .unwrap();
    let outcome = store
        .upsert_review("P", &observation("seed".to_string()), None, ScrapeMode::Update)
        .unwrap();
    assert_eq!(outcome, UpsertOutcome::New);
}

#[test]
fn concurrent_updates_are_never_lost() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviews.db");
    seed(&path);

    let handles: Vec<_> = WRITERS
        .iter()
        .map(|tag| writer(path.clone(), tag))
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), ROUNDS);
    }

    let total = ROUNDS * WRITERS.len() as u64;
    let store = ReviewStore::open(&path).unwrap();
    let row = store.get_review("shared", "P").unwrap().unwrap();
    assert_eq!(row.row_version as u64, 1 + total);

    let history = store.get_review_history("shared", "P").unwrap();
    let updates = history
        .iter()
        .filter(|h| h.action == HistoryAction::Update)
        .count() as u64;
    assert_eq!(updates, total);
    assert_eq!(history[0].action, HistoryAction::Insert);
}
