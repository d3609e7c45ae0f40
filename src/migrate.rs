//! Import of legacy JSON review documents.
//!
//! Older tooling kept reviews in a JSON file, either as a list of documents
//! or as an object keyed by review id, with a few spellings for the same
//! field. Documents are mapped to observations and applied through the
//! normal upsert path, so re-importing the same file is a no-op.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

use crate::identity::extract_place_id;
use crate::models::{ReviewObservation, ScrapeMode, SessionStatus, SessionTotals};
use crate::repository::{RepositoryError, ReviewStore};

#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("JSON file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unexpected JSON layout in {0}: expected a list or an object")]
    Layout(PathBuf),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Counts reported by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    pub total: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
}

/// Import a legacy JSON file into `store` under a `migrate_json` session.
///
/// All documents are attributed to the place derived from `place_url`.
/// Documents without a `review_id` are counted as skipped.
pub fn migrate_json(
    store: &ReviewStore,
    json_path: &Path,
    place_url: Option<&str>,
) -> Result<MigrationStats, MigrateError> {
    if !json_path.exists() {
        return Err(MigrateError::NotFound(json_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(json_path).map_err(|source| MigrateError::Read {
        path: json_path.to_path_buf(),
        source,
    })?;
    let data: Value = serde_json::from_str(&contents).map_err(|source| MigrateError::Parse {
        path: json_path.to_path_buf(),
        source,
    })?;

    let docs: Vec<Value> = match data {
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        _ => return Err(MigrateError::Layout(json_path.to_path_buf())),
    };

    if docs.is_empty() {
        info!(path = %json_path.display(), "No reviews found in JSON file");
        return Ok(MigrationStats::default());
    }

    let place_url = place_url.unwrap_or("");
    let place_id = store.upsert_place(
        &extract_place_id(place_url, place_url),
        "",
        place_url,
        None,
        None,
        None,
    )?;
    let session_id = store.start_session(&place_id, None, "migrate_json")?;

    let mut stats = MigrationStats {
        total: docs.len() as u64,
        ..Default::default()
    };
    let imported = import_documents(store, &place_id, session_id, &docs, &mut stats);
    if let Err(err) = imported {
        let message = err.to_string();
        store.end_session(session_id, SessionStatus::Failed, SessionTotals::default(), Some(&message))?;
        return Err(err.into());
    }

    store.end_session(
        session_id,
        SessionStatus::Completed,
        SessionTotals {
            found: stats.total as i64,
            new: stats.new as i64,
            updated: stats.updated as i64,
        },
        None,
    )?;
    info!(
        place_id = %place_id,
        session_id,
        total = stats.total,
        new = stats.new,
        updated = stats.updated,
        skipped = stats.skipped,
        "Migration from JSON complete"
    );
    Ok(stats)
}

fn import_documents(
    store: &ReviewStore,
    place_id: &str,
    session_id: i64,
    docs: &[Value],
    stats: &mut MigrationStats,
) -> Result<(), RepositoryError> {
    let observations: Vec<ReviewObservation> = docs
        .iter()
        .filter_map(|doc| doc.as_object().and_then(legacy_observation))
        .collect();
    stats.skipped = (docs.len() - observations.len()) as u64;

    let counts = store.flush_batch(place_id, &observations, Some(session_id), ScrapeMode::Update)?;
    stats.new = counts.new;
    stats.updated = counts.updated + counts.restored;
    Ok(())
}

/// Map one legacy document to an observation, or `None` without an id.
fn legacy_observation(doc: &Map<String, Value>) -> Option<ReviewObservation> {
    let review_id = str_field(doc, &["review_id"]);
    if review_id.is_empty() {
        return None;
    }

    let (lang, text) = match doc.get("description").and_then(Value::as_object) {
        Some(description) if !description.is_empty() => description
            .iter()
            .next()
            .map(|(lang, text)| (lang.clone(), text.as_str().unwrap_or_default().to_string()))
            .unwrap_or_default(),
        _ => {
            let text = str_field(doc, &["text"]);
            let lang = if text.is_empty() {
                String::new()
            } else {
                str_field(doc, &["lang"])
            };
            (lang, text)
        }
    };

    let owner_text = match doc.get("owner_responses").and_then(Value::as_object) {
        Some(responses) if !responses.is_empty() => responses
            .values()
            .next()
            .map(|resp| match resp {
                Value::Object(obj) => obj.get("text").and_then(Value::as_str).unwrap_or_default().to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        _ => str_field(doc, &["owner_text"]),
    };

    let photo_urls = ["user_images", "photos", "photo_urls"]
        .iter()
        .find_map(|key| doc.get(*key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(ReviewObservation {
        review_id,
        text,
        rating: doc.get("rating").and_then(Value::as_f64).unwrap_or(0.0),
        likes: doc
            .get("likes")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0),
        lang,
        raw_date: str_field(doc, &["date"]),
        review_date: str_field(doc, &["review_date"]),
        author: str_field(doc, &["author"]),
        profile_url: str_field(doc, &["author_profile_url", "profile_link", "profile"]),
        avatar_url: str_field(doc, &["profile_picture", "avatar_url", "avatar"]),
        owner_text,
        photo_urls,
    })
}

/// First present key among `keys`, as a string.
fn str_field(doc: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| doc.get(*key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn current_field_names_map_to_observation() {
        let obs = legacy_observation(&as_map(json!({
            "review_id": "r1",
            "author": "Alice",
            "rating": 5.0,
            "description": {"en": "Great!"},
            "likes": 3,
            "user_images": ["http://img1.jpg"],
            "author_profile_url": "http://profile",
            "profile_picture": "http://avatar.jpg",
            "owner_responses": {"en": {"text": "Thanks!"}},
            "date": "3 months ago",
            "review_date": "2025-06-15"
        })))
        .unwrap();

        assert_eq!(obs.text, "Great!");
        assert_eq!(obs.language(), "en");
        assert_eq!(obs.likes, 3);
        assert_eq!(obs.photo_urls, vec!["http://img1.jpg"]);
        assert_eq!(obs.profile_url, "http://profile");
        assert_eq!(obs.avatar_url, "http://avatar.jpg");
        assert_eq!(obs.owner_text, "Thanks!");
        assert_eq!(obs.raw_date, "3 months ago");
    }

    #[test]
    fn older_field_names_are_accepted() {
        let obs = legacy_observation(&as_map(json!({
            "review_id": "r2",
            "photo_urls": ["http://img.jpg"],
            "profile_link": "http://profile",
            "avatar_url": "http://avatar.jpg",
            "text": "Hola",
            "lang": "es",
            "owner_text": "Gracias",
            "rating": 4
        })))
        .unwrap();

        assert_eq!(obs.photo_urls, vec!["http://img.jpg"]);
        assert_eq!(obs.profile_url, "http://profile");
        assert_eq!(obs.avatar_url, "http://avatar.jpg");
        assert_eq!(obs.text_map().get("es").map(String::as_str), Some("Hola"));
        assert_eq!(obs.owner_text, "Gracias");
        assert_eq!(obs.rating, 4.0);
    }

    #[test]
    fn documents_without_id_are_rejected() {
        assert!(legacy_observation(&as_map(json!({"author": "Bob"}))).is_none());
        let empty = legacy_observation(&as_map(json!({"review_id": "r4", "description": {}}))).unwrap();
        assert_eq!(empty.text, "");
        assert_eq!(empty.language(), "en");
    }

    fn open(dir: &tempfile::TempDir) -> ReviewStore {
        ReviewStore::open(&dir.path().join("reviews.db")).unwrap()
    }

    #[test]
    fn list_import_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let path = dir.path().join("reviews.json");
        std::fs::write(
            &path,
            json!([
                {"review_id": "r1", "author": "Alice", "rating": 5.0, "description": {"en": "Great!"}},
                {"review_id": "r2", "author": "Bob", "rating": 4.0, "description": {"en": "Good"}},
                {"author": "nobody"}
            ])
            .to_string(),
        )
        .unwrap();

        let first = migrate_json(&store, &path, Some("https://maps.app.goo.gl/test123")).unwrap();
        assert_eq!(
            first,
            MigrationStats {
                total: 3,
                new: 2,
                updated: 0,
                skipped: 1
            }
        );

        let place = store.get_place("short:test123").unwrap().unwrap();
        assert_eq!(place.total_reviews, 2);

        let second = migrate_json(&store, &path, Some("https://maps.app.goo.gl/test123")).unwrap();
        assert_eq!(second.new, 0);
        assert_eq!(second.updated, 0);
    }

    #[test]
    fn object_layout_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let path = dir.path().join("reviews.json");
        std::fs::write(
            &path,
            json!({"r1": {"review_id": "r1", "rating": 5.0, "description": {"en": "Great!"}}}).to_string(),
        )
        .unwrap();

        let stats = migrate_json(&store, &path, None).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.new, 1);
    }

    #[test]
    fn empty_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "[]").unwrap();
        assert_eq!(migrate_json(&store, &path, None).unwrap(), MigrationStats::default());
        assert!(store.list_places().unwrap().is_empty());

        let missing = migrate_json(&store, &dir.path().join("nope.json"), None);
        assert!(matches!(missing, Err(MigrateError::NotFound(_))));
    }

    #[test]
    fn import_runs_under_its_own_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let path = dir.path().join("reviews.json");
        std::fs::write(&path, json!([{"review_id": "r1", "rating": 5.0}]).to_string()).unwrap();

        migrate_json(&store, &path, None).unwrap();
        let session = store.get_session(1).unwrap().unwrap();
        assert_eq!(session.action, "migrate_json");
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.reviews_new, 1);
    }
}
