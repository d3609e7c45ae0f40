//! Row parsing helpers for the review store.

use rusqlite::Row;

use crate::models::{
    Actor, CheckpointStatus, HistoryAction, HistoryEntry, Place, ScrapeSession, SessionStatus,
    StoredReview, SyncCheckpoint,
};
use crate::repository::{parse_datetime, parse_datetime_opt};

/// Parse a JSON column, treating NULL and malformed text as the default.
fn json_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    let raw: Option<String> = row.get(column)?;
    Ok(raw
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default())
}

/// Parse a database row into a Place.
pub fn row_to_place(row: &Row) -> rusqlite::Result<Place> {
    Ok(Place {
        place_id: row.get("place_id")?,
        place_name: row.get::<_, Option<String>>("place_name")?.unwrap_or_default(),
        original_url: row.get("original_url")?,
        resolved_url: row.get("resolved_url")?,
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        first_seen: parse_datetime(&row.get::<_, String>("first_seen")?),
        last_scraped: parse_datetime_opt(row.get("last_scraped")?),
        total_reviews: row.get::<_, Option<i64>>("total_reviews")?.unwrap_or(0),
    })
}

/// Parse a database row into a StoredReview.
pub fn row_to_review(row: &Row) -> rusqlite::Result<StoredReview> {
    let s3_raw: Option<String> = row.get("s3_images")?;

    Ok(StoredReview {
        review_id: row.get("review_id")?,
        place_id: row.get("place_id")?,
        author: row.get::<_, Option<String>>("author")?.unwrap_or_default(),
        rating: row.get::<_, Option<f64>>("rating")?.unwrap_or(0.0),
        text: json_column(row, "review_text")?,
        review_date: row.get::<_, Option<String>>("review_date")?.unwrap_or_default(),
        raw_date: row.get::<_, Option<String>>("raw_date")?.unwrap_or_default(),
        likes: row.get::<_, Option<i64>>("likes")?.unwrap_or(0),
        user_images: json_column(row, "user_images")?,
        s3_images: s3_raw.and_then(|s| serde_json::from_str(&s).ok()),
        profile_url: row.get::<_, Option<String>>("profile_url")?.unwrap_or_default(),
        profile_picture: row
            .get::<_, Option<String>>("profile_picture")?
            .unwrap_or_default(),
        s3_profile_picture: row.get("s3_profile_picture")?,
        owner_responses: json_column(row, "owner_responses")?,
        created_date: parse_datetime(&row.get::<_, String>("created_date")?),
        last_modified: parse_datetime(&row.get::<_, String>("last_modified")?),
        last_seen_session: row.get("last_seen_session")?,
        last_changed_session: row.get("last_changed_session")?,
        is_deleted: row.get::<_, Option<i64>>("is_deleted")?.unwrap_or(0) != 0,
        content_hash: row.get::<_, Option<String>>("content_hash")?.unwrap_or_default(),
        engagement_hash: row
            .get::<_, Option<String>>("engagement_hash")?
            .unwrap_or_default(),
        row_version: row.get("row_version")?,
    })
}

/// Parse a database row into a HistoryEntry.
pub fn row_to_history(row: &Row) -> rusqlite::Result<HistoryEntry> {
    let changed: Option<String> = row.get("changed_fields")?;

    Ok(HistoryEntry {
        history_id: row.get("history_id")?,
        review_id: row.get("review_id")?,
        place_id: row.get("place_id")?,
        session_id: row.get("session_id")?,
        actor: Actor::from_str(&row.get::<_, String>("actor")?).unwrap_or_default(),
        action: HistoryAction::from_str(&row.get::<_, String>("action")?)
            .unwrap_or(HistoryAction::Update),
        changed_fields: changed.and_then(|s| serde_json::from_str(&s).ok()),
        old_content_hash: row.get("old_content_hash")?,
        new_content_hash: row.get("new_content_hash")?,
        old_engagement_hash: row.get("old_engagement_hash")?,
        new_engagement_hash: row.get("new_engagement_hash")?,
        timestamp: parse_datetime(&row.get::<_, String>("timestamp")?),
    })
}

/// Parse a database row into a ScrapeSession.
pub fn row_to_session(row: &Row) -> rusqlite::Result<ScrapeSession> {
    Ok(ScrapeSession {
        session_id: row.get("session_id")?,
        place_id: row.get("place_id")?,
        action: row.get("action")?,
        started_at: parse_datetime(&row.get::<_, String>("started_at")?),
        completed_at: parse_datetime_opt(row.get("completed_at")?),
        status: SessionStatus::from_str(&row.get::<_, String>("status")?)
            .unwrap_or(SessionStatus::Running),
        reviews_found: row.get::<_, Option<i64>>("reviews_found")?.unwrap_or(0),
        reviews_new: row.get::<_, Option<i64>>("reviews_new")?.unwrap_or(0),
        reviews_updated: row.get::<_, Option<i64>>("reviews_updated")?.unwrap_or(0),
        sort_by: row.get("sort_by")?,
        error_message: row.get("error_message")?,
    })
}

/// Parse a database row into a SyncCheckpoint.
pub fn row_to_checkpoint(row: &Row) -> rusqlite::Result<SyncCheckpoint> {
    Ok(SyncCheckpoint {
        place_id: row.get("place_id")?,
        target: row.get("target")?,
        last_synced_at: parse_datetime_opt(row.get("last_synced_at")?),
        last_synced_session: row.get("last_synced_session")?,
        cursor_review_id: row.get("cursor_review_id")?,
        cursor_updated_at: row.get("cursor_updated_at")?,
        attempt_count: row.get::<_, Option<i64>>("attempt_count")?.unwrap_or(0),
        status: row
            .get::<_, Option<String>>("status")?
            .and_then(|s| CheckpointStatus::from_str(&s))
            .unwrap_or(CheckpointStatus::Ok),
        error_message: row.get("error_message")?,
    })
}
