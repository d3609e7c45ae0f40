//! Per-target sync bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A downstream target that keeps its own checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncTarget {
    #[serde(rename = "s3")]
    ObjectStorage,
    #[serde(rename = "mongodb")]
    DocumentStore,
    #[serde(rename = "json")]
    JsonBackup,
}

impl SyncTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectStorage => "s3",
            Self::DocumentStore => "mongodb",
            Self::JsonBackup => "json",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "s3" => Some(Self::ObjectStorage),
            "mongodb" => Some(Self::DocumentStore),
            "json" => Some(Self::JsonBackup),
            _ => None,
        }
    }
}

/// Outcome of the most recent sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Ok,
    Partial,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Partial => "partial",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ok" => Some(Self::Ok),
            "partial" => Some(Self::Partial),
            _ => None,
        }
    }
}

/// Sync state for one (place, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub place_id: String,
    /// Stored as text so unknown targets written by other tools still load.
    pub target: String,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_synced_session: Option<i64>,
    pub cursor_review_id: Option<String>,
    pub cursor_updated_at: Option<String>,
    /// Consecutive failed attempts; zero after a success.
    pub attempt_count: i64,
    pub status: CheckpointStatus,
    pub error_message: Option<String>,
}

/// Values recorded by one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointUpdate {
    pub session_id: Option<i64>,
    pub status: CheckpointStatus,
    pub cursor_review_id: Option<String>,
    pub cursor_updated_at: Option<String>,
    pub error: Option<String>,
}

impl CheckpointUpdate {
    pub fn success(session_id: Option<i64>) -> Self {
        Self {
            session_id,
            status: CheckpointStatus::Ok,
            cursor_review_id: None,
            cursor_updated_at: None,
            error: None,
        }
    }

    pub fn partial(session_id: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            session_id,
            status: CheckpointStatus::Partial,
            cursor_review_id: None,
            cursor_updated_at: None,
            error: Some(error.into()),
        }
    }

    pub fn with_cursor(mut self, review_id: Option<String>, updated_at: Option<String>) -> Self {
        self.cursor_review_id = review_id;
        self.cursor_updated_at = updated_at;
        self
    }
}

/// A checkpoint joined with the name of its place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusRow {
    #[serde(flatten)]
    pub checkpoint: SyncCheckpoint,
    pub place_name: Option<String>,
}
