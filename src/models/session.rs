//! Scrape session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a scrape session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One ingestion run against one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSession {
    pub session_id: i64,
    pub place_id: String,
    /// What started the session, e.g. `scrape` or `migrate_json`.
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub reviews_found: i64,
    pub reviews_new: i64,
    pub reviews_updated: i64,
    pub sort_by: Option<String>,
    pub error_message: Option<String>,
}

/// Counters recorded when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionTotals {
    pub found: i64,
    pub new: i64,
    pub updated: i64,
}
