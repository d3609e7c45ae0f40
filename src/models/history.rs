//! Review audit trail models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Insert,
    Update,
    SoftDelete,
    Restore,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::SoftDelete => "soft_delete",
            Self::Restore => "restore",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "soft_delete" => Some(Self::SoftDelete),
            "restore" => Some(Self::Restore),
            _ => None,
        }
    }
}

/// Who caused it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    #[default]
    Scraper,
    CliHide,
    CliRestore,
    Migration,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraper => "scraper",
            Self::CliHide => "cli_hide",
            Self::CliRestore => "cli_restore",
            Self::Migration => "migration",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scraper" => Some(Self::Scraper),
            "cli_hide" => Some(Self::CliHide),
            "cli_restore" => Some(Self::CliRestore),
            "migration" => Some(Self::Migration),
            _ => None,
        }
    }
}

/// Field name to `[old, new]`.
pub type ChangedFields = BTreeMap<String, [String; 2]>;

/// A persisted audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub history_id: i64,
    pub review_id: String,
    pub place_id: String,
    pub session_id: Option<i64>,
    pub actor: Actor,
    pub action: HistoryAction,
    pub changed_fields: Option<ChangedFields>,
    pub old_content_hash: Option<String>,
    pub new_content_hash: Option<String>,
    pub old_engagement_hash: Option<String>,
    pub new_engagement_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An audit entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry<'a> {
    pub review_id: &'a str,
    pub place_id: &'a str,
    pub session_id: Option<i64>,
    pub actor: Actor,
    pub action: HistoryAction,
    pub changed_fields: Option<ChangedFields>,
    pub old_content_hash: Option<&'a str>,
    pub new_content_hash: Option<&'a str>,
    pub old_engagement_hash: Option<&'a str>,
    pub new_engagement_hash: Option<&'a str>,
}

impl<'a> NewHistoryEntry<'a> {
    pub fn new(review_id: &'a str, place_id: &'a str, action: HistoryAction) -> Self {
        Self {
            review_id,
            place_id,
            session_id: None,
            actor: Actor::Scraper,
            action,
            changed_fields: None,
            old_content_hash: None,
            new_content_hash: None,
            old_engagement_hash: None,
            new_engagement_hash: None,
        }
    }
}
