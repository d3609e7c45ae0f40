//! Review models and change detection.
//!
//! A review carries two digests. The content hash covers what the author
//! wrote (text, rating and the raw relative date string) and the engagement
//! hash covers what other people did to it (likes and the owner's reply).
//! Parsed dates are never hashed: "2 months ago" resolves to a different
//! instant on every run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::ReviewDocument;

/// How an ingestion run treats reviews that already exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Only record new reviews; existing rows are touched but never rewritten.
    NewOnly,
    /// Rewrite existing rows whose hashes changed.
    #[default]
    Update,
    /// Same write policy as `Update`.
    Full,
}

impl ScrapeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOnly => "new_only",
            Self::Update => "update",
            Self::Full => "full",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new_only" => Some(Self::NewOnly),
            "update" => Some(Self::Update),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// How a downstream target treats rows it has already seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    NewOnly,
    #[default]
    Update,
    Full,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOnly => "new_only",
            Self::Update => "update",
            Self::Full => "full",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "new_only" => Some(Self::NewOnly),
            "update" => Some(Self::Update),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

/// Result of applying one observation to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    New,
    Updated,
    Restored,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Restored => "restored",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Per-outcome tally for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertCounts {
    pub new: u64,
    pub updated: u64,
    pub restored: u64,
    pub unchanged: u64,
}

impl UpsertCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::New => self.new += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Restored => self.restored += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.new + self.updated + self.restored + self.unchanged
    }
}

/// A reply from the place owner, keyed by language in `owner_responses`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerResponse {
    pub text: String,
}

/// One review as yielded by the scraper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewObservation {
    pub review_id: String,
    pub text: String,
    pub rating: f64,
    pub likes: i64,
    /// Language of `text`; empty means English.
    pub lang: String,
    /// Relative date as displayed ("2 months ago").
    pub raw_date: String,
    /// Date derived from `raw_date` at scrape time. Display only.
    pub review_date: String,
    pub author: String,
    pub profile_url: String,
    pub avatar_url: String,
    pub owner_text: String,
    pub photo_urls: Vec<String>,
}

impl ReviewObservation {
    pub fn content_hash(&self) -> String {
        content_hash(&self.text, self.rating, &self.raw_date)
    }

    pub fn engagement_hash(&self) -> String {
        engagement_hash(self.likes, &self.owner_text)
    }

    /// Language of the review text, defaulting to English.
    pub fn language(&self) -> &str {
        if self.lang.is_empty() {
            "en"
        } else {
            &self.lang
        }
    }

    /// The text as a single-entry language map, empty when there is no text.
    pub fn text_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        if !self.text.is_empty() {
            map.insert(self.language().to_string(), self.text.clone());
        }
        map
    }

    /// The owner reply keyed by its detected language.
    pub fn owner_map(&self) -> BTreeMap<String, OwnerResponse> {
        let mut map = BTreeMap::new();
        if !self.owner_text.is_empty() {
            map.insert(
                detect_lang(&self.owner_text).to_string(),
                OwnerResponse {
                    text: self.owner_text.clone(),
                },
            );
        }
        map
    }
}

/// A review row as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReview {
    pub review_id: String,
    pub place_id: String,
    pub author: String,
    pub rating: f64,
    pub text: BTreeMap<String, String>,
    pub review_date: String,
    pub raw_date: String,
    pub likes: i64,
    pub user_images: Vec<String>,
    /// Object-store URLs by filename, once uploaded.
    pub s3_images: Option<BTreeMap<String, String>>,
    pub profile_url: String,
    pub profile_picture: String,
    pub s3_profile_picture: Option<String>,
    pub owner_responses: BTreeMap<String, OwnerResponse>,
    pub created_date: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub last_seen_session: Option<i64>,
    pub last_changed_session: Option<i64>,
    pub is_deleted: bool,
    pub content_hash: String,
    pub engagement_hash: String,
    pub row_version: i64,
}

impl StoredReview {
    /// Map the row to the document shape consumed by sync targets.
    pub fn to_document(&self) -> ReviewDocument {
        ReviewDocument {
            review_id: self.review_id.clone(),
            place_id: self.place_id.clone(),
            author: self.author.clone(),
            rating: self.rating,
            description: self.text.clone(),
            likes: self.likes,
            user_images: self.user_images.clone(),
            author_profile_url: self.profile_url.clone(),
            profile_picture: self.profile_picture.clone(),
            owner_responses: self.owner_responses.clone(),
            created_date: self.created_date.to_rfc3339(),
            review_date: self.review_date.clone(),
            last_modified_date: self.last_modified.to_rfc3339(),
            ..Default::default()
        }
    }
}

/// Images of one review still waiting for an object-store upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImages {
    pub review_id: String,
    pub user_images: Vec<String>,
    pub profile_picture: Option<String>,
}

/// SHA-256 over the stable, author-controlled fields.
///
/// The rating is rendered with a trailing `.0` for whole numbers so digests
/// stay stable for databases written by earlier tooling.
pub fn content_hash(text: &str, rating: f64, raw_date: &str) -> String {
    sha256_hex(&format!("{}|{:?}|{}", text, rating, raw_date))
}

/// SHA-256 over the volatile engagement fields.
pub fn engagement_hash(likes: i64, owner_text: &str) -> String {
    sha256_hex(&format!("{}|{}", likes, owner_text))
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Guess the language of an owner reply from its script.
pub fn detect_lang(text: &str) -> &'static str {
    if text.chars().any(|c| ('\u{0590}'..='\u{05FF}').contains(&c)) {
        "he"
    } else if text.chars().any(|c| ('\u{0E00}'..='\u{0E7F}').contains(&c)) {
        "th"
    } else {
        "en"
    }
}
