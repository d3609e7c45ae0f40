//! Place and alias models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A crawled business or location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub place_name: String,
    pub original_url: String,
    /// Canonical form of the URL the scrape resolved to.
    pub resolved_url: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub first_seen: DateTime<Utc>,
    pub last_scraped: Option<DateTime<Utc>>,
    /// Non-deleted review count, refreshed after each batch.
    pub total_reviews: i64,
}

/// A retired place id that now resolves to another place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceAlias {
    pub alias_id: String,
    pub canonical_id: String,
    pub original_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-place line in database statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceSummary {
    pub place_id: String,
    pub place_name: String,
    pub total_reviews: i64,
    pub last_scraped: Option<DateTime<Utc>>,
}
