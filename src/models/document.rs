//! The document shape handed to sync targets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::OwnerResponse;

/// A review as written to the document store and the JSON backup.
///
/// The pipeline-only fields are set by the image and object-storage tasks
/// and may be stripped again by cleanup before any target sees them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub review_id: String,
    pub place_id: String,
    pub author: String,
    pub rating: f64,
    /// Review text by language.
    pub description: BTreeMap<String, String>,
    pub likes: i64,
    pub user_images: Vec<String>,
    pub author_profile_url: String,
    pub profile_picture: String,
    pub owner_responses: BTreeMap<String, OwnerResponse>,
    pub created_date: String,
    pub review_date: String,
    pub last_modified_date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_images: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_profile_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image_urls: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_profile_picture: Option<String>,

    /// Custom parameters merged in by the pipeline.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
