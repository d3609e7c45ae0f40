//! Incremental reads for sync targets and object-store image tracking.

use std::collections::BTreeMap;

use rusqlite::params;

use super::helpers::row_to_review;
use super::{ReviewStore, Result};
use crate::models::{PendingImages, StoredReview};
use crate::repository::now_timestamp;

/// Restricts [`ReviewStore::get_reviews_for_sync`] to recent changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncFilter {
    /// Rows changed in a session after this one.
    pub since_session: Option<i64>,
    /// Rows modified after this RFC 3339 timestamp.
    pub since_timestamp: Option<String>,
}

impl ReviewStore {
    /// Rows a sync target needs to see.
    ///
    /// With no filter this is every row, deleted ones included, so targets
    /// can propagate deletions.
    pub fn get_reviews_for_sync(&self, place_id: &str, filter: &SyncFilter) -> Result<Vec<StoredReview>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT * FROM reviews
            WHERE place_id = ?1
              AND (?2 IS NULL OR last_changed_session > ?2)
              AND (?3 IS NULL OR last_modified > ?3)
            ORDER BY last_modified, review_id
            "#,
        )?;
        let reviews = stmt
            .query_map(
                params![place_id, filter.since_session, filter.since_timestamp],
                row_to_review,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    /// Live reviews with images that have not been uploaded yet.
    pub fn get_pending_images(&self, place_id: &str) -> Result<Vec<PendingImages>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT * FROM reviews
            WHERE place_id = ?1 AND is_deleted = 0
              AND (
                (user_images IS NOT NULL AND user_images != '[]' AND s3_images IS NULL)
                OR (profile_picture IS NOT NULL AND profile_picture != '' AND s3_profile_picture IS NULL)
              )
            ORDER BY review_id
            "#,
        )?;
        let pending = stmt
            .query_map(params![place_id], row_to_review)?
            .map(|row| {
                row.map(|review| PendingImages {
                    review_id: review.review_id,
                    user_images: if review.s3_images.is_none() {
                        review.user_images
                    } else {
                        Vec::new()
                    },
                    profile_picture: if review.s3_profile_picture.is_none() {
                        Some(review.profile_picture).filter(|p| !p.is_empty())
                    } else {
                        None
                    },
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pending)
    }

    /// Store object-store URLs beside the original image URLs.
    pub fn mark_images_uploaded(
        &self,
        review_id: &str,
        place_id: &str,
        image_urls: &BTreeMap<String, String>,
        profile_url: Option<&str>,
    ) -> Result<bool> {
        let images = serde_json::to_string(image_urls)?;
        self.write(|conn| {
            let updated = conn.execute(
                r#"
                UPDATE reviews SET
                    s3_images = ?1,
                    s3_profile_picture = COALESCE(?2, s3_profile_picture),
                    last_modified = ?3,
                    row_version = row_version + 1
                WHERE review_id = ?4 AND place_id = ?5
                "#,
                params![images, profile_url, now_timestamp(), review_id, place_id],
            )?;
            Ok(updated > 0)
        })
    }
}
