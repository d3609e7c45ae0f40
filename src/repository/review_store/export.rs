//! JSON and CSV exports.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use super::{ReviewStore, Result};
use crate::models::StoredReview;

const LEADING_COLUMNS: &[&str] = &[
    "review_id",
    "author",
    "rating",
    "review_date",
    "raw_date",
    "likes",
    "profile_url",
    "profile_picture",
    "user_images",
];

const TRAILING_COLUMNS: &[&str] = &["created_date", "last_modified", "is_deleted"];

impl ReviewStore {
    /// All reviews of one place, ready for `serde_json`.
    pub fn export_reviews_json(&self, place_id: &str, include_deleted: bool) -> Result<Vec<StoredReview>> {
        self.get_reviews(place_id, None, 0, include_deleted)
    }

    /// Every place's reviews keyed by place id.
    pub fn export_all_json(&self, include_deleted: bool) -> Result<BTreeMap<String, Vec<StoredReview>>> {
        let mut out = BTreeMap::new();
        for place in self.list_places()? {
            let reviews = self.export_reviews_json(&place.place_id, include_deleted)?;
            out.insert(place.place_id, reviews);
        }
        Ok(out)
    }

    /// Write one place's reviews as CSV. Returns the number of rows written.
    pub fn export_reviews_csv(&self, place_id: &str, path: &Path, include_deleted: bool) -> Result<usize> {
        let reviews = self.get_reviews(place_id, None, 0, include_deleted)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(render_csv(&reviews).as_bytes())?;
        info!(place_id, rows = reviews.len(), path = %path.display(), "Exported reviews to CSV");
        Ok(reviews.len())
    }

    /// One `reviews_<place>.csv` per place under `dir`.
    pub fn export_all_csv(&self, dir: &Path, include_deleted: bool) -> Result<BTreeMap<String, PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = BTreeMap::new();
        for place in self.list_places()? {
            let path = dir.join(format!("reviews_{}.csv", safe_file_stem(&place.place_id)));
            self.export_reviews_csv(&place.place_id, &path, include_deleted)?;
            written.insert(place.place_id, path);
        }
        Ok(written)
    }
}

fn render_csv(reviews: &[StoredReview]) -> String {
    let text_langs: BTreeSet<&str> = reviews
        .iter()
        .flat_map(|r| r.text.keys().map(String::as_str))
        .collect();
    let owner_langs: BTreeSet<&str> = reviews
        .iter()
        .flat_map(|r| r.owner_responses.keys().map(String::as_str))
        .collect();

    let mut header: Vec<String> = LEADING_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend(text_langs.iter().map(|lang| format!("text_{}", lang)));
    header.extend(owner_langs.iter().map(|lang| format!("owner_response_{}", lang)));
    header.extend(TRAILING_COLUMNS.iter().map(|c| c.to_string()));

    let mut output = header.join(",");
    output.push('\n');

    for review in reviews {
        let mut fields = vec![
            escape_csv(&review.review_id),
            escape_csv(&review.author),
            format!("{:?}", review.rating),
            escape_csv(&review.review_date),
            escape_csv(&review.raw_date),
            review.likes.to_string(),
            escape_csv(&review.profile_url),
            escape_csv(&review.profile_picture),
            escape_csv(&review.user_images.join(";")),
        ];
        fields.extend(
            text_langs
                .iter()
                .map(|lang| escape_csv(review.text.get(*lang).map(String::as_str).unwrap_or(""))),
        );
        fields.extend(owner_langs.iter().map(|lang| {
            escape_csv(
                review
                    .owner_responses
                    .get(*lang)
                    .map(|r| r.text.as_str())
                    .unwrap_or(""),
            )
        }));
        fields.push(review.created_date.to_rfc3339());
        fields.push(review.last_modified.to_rfc3339());
        fields.push(if review.is_deleted { "1" } else { "0" }.to_string());

        output.push_str(&fields.join(","));
        output.push('\n');
    }
    output
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Place ids such as `cid:123` are not valid file names everywhere.
fn safe_file_stem(place_id: &str) -> String {
    place_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
