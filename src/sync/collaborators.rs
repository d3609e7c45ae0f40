//! Interfaces to the systems the pipeline hands work to.
//!
//! Collaborators are foreign adapters and report failures as
//! `anyhow::Error`; the orchestrator logs them and records a partial
//! checkpoint for the affected target.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::models::ReviewDocument;

/// A local image file and the remote URL it was fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImage {
    pub source_url: String,
    pub filename: String,
}

/// Local artifacts available for one review.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalArtifacts {
    pub images: Vec<LocalImage>,
    pub profile_picture: Option<LocalImage>,
}

impl LocalArtifacts {
    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.profile_picture.is_none()
    }
}

/// Produces local copies of review images.
pub trait ImageMaterializer: Send + Sync {
    fn materialize(&self, place_id: &str, review: &ReviewDocument) -> anyhow::Result<LocalArtifacts>;
}

/// One file to put into object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub local_path: PathBuf,
    pub key: String,
    pub is_profile: bool,
}

/// Object storage for review images.
pub trait ObjectUploader: Send + Sync {
    /// Keys already stored for a place.
    fn existing_keys(&self, place_id: &str) -> anyhow::Result<HashSet<String>>;

    /// Upload files and return their public URLs by filename.
    fn upload(&self, requests: &[UploadRequest]) -> anyhow::Result<HashMap<String, String>>;
}

/// A document target such as a document database or a backup file.
pub trait DocumentWriter: Send + Sync {
    /// Review ids the target already holds.
    fn existing_ids(&self, place_id: &str) -> anyhow::Result<HashSet<String>>;

    /// Insert or overwrite documents by `review_id`. Returns how many were written.
    fn write(&self, place_id: &str, documents: &[ReviewDocument]) -> anyhow::Result<usize>;
}

/// Local filename for an image URL.
///
/// Sizing suffixes after `=` are dropped and `.jpg` appended. Profile
/// picture URLs may end in a slash, in which case the last non-empty
/// segment names the file.
pub fn image_filename(url: &str, is_profile: bool) -> String {
    if url.is_empty() {
        return String::new();
    }

    if is_profile {
        let mut segments = url.rsplit('/');
        let last = segments.next().unwrap_or("");
        let segment = if last.is_empty() {
            segments.next().unwrap_or("")
        } else {
            last
        };
        let stem = segment.split('=').next().unwrap_or("");
        return format!("{}.jpg", stem);
    }

    let base = url.split('=').next().unwrap_or("");
    let stem = base.rsplit('/').next().unwrap_or("");
    format!("{}.jpg", stem)
}

/// Reports images already downloaded under `<image_dir>/<place>/{reviews,profiles}/`.
///
/// Fetching is left to the scraper; this only maps document URLs to the
/// files that exist on disk.
#[derive(Debug, Clone)]
pub struct DirectoryMaterializer {
    image_dir: PathBuf,
}

impl DirectoryMaterializer {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
        }
    }

    fn find(&self, place_dir: &Path, folder: &str, url: &str, is_profile: bool) -> Option<LocalImage> {
        let filename = image_filename(url, is_profile);
        if filename.is_empty() || !place_dir.join(folder).join(&filename).is_file() {
            return None;
        }
        Some(LocalImage {
            source_url: url.to_string(),
            filename,
        })
    }
}

impl ImageMaterializer for DirectoryMaterializer {
    fn materialize(&self, place_id: &str, review: &ReviewDocument) -> anyhow::Result<LocalArtifacts> {
        let place_dir = place_directory(&self.image_dir, place_id);
        let sources = review
            .original_image_urls
            .as_ref()
            .unwrap_or(&review.user_images);

        let images = sources
            .iter()
            .filter_map(|url| self.find(&place_dir, "reviews", url, false))
            .collect();

        let profile_source = review
            .original_profile_picture
            .as_deref()
            .unwrap_or(&review.profile_picture);
        let profile_picture = self.find(&place_dir, "profiles", profile_source, true);

        Ok(LocalArtifacts {
            images,
            profile_picture,
        })
    }
}

/// `<image_dir>/<place>` or just `<image_dir>` when there is no place id.
pub(crate) fn place_directory(image_dir: &Path, place_id: &str) -> PathBuf {
    if place_id.is_empty() {
        image_dir.to_path_buf()
    } else {
        image_dir.join(place_id)
    }
}
