//! Task bodies for the sync pipeline.

use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use super::collaborators::{image_filename, place_directory, DocumentWriter, UploadRequest};
use super::dates::normalize_documents;
use super::{SyncOrchestrator, SyncTask};
use crate::models::{ReviewDocument, SyncMode};
use crate::repository::ReviewStorage;

/// Document fields that custom parameters may not shadow.
const RESERVED_FIELDS: &[&str] = &[
    "review_id",
    "place_id",
    "author",
    "rating",
    "description",
    "likes",
    "user_images",
    "author_profile_url",
    "profile_picture",
    "owner_responses",
    "created_date",
    "review_date",
    "last_modified_date",
    "local_images",
    "local_profile_picture",
    "original_image_urls",
    "original_profile_picture",
];

impl SyncOrchestrator {
    pub(super) fn run_task<S: ReviewStorage + ?Sized>(
        &self,
        task: SyncTask,
        store: &S,
        place_id: &str,
        documents: &mut Vec<ReviewDocument>,
    ) -> anyhow::Result<()> {
        match task {
            SyncTask::Dates => {
                normalize_documents(documents, Utc::now());
                Ok(())
            }
            SyncTask::Images => self.materialize_images(place_id, documents),
            SyncTask::ObjectStorage => self.upload_images(store, place_id, documents),
            SyncTask::Cleanup => {
                self.cleanup(documents);
                Ok(())
            }
            SyncTask::CustomParams => {
                self.add_custom_params(documents);
                Ok(())
            }
            SyncTask::DocumentStore => match self.document_store.as_deref() {
                Some(writer) => {
                    write_target(writer, self.settings.mongodb.sync_mode, place_id, documents)
                        .context("document store write failed")
                }
                None => Ok(()),
            },
            SyncTask::JsonBackup => match self.json_backup.as_deref() {
                Some(writer) => write_target(writer, SyncMode::Update, place_id, documents)
                    .context("JSON backup failed"),
                None => Ok(()),
            },
        }
    }

    fn materialize_images(&self, place_id: &str, documents: &mut [ReviewDocument]) -> anyhow::Result<()> {
        let Some(images) = self.images.as_deref() else {
            return Ok(());
        };

        let mut materialized = 0usize;
        for doc in documents.iter_mut() {
            let artifacts = images
                .materialize(place_id, doc)
                .with_context(|| format!("materializing images for review {}", doc.review_id))?;
            if artifacts.is_empty() {
                continue;
            }
            materialized += artifacts.images.len() + usize::from(artifacts.profile_picture.is_some());

            if !artifacts.images.is_empty() {
                doc.local_images = Some(artifacts.images.iter().map(|i| i.filename.clone()).collect());
            }
            if let Some(ref profile) = artifacts.profile_picture {
                doc.local_profile_picture = Some(profile.filename.clone());
            }

            if self.settings.replace_urls {
                let by_url: HashMap<&str, &str> = artifacts
                    .images
                    .iter()
                    .map(|i| (i.source_url.as_str(), i.filename.as_str()))
                    .collect();
                remember_originals(doc);
                let sources = doc.original_image_urls.clone().unwrap_or_default();
                doc.user_images = sources
                    .iter()
                    .map(|url| match by_url.get(url.as_str()) {
                        Some(filename) => self.custom_url(filename, false),
                        None => url.clone(),
                    })
                    .collect();
                if let Some(ref profile) = artifacts.profile_picture {
                    doc.profile_picture = self.custom_url(&profile.filename, true);
                }
            }
        }

        info!(place_id, files = materialized, "Materialized review images");
        Ok(())
    }

    fn upload_images<S: ReviewStorage + ?Sized>(
        &self,
        store: &S,
        place_id: &str,
        documents: &mut [ReviewDocument],
    ) -> anyhow::Result<()> {
        let Some(uploader) = self.uploader.as_deref() else {
            return Ok(());
        };
        let s3 = &self.settings.s3;
        let place_dir = place_directory(&self.settings.image_dir, place_id);

        let mut requests: BTreeMap<String, UploadRequest> = BTreeMap::new();
        for doc in documents.iter() {
            let images = doc.local_images.iter().flatten().map(|f| (f, false));
            let profile = doc.local_profile_picture.iter().map(|f| (f, true));
            for (filename, is_profile) in images.chain(profile) {
                if filename.is_empty() || requests.contains_key(filename) {
                    continue;
                }
                let folder = if is_profile { &s3.profiles_folder } else { &s3.reviews_folder };
                let local_path = place_dir
                    .join(if is_profile { "profiles" } else { "reviews" })
                    .join(filename);
                if !local_path.is_file() {
                    continue;
                }
                requests.insert(
                    filename.clone(),
                    UploadRequest {
                        filename: filename.clone(),
                        local_path,
                        key: self.object_key(place_id, folder, filename),
                        is_profile,
                    },
                );
            }
        }

        if requests.is_empty() {
            info!(place_id, "No local files to upload");
            return Ok(());
        }

        if s3.sync_mode == SyncMode::NewOnly {
            let existing = uploader
                .existing_keys(place_id)
                .context("listing existing object keys")?;
            let before = requests.len();
            requests.retain(|_, req| !existing.contains(&req.key));
            if before > requests.len() {
                info!(place_id, skipped = before - requests.len(), "Skipping objects already uploaded");
            }
        }

        if requests.is_empty() {
            info!(place_id, "All files already uploaded");
            return Ok(());
        }

        let batch: Vec<UploadRequest> = requests.into_values().collect();
        let uploaded = uploader.upload(&batch).context("uploading images")?;

        for doc in documents.iter_mut() {
            let image_urls: BTreeMap<String, String> = doc
                .local_images
                .iter()
                .flatten()
                .filter_map(|f| uploaded.get(f).map(|url| (f.clone(), url.clone())))
                .collect();
            let profile_url = doc
                .local_profile_picture
                .as_ref()
                .and_then(|f| uploaded.get(f))
                .cloned();
            if image_urls.is_empty() && profile_url.is_none() {
                continue;
            }

            store.mark_images_uploaded(&doc.review_id, place_id, &image_urls, profile_url.as_deref())?;

            if self.settings.replace_urls {
                remember_originals(doc);
                for (filename, url) in &image_urls {
                    if let Some(slot) = doc
                        .user_images
                        .iter_mut()
                        .find(|u| u.ends_with(filename.as_str()) || image_filename(u, false) == *filename)
                    {
                        *slot = url.clone();
                    }
                }
                if let Some(url) = profile_url {
                    doc.profile_picture = url;
                }
            }
        }

        info!(place_id, uploaded = uploaded.len(), "Uploaded images to object storage");
        Ok(())
    }

    fn cleanup(&self, documents: &mut [ReviewDocument]) {
        let drop_originals = self.settings.replace_urls && !self.settings.preserve_original_urls;
        for doc in documents.iter_mut() {
            if !self.settings.store_local_paths {
                doc.local_images = None;
                doc.local_profile_picture = None;
            }
            if drop_originals {
                doc.original_image_urls = None;
                doc.original_profile_picture = None;
            }
        }
    }

    fn add_custom_params(&self, documents: &mut [ReviewDocument]) {
        let params: Vec<_> = self
            .settings
            .custom_params
            .iter()
            .filter(|(key, _)| {
                let reserved = RESERVED_FIELDS.contains(&key.as_str());
                if reserved {
                    tracing::warn!(key = key.as_str(), "Ignoring custom parameter that shadows a review field");
                }
                !reserved
            })
            .collect();

        info!(documents = documents.len(), params = params.len(), "Adding custom parameters");
        for doc in documents.iter_mut() {
            for (key, value) in &params {
                doc.extra.insert((*key).clone(), (*value).clone());
            }
        }
    }

    /// `{base}/{reviews|profiles}/{filename}` with slashes normalized.
    fn custom_url(&self, filename: &str, is_profile: bool) -> String {
        let path = if is_profile {
            &self.settings.custom_url_profiles
        } else {
            &self.settings.custom_url_reviews
        };
        format!(
            "{}/{}/{}",
            self.settings.custom_url_base.trim_end_matches('/'),
            path.trim_matches('/'),
            filename
        )
    }

    fn object_key(&self, place_id: &str, folder: &str, filename: &str) -> String {
        let place_segment = if place_id.is_empty() {
            String::new()
        } else {
            format!("{}/", place_id)
        };
        format!("{}{}{}/{}", self.settings.s3.prefix, place_segment, folder, filename)
    }
}

/// Keep the scraped URLs before the first rewrite.
fn remember_originals(doc: &mut ReviewDocument) {
    if doc.original_image_urls.is_none() {
        doc.original_image_urls = Some(doc.user_images.clone());
    }
    if doc.original_profile_picture.is_none() && !doc.profile_picture.is_empty() {
        doc.original_profile_picture = Some(doc.profile_picture.clone());
    }
}

/// Write documents to a target, skipping ids it already holds in `new_only` mode.
fn write_target(
    writer: &dyn DocumentWriter,
    mode: SyncMode,
    place_id: &str,
    documents: &[ReviewDocument],
) -> anyhow::Result<()> {
    let written = if mode == SyncMode::NewOnly {
        let existing = writer.existing_ids(place_id)?;
        let fresh: Vec<ReviewDocument> = documents
            .iter()
            .filter(|d| !existing.contains(&d.review_id))
            .cloned()
            .collect();
        if fresh.len() < documents.len() {
            info!(place_id, skipped = documents.len() - fresh.len(), "Skipping documents the target already has");
        }
        if fresh.is_empty() {
            return Ok(());
        }
        writer.write(place_id, &fresh)?
    } else {
        writer.write(place_id, documents)?
    };
    info!(place_id, written, mode = mode.as_str(), "Wrote documents to target");
    Ok(())
}
