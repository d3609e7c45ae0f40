//! Post-scrape sync pipeline.
//!
//! The orchestrator turns the merged review set of one place into
//! [`ReviewDocument`]s and runs a fixed sequence of tasks over them:
//! dates, images, object storage, cleanup, custom parameters, the document
//! store and the JSON backup. A failing task is logged and the rest still
//! run. Tasks that write to a target record a checkpoint for it.

mod collaborators;
mod dates;
mod json_backup;
mod tasks;

pub use collaborators::{
    image_filename, DirectoryMaterializer, DocumentWriter, ImageMaterializer, LocalArtifacts,
    LocalImage, ObjectUploader, UploadRequest,
};
pub use dates::{normalize_date, normalize_documents, parse_relative_date};
pub use json_backup::{load_seen_ids, save_seen_ids, JsonFileBackup};

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::models::{CheckpointUpdate, ReviewDocument, StoredReview, SyncTarget};
use crate::repository::{format_timestamp, ReviewStorage};

/// The pipeline steps, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTask {
    Dates,
    Images,
    ObjectStorage,
    Cleanup,
    CustomParams,
    DocumentStore,
    JsonBackup,
}

impl SyncTask {
    pub const ALL: [SyncTask; 7] = [
        SyncTask::Dates,
        SyncTask::Images,
        SyncTask::ObjectStorage,
        SyncTask::Cleanup,
        SyncTask::CustomParams,
        SyncTask::DocumentStore,
        SyncTask::JsonBackup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Dates => "dates",
            Self::Images => "images",
            Self::ObjectStorage => "s3",
            Self::Cleanup => "cleanup",
            Self::CustomParams => "custom_params",
            Self::DocumentStore => "mongodb",
            Self::JsonBackup => "json",
        }
    }

    /// The checkpointed target this task writes to, if any.
    pub fn target(&self) -> Option<SyncTarget> {
        match self {
            Self::ObjectStorage => Some(SyncTarget::ObjectStorage),
            Self::DocumentStore => Some(SyncTarget::DocumentStore),
            Self::JsonBackup => Some(SyncTarget::JsonBackup),
            _ => None,
        }
    }
}

/// What happened to one task during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Skipped,
    Completed,
    Failed(String),
}

/// Per-task results of one pipeline run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tasks: Vec<(SyncTask, TaskOutcome)>,
}

impl SyncReport {
    pub fn outcome(&self, task: SyncTask) -> Option<&TaskOutcome> {
        self.tasks.iter().find(|(t, _)| *t == task).map(|(_, o)| o)
    }

    pub fn failures(&self) -> usize {
        self.tasks
            .iter()
            .filter(|(_, o)| matches!(o, TaskOutcome::Failed(_)))
            .count()
    }
}

/// Runs the sync pipeline for one place at a time.
pub struct SyncOrchestrator {
    settings: Settings,
    images: Option<Box<dyn ImageMaterializer>>,
    uploader: Option<Box<dyn ObjectUploader>>,
    document_store: Option<Box<dyn DocumentWriter>>,
    json_backup: Option<Box<dyn DocumentWriter>>,
}

impl SyncOrchestrator {
    /// Build an orchestrator. Images are read from `image_dir` and the JSON
    /// backup goes to `json_path`; the object store and the document store
    /// have no default and must be attached.
    pub fn new(settings: Settings) -> Self {
        let images: Box<dyn ImageMaterializer> =
            Box::new(DirectoryMaterializer::new(settings.image_dir.clone()));
        let json_backup: Box<dyn DocumentWriter> =
            Box::new(JsonFileBackup::new(settings.json_path.clone()));
        Self {
            settings,
            images: Some(images),
            uploader: None,
            document_store: None,
            json_backup: Some(json_backup),
        }
    }

    pub fn with_images(mut self, images: Box<dyn ImageMaterializer>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_uploader(mut self, uploader: Box<dyn ObjectUploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_document_store(mut self, writer: Box<dyn DocumentWriter>) -> Self {
        self.document_store = Some(writer);
        self
    }

    pub fn with_json_backup(mut self, writer: Box<dyn DocumentWriter>) -> Self {
        self.json_backup = Some(writer);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether a task will run: its setting is on and its collaborator is attached.
    pub fn is_enabled(&self, task: SyncTask) -> bool {
        let s = &self.settings;
        match task {
            SyncTask::Dates => s.convert_dates,
            SyncTask::Images => s.download_images && self.images.is_some(),
            SyncTask::ObjectStorage => s.use_s3 && self.uploader.is_some(),
            SyncTask::Cleanup => true,
            SyncTask::CustomParams => !s.custom_params.is_empty(),
            SyncTask::DocumentStore => s.use_mongodb && self.document_store.is_some(),
            SyncTask::JsonBackup => s.backup_to_json && self.json_backup.is_some(),
        }
    }

    /// Run every enabled task over the reviews of `place_id`.
    ///
    /// `seen_ids` are the ids observed by the scrape; they are saved next to
    /// the JSON backup when that is enabled.
    pub fn run<S: ReviewStorage + ?Sized>(
        &self,
        store: &S,
        place_id: &str,
        session_id: Option<i64>,
        reviews: &[StoredReview],
        seen_ids: Option<&HashSet<String>>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        if reviews.is_empty() {
            info!(place_id, "No reviews to sync");
            return report;
        }

        let mut documents: Vec<ReviewDocument> =
            reviews.iter().map(StoredReview::to_document).collect();
        info!(
            place_id,
            reviews = documents.len(),
            tasks = SyncTask::ALL.len(),
            "Running sync pipeline"
        );

        for task in SyncTask::ALL {
            if !self.is_enabled(task) {
                debug!(task = task.name(), "Skipping disabled task");
                report.tasks.push((task, TaskOutcome::Skipped));
                continue;
            }

            let started = Instant::now();
            let result = self.run_task(task, store, place_id, &mut documents);
            let outcome = match result {
                Ok(()) => {
                    info!(
                        task = task.name(),
                        place_id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Task completed"
                    );
                    TaskOutcome::Completed
                }
                Err(err) => {
                    error!(task = task.name(), place_id, error = %format!("{:#}", err), "Task failed");
                    TaskOutcome::Failed(format!("{:#}", err))
                }
            };

            if let Some(target) = task.target() {
                self.record_checkpoint(store, place_id, target, session_id, reviews, &outcome);
            }
            report.tasks.push((task, outcome));
        }

        if let Some(ids) = seen_ids {
            if self.settings.backup_to_json {
                if let Err(err) = save_seen_ids(&self.settings.seen_ids_path, ids) {
                    warn!(error = %err, "Failed to save seen review ids");
                }
            }
        }

        report
    }

    fn record_checkpoint<S: ReviewStorage + ?Sized>(
        &self,
        store: &S,
        place_id: &str,
        target: SyncTarget,
        session_id: Option<i64>,
        reviews: &[StoredReview],
        outcome: &TaskOutcome,
    ) {
        let update = match outcome {
            TaskOutcome::Completed => {
                let cursor = reviews
                    .iter()
                    .max_by(|a, b| {
                        a.last_modified
                            .cmp(&b.last_modified)
                            .then_with(|| a.review_id.cmp(&b.review_id))
                    });
                CheckpointUpdate::success(session_id).with_cursor(
                    cursor.map(|r| r.review_id.clone()),
                    cursor.map(|r| format_timestamp(&r.last_modified)),
                )
            }
            TaskOutcome::Failed(message) => CheckpointUpdate::partial(session_id, message.clone()),
            TaskOutcome::Skipped => return,
        };

        if let Err(err) = store.update_sync_checkpoint(place_id, target.as_str(), &update) {
            warn!(place_id, target = target.as_str(), error = %err, "Failed to record sync checkpoint");
        }
    }
}
