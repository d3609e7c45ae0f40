//! Data models for reviewsync.

mod checkpoint;
mod document;
mod history;
mod place;
mod review;
mod session;

pub use checkpoint::{CheckpointStatus, CheckpointUpdate, SyncCheckpoint, SyncStatusRow, SyncTarget};
pub use document::ReviewDocument;
pub use history::{Actor, ChangedFields, HistoryAction, HistoryEntry, NewHistoryEntry};
pub use place::{Place, PlaceAlias, PlaceSummary};
pub use review::{
    content_hash, detect_lang, engagement_hash, OwnerResponse, PendingImages, ReviewObservation,
    ScrapeMode, StoredReview, SyncMode, UpsertCounts, UpsertOutcome,
};
pub use session::{ScrapeSession, SessionStatus, SessionTotals};
