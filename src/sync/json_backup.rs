//! JSON file backup target.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use super::collaborators::DocumentWriter;
use crate::models::ReviewDocument;

/// Keeps every synced review in one JSON array, merged by `review_id`.
#[derive(Debug, Clone)]
pub struct JsonFileBackup {
    path: PathBuf,
}

impl JsonFileBackup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored documents. A corrupt file is copied aside and
    /// treated as empty.
    fn load(&self) -> anyhow::Result<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;

        match serde_json::from_str::<Vec<Value>>(&contents) {
            Ok(docs) => Ok(docs),
            Err(err) => {
                let backup = self.corrupt_backup_path();
                fs::copy(&self.path, &backup)
                    .with_context(|| format!("backing up corrupt {}", self.path.display()))?;
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %err,
                    "Corrupt JSON backup copied aside, starting empty"
                );
                Ok(Vec::new())
            }
        }
    }

    fn corrupt_backup_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("reviews");
        let name = format!("{}.corrupt.{}.json", stem, Utc::now().format("%Y%m%d_%H%M%S"));
        self.path.with_file_name(name)
    }

    /// Write the file through a temp file and rename so readers never see
    /// a half-written array.
    fn store(&self, docs: &[Value]) -> anyhow::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("creating backup directory {}", parent.display()))?;

        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4()));
        let json = serde_json::to_string_pretty(docs)?;

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .with_context(|| format!("opening temp backup file {}", temp_path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("writing temp backup file {}", temp_path.display()))?;
        file.flush()?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err).with_context(|| format!("replacing {}", self.path.display()));
        }
        Ok(())
    }
}

impl DocumentWriter for JsonFileBackup {
    fn existing_ids(&self, _place_id: &str) -> anyhow::Result<HashSet<String>> {
        Ok(self
            .load()?
            .iter()
            .filter_map(|doc| doc.get("review_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn write(&self, _place_id: &str, documents: &[ReviewDocument]) -> anyhow::Result<usize> {
        let mut stored = self.load()?;

        for doc in documents {
            let value = serde_json::to_value(doc)?;
            let existing = stored
                .iter_mut()
                .find(|v| v.get("review_id").and_then(Value::as_str) == Some(doc.review_id.as_str()));
            match existing {
                Some(slot) => *slot = value,
                None => stored.push(value),
            }
        }

        self.store(&stored)?;
        info!(path = %self.path.display(), written = documents.len(), total = stored.len(), "Wrote JSON backup");
        Ok(documents.len())
    }
}

/// Persist the ids seen during a scrape, one per line, sorted.
pub fn save_seen_ids(path: &Path, ids: &HashSet<String>) -> anyhow::Result<()> {
    let mut sorted: Vec<&str> = ids.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, sorted.join("\n")).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Load ids written by [`save_seen_ids`]. A missing file is an empty set.
pub fn load_seen_ids(path: &Path) -> anyhow::Result<HashSet<String>> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(contents
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
