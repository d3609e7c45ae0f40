//! Configuration management for reviewsync.
//!
//! [`Config`] mirrors the configuration file, with every key optional.
//! [`Settings`] is the resolved, immutable value handed to the store, the
//! ingestion flow and the sync pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{ScrapeMode, SyncMode};

/// Default database filename.
const DEFAULT_DB_PATH: &str = "reviews.db";

/// Threshold applied when the legacy `stop_on_match` flag is set without one.
const LEGACY_STOP_THRESHOLD: u32 = 3;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Object storage target settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStorageSettings {
    /// Key prefix, e.g. `reviews/`.
    pub prefix: String,
    pub reviews_folder: String,
    pub profiles_folder: String,
    pub sync_mode: SyncMode,
}

impl Default for ObjectStorageSettings {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            reviews_folder: "reviews".to_string(),
            profiles_folder: "profiles".to_string(),
            sync_mode: SyncMode::Update,
        }
    }
}

/// Document store target settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentStoreSettings {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    pub sync_mode: SyncMode,
}

/// Application settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// SQLite database file.
    pub db_path: PathBuf,
    pub scrape_mode: ScrapeMode,
    /// Consecutive unchanged reviews after which a scraper may stop paging.
    ///
    /// Nothing in this crate pages; the value is handed to the scraper, which
    /// checks each review with [`ReviewStore::should_stop`].
    ///
    /// [`ReviewStore::should_stop`]: crate::repository::ReviewStore::should_stop
    pub stop_threshold: u32,
    /// Normalize dates to RFC 3339 before writing to targets.
    pub convert_dates: bool,
    pub download_images: bool,
    /// Root of locally materialized images, laid out as `<place>/{reviews,profiles}/`.
    pub image_dir: PathBuf,
    /// Keep `local_*` fields in synced documents.
    pub store_local_paths: bool,
    /// Rewrite image URLs to the custom or object-store location.
    pub replace_urls: bool,
    /// Keep `original_*` fields when URLs are replaced.
    pub preserve_original_urls: bool,
    pub custom_url_base: String,
    pub custom_url_profiles: String,
    pub custom_url_reviews: String,
    /// Extra fields merged into every synced document.
    pub custom_params: BTreeMap<String, serde_json::Value>,
    pub use_s3: bool,
    pub s3: ObjectStorageSettings,
    pub use_mongodb: bool,
    pub mongodb: DocumentStoreSettings,
    pub backup_to_json: bool,
    pub json_path: PathBuf,
    pub seen_ids_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            scrape_mode: ScrapeMode::Update,
            stop_threshold: 3,
            convert_dates: true,
            download_images: false,
            image_dir: PathBuf::from("review_images"),
            store_local_paths: true,
            replace_urls: false,
            preserve_original_urls: true,
            custom_url_base: "https://mycustomurl.com".to_string(),
            custom_url_profiles: "/profiles/".to_string(),
            custom_url_reviews: "/reviews/".to_string(),
            custom_params: BTreeMap::new(),
            use_s3: false,
            s3: ObjectStorageSettings::default(),
            use_mongodb: false,
            mongodb: DocumentStoreSettings::default(),
            backup_to_json: false,
            json_path: PathBuf::from("google_reviews.json"),
            seen_ids_path: PathBuf::from("google_reviews.ids"),
        }
    }
}

/// `s3` section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<String>,
}

/// `mongodb` section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<String>,
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert_dates: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_images: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_local_paths: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_urls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_original_urls: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url_base: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url_profiles: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_url_reviews: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_params: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_s3: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<ObjectStorageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_mongodb: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongodb: Option<DocumentStoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_to_json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seen_ids_path: Option<String>,

    /// Deprecated: use `scrape_mode = "full"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_existing: Option<bool>,
    /// Deprecated: use `stop_threshold`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_match: Option<bool>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file, or defaults if it does not exist.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// Absolute paths are kept, `~` is expanded, anything else is joined to `base_dir`.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref db_path) = self.db_path {
            settings.db_path = self.resolve_path(db_path, base_dir);
        }
        if let Some(ref mode) = self.scrape_mode {
            settings.scrape_mode = parse_scrape_mode(mode);
        }
        if let Some(threshold) = self.stop_threshold {
            settings.stop_threshold = threshold;
        }
        if let Some(v) = self.convert_dates {
            settings.convert_dates = v;
        }
        if let Some(v) = self.download_images {
            settings.download_images = v;
        }
        if let Some(ref dir) = self.image_dir {
            settings.image_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(v) = self.store_local_paths {
            settings.store_local_paths = v;
        }
        if let Some(v) = self.replace_urls {
            settings.replace_urls = v;
        }
        if let Some(v) = self.preserve_original_urls {
            settings.preserve_original_urls = v;
        }
        if let Some(ref v) = self.custom_url_base {
            settings.custom_url_base = v.clone();
        }
        if let Some(ref v) = self.custom_url_profiles {
            settings.custom_url_profiles = v.clone();
        }
        if let Some(ref v) = self.custom_url_reviews {
            settings.custom_url_reviews = v.clone();
        }
        if !self.custom_params.is_empty() {
            settings.custom_params = self.custom_params.clone();
        }
        if let Some(v) = self.use_s3 {
            settings.use_s3 = v;
        }
        if let Some(ref s3) = self.s3 {
            if let Some(ref prefix) = s3.prefix {
                settings.s3.prefix = prefix.clone();
            }
            if let Some(ref folder) = s3.reviews_folder {
                settings.s3.reviews_folder = folder.clone();
            }
            if let Some(ref folder) = s3.profiles_folder {
                settings.s3.profiles_folder = folder.clone();
            }
            if let Some(ref mode) = s3.sync_mode {
                settings.s3.sync_mode = parse_sync_mode("s3", mode);
            }
        }
        if let Some(v) = self.use_mongodb {
            settings.use_mongodb = v;
        }
        if let Some(ref mongodb) = self.mongodb {
            settings.mongodb.uri = mongodb.uri.clone();
            settings.mongodb.database = mongodb.database.clone();
            settings.mongodb.collection = mongodb.collection.clone();
            if let Some(ref mode) = mongodb.sync_mode {
                settings.mongodb.sync_mode = parse_sync_mode("mongodb", mode);
            }
        }
        if let Some(v) = self.backup_to_json {
            settings.backup_to_json = v;
        }
        if let Some(ref path) = self.json_path {
            settings.json_path = self.resolve_path(path, base_dir);
        }
        if let Some(ref path) = self.seen_ids_path {
            settings.seen_ids_path = self.resolve_path(path, base_dir);
        }

        self.apply_legacy_keys(settings);
    }

    fn apply_legacy_keys(&self, settings: &mut Settings) {
        if self.overwrite_existing == Some(true) && settings.scrape_mode == ScrapeMode::Update {
            warn!("'overwrite_existing' is deprecated, use scrape_mode = \"full\"");
            settings.scrape_mode = ScrapeMode::Full;
        }
        if self.stop_on_match == Some(true) && settings.stop_threshold == 0 {
            warn!("'stop_on_match' is deprecated, use stop_threshold");
            settings.stop_threshold = LEGACY_STOP_THRESHOLD;
        }
    }

    /// Resolve into immutable settings. Relative paths are taken from the
    /// config file's directory, or the current directory without one.
    pub fn into_settings(self) -> Settings {
        let base_dir = self.base_dir().unwrap_or_else(|| PathBuf::from("."));
        let mut settings = Settings::default();
        self.apply_to_settings(&mut settings, &base_dir);
        settings
    }
}

fn parse_scrape_mode(value: &str) -> ScrapeMode {
    ScrapeMode::from_str(value).unwrap_or_else(|| {
        warn!(value, "Invalid scrape_mode, falling back to 'update'");
        ScrapeMode::Update
    })
}

fn parse_sync_mode(target: &str, value: &str) -> SyncMode {
    SyncMode::from_str(value).unwrap_or_else(|| {
        warn!(target, value, "Invalid sync_mode, falling back to 'update'");
        SyncMode::Update
    })
}
