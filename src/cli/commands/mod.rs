//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod db;
mod import;
mod review;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use reviewsync::config::{Config, Settings};

/// Configuration file used when `--config` is not given.
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

#[derive(Parser)]
#[command(name = "reviews")]
#[command(about = "Review store and sync pipeline for scraped place reviews")]
#[command(version)]
pub struct Cli {
    /// Config file path (.toml, .yaml/.yml or .json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database file (overrides config file)
    #[arg(long, global = true, env = "REVIEWSYNC_DB")]
    db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Export file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Export reviews as JSON or CSV
    Export {
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,
        /// Only export this place (all places if not specified)
        #[arg(long)]
        place_id: Option<String>,
        /// Output file, or directory for a multi-place CSV export
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include soft-deleted reviews
        #[arg(long)]
        include_deleted: bool,
    },

    /// Show database statistics
    DbStats,

    /// Delete the data of one place, or of every place
    Clear {
        /// Place to clear (all places if not specified)
        #[arg(long)]
        place_id: Option<String>,
        /// Skip the confirmation prompt
        #[arg(long)]
        confirm: bool,
    },

    /// Hide a review (soft delete)
    Hide { review_id: String, place_id: String },

    /// Restore a hidden review
    Restore { review_id: String, place_id: String },

    /// Show sync checkpoints for every place and target
    SyncStatus,

    /// Forget the sync checkpoint of one place and target
    ResetSync {
        place_id: String,
        /// Target name (s3, mongodb, json)
        target: String,
    },

    /// Delete old review history entries
    PruneHistory {
        /// Age in days above which entries are removed
        #[arg(long, default_value = "90")]
        older_than: u32,
        /// Only count what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Import a legacy JSON review file
    Migrate {
        #[arg(long)]
        json_path: PathBuf,
        /// Place URL the reviews belong to
        #[arg(long)]
        place_url: Option<String>,
    },

    /// Ingest a scrape batch file and run the sync pipeline
    Ingest {
        /// Batch JSON file produced by a scraper
        #[arg(short, long)]
        file: PathBuf,
        /// Treat the batch as a complete listing of the place's reviews
        #[arg(long)]
        exhaustive: bool,
    },
}

/// Load settings from the config file and apply CLI overrides.
fn load_settings(config_path: Option<PathBuf>, db: Option<PathBuf>) -> anyhow::Result<Settings> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut settings = Config::load(&path)?.into_settings();
    if let Some(db) = db {
        settings.db_path = db;
    }
    tracing::debug!(config = %path.display(), db = %settings.db_path.display(), "Loaded settings");
    Ok(settings)
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config, cli.db)?;

    match cli.command {
        Commands::Export {
            format,
            place_id,
            output,
            include_deleted,
        } => db::cmd_export(&settings, format, place_id.as_deref(), output, include_deleted),
        Commands::DbStats => db::cmd_db_stats(&settings),
        Commands::Clear { place_id, confirm } => db::cmd_clear(&settings, place_id.as_deref(), confirm),
        Commands::Hide {
            review_id,
            place_id,
        } => review::cmd_hide(&settings, &review_id, &place_id),
        Commands::Restore {
            review_id,
            place_id,
        } => review::cmd_restore(&settings, &review_id, &place_id),
        Commands::SyncStatus => sync::cmd_sync_status(&settings),
        Commands::ResetSync { place_id, target } => sync::cmd_reset_sync(&settings, &place_id, &target),
        Commands::PruneHistory {
            older_than,
            dry_run,
        } => db::cmd_prune_history(&settings, older_than, dry_run),
        Commands::Migrate {
            json_path,
            place_url,
        } => import::cmd_migrate(&settings, &json_path, place_url.as_deref()),
        Commands::Ingest { file, exhaustive } => import::cmd_ingest(&settings, &file, exhaustive),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn db_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.toml");
        std::fs::write(&config, "db_path = \"from_config.db\"\n").unwrap();

        let settings = load_settings(Some(config.clone()), None).unwrap();
        assert_eq!(settings.db_path, dir.path().join("from_config.db"));

        let settings = load_settings(Some(config), Some(PathBuf::from("other.db"))).unwrap();
        assert_eq!(settings.db_path, PathBuf::from("other.db"));
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["reviews", "--db", "x.db", "prune-history", "--older-than", "30", "--dry-run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::PruneHistory {
                older_than: 30,
                dry_run: true
            }
        ));

        let cli = Cli::try_parse_from(["reviews", "export", "--format", "csv", "--include-deleted"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                format: ExportFormat::Csv,
                include_deleted: true,
                ..
            }
        ));
    }
}
