//! Import commands: legacy JSON migration and scrape batch ingestion.

use std::path::Path;

use console::style;

use crate::cli::helpers::{open_store, success, warning};
use reviewsync::config::Settings;
use reviewsync::ingest::{run_scrape, ScrapeBatch};
use reviewsync::migrate::migrate_json;
use reviewsync::sync::{SyncOrchestrator, TaskOutcome};

pub fn cmd_migrate(settings: &Settings, json_path: &Path, place_url: Option<&str>) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let stats = migrate_json(&store, json_path, place_url)?;
    success(&format!(
        "Migrated from JSON: {} total, {} new, {} updated, {} skipped",
        stats.total, stats.new, stats.updated, stats.skipped
    ));
    Ok(())
}

pub fn cmd_ingest(settings: &Settings, file: &Path, exhaustive: bool) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(file)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", file.display(), e))?;
    let mut batch: ScrapeBatch = serde_json::from_str(&contents)?;
    batch.exhaustive |= exhaustive;

    let store = open_store(settings)?;
    let orchestrator = SyncOrchestrator::new(settings.clone());
    let report = run_scrape(&store, &orchestrator, settings.scrape_mode, &batch)?;

    println!(
        "{} {} (session {})",
        style("→").cyan(),
        style(&report.place_id).bold(),
        report.session_id
    );
    println!(
        "  {} new, {} updated, {} restored, {} unchanged, {} soft-deleted",
        report.counts.new,
        report.counts.updated,
        report.counts.restored,
        report.counts.unchanged,
        report.soft_deleted
    );
    for (task, outcome) in &report.sync.tasks {
        match outcome {
            TaskOutcome::Completed => println!("  {} {}", style("✓").green(), task.name()),
            TaskOutcome::Skipped => println!("  {} {}", style("-").dim(), task.name()),
            TaskOutcome::Failed(error) => {
                println!("  {} {}: {}", style("✗").red(), task.name(), error)
            }
        }
    }

    if report.sync.failures() > 0 {
        warning(&format!("{} sync task(s) failed", report.sync.failures()));
    } else {
        success("Ingestion complete");
    }
    Ok(())
}
