//! Sync checkpoint commands.

use console::style;

use crate::cli::helpers::{open_store, success, warning};
use reviewsync::config::Settings;
use reviewsync::models::{CheckpointStatus, SyncTarget};

/// List every checkpoint with its place name.
pub fn cmd_sync_status(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let rows = store.get_all_sync_status()?;
    if rows.is_empty() {
        println!("No sync checkpoints found.");
        return Ok(());
    }

    println!("\n{}", style("Sync Checkpoints").bold());
    println!("{}", "-".repeat(60));
    for row in &rows {
        let cp = &row.checkpoint;
        let status = match cp.status {
            CheckpointStatus::Ok => style(cp.status.as_str()).green(),
            CheckpointStatus::Partial => style(cp.status.as_str()).yellow(),
        };
        let synced = cp
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} ({}) -> {}: {} (last: {}, attempts: {})",
            style(&cp.place_id).cyan(),
            row.place_name.as_deref().unwrap_or("?"),
            cp.target,
            status,
            synced,
            cp.attempt_count
        );
        if let Some(ref error) = cp.error_message {
            println!("    error: {}", style(error).red());
        }
    }
    Ok(())
}

/// Forget one checkpoint so the next run starts from scratch.
pub fn cmd_reset_sync(settings: &Settings, place_id: &str, target: &str) -> anyhow::Result<()> {
    if SyncTarget::from_str(target).is_none() {
        warning(&format!("Unknown target '{}' (expected s3, mongodb or json)", target));
    }
    let store = open_store(settings)?;
    if store.reset_sync_checkpoint(place_id, target)? {
        success(&format!("Reset sync checkpoint for {} -> {}.", place_id, target));
    } else {
        warning(&format!("No checkpoint for {} -> {}.", place_id, target));
    }
    Ok(())
}
