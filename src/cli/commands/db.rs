//! Database management commands.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use console::style;

use super::ExportFormat;
use crate::cli::helpers::{format_bytes, open_store, success, warning};
use reviewsync::config::Settings;
use reviewsync::repository::TableCounts;

/// Export reviews of one place or of every place.
pub fn cmd_export(
    settings: &Settings,
    format: ExportFormat,
    place_id: Option<&str>,
    output: Option<PathBuf>,
    include_deleted: bool,
) -> anyhow::Result<()> {
    let store = open_store(settings)?;

    match format {
        ExportFormat::Json => {
            let text = match place_id {
                Some(place_id) => {
                    serde_json::to_string_pretty(&store.export_reviews_json(place_id, include_deleted)?)?
                }
                None => serde_json::to_string_pretty(&store.export_all_json(include_deleted)?)?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    success(&format!("Exported to {}", path.display()));
                }
                None => println!("{}", text),
            }
        }
        ExportFormat::Csv => match place_id {
            Some(place_id) => {
                let path = output.unwrap_or_else(|| PathBuf::from(format!("reviews_{}.csv", place_id)));
                let count = store.export_reviews_csv(place_id, &path, include_deleted)?;
                success(&format!("Exported {} reviews to {}", count, path.display()));
            }
            None => {
                let dir = output.unwrap_or_else(|| PathBuf::from("exports"));
                let files = store.export_all_csv(&dir, include_deleted)?;
                for (place_id, path) in &files {
                    println!("  {}: {}", style(place_id).cyan(), path.display());
                }
                success(&format!("Exported {} places to {}/", files.len(), dir.display()));
            }
        },
    }
    Ok(())
}

/// Show table counts, file size and a per-place breakdown.
pub fn cmd_db_stats(settings: &Settings) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let stats = store.get_stats()?;

    println!("\n{}", style("Database Statistics").bold());
    println!("{}", "-".repeat(40));
    println!("  Database:         {}", settings.db_path.display());
    println!("  Schema version:   {}", store.schema_version()?);
    for (table, count) in &stats.table_counts {
        println!("  {:<18}{}", format!("{}:", table), count);
    }
    println!("  {:<18}{}", "DB size:", format_bytes(stats.db_size_bytes));

    if !stats.places.is_empty() {
        println!("\n{}", style("Per-place breakdown").bold());
        for place in &stats.places {
            let last = place
                .last_scraped
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {}: {} ({} reviews, last scraped {})",
                style(&place.place_id).cyan(),
                place.place_name,
                place.total_reviews,
                last
            );
        }
    }
    Ok(())
}

/// Clear one place or the whole database after confirmation.
pub fn cmd_clear(settings: &Settings, place_id: Option<&str>, confirm: bool) -> anyhow::Result<()> {
    if !confirm {
        let target = place_id.unwrap_or("ALL places");
        print!("Clear data for {}? This cannot be undone. [y/N]: ", target);
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            warning("Cancelled.");
            return Ok(());
        }
    }

    let store = open_store(settings)?;
    let counts = match place_id {
        Some(place_id) => {
            let counts = store.clear_place(place_id)?;
            success(&format!("Cleared place {}:", place_id));
            counts
        }
        None => {
            let counts = store.clear_all()?;
            success("Cleared all data:");
            counts
        }
    };
    print_counts(&counts);
    Ok(())
}

/// Remove or count history entries older than `older_than` days.
pub fn cmd_prune_history(settings: &Settings, older_than: u32, dry_run: bool) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    let count = store.prune_history(older_than, dry_run)?;
    if dry_run {
        println!(
            "{} Would prune {} history entries older than {} days.",
            style("→").cyan(),
            count,
            older_than
        );
    } else {
        success(&format!(
            "Pruned {} history entries older than {} days.",
            count, older_than
        ));
    }
    Ok(())
}

fn print_counts(counts: &TableCounts) {
    for (table, count) in counts {
        println!("  {}: {} rows", table, count);
    }
}
