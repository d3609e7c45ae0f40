//! Shared helper functions for CLI commands.

use console::style;

use reviewsync::config::Settings;
use reviewsync::repository::ReviewStore;

/// Open the review database named by the settings.
pub fn open_store(settings: &Settings) -> anyhow::Result<ReviewStore> {
    let store = ReviewStore::open(&settings.db_path).map_err(|e| {
        anyhow::anyhow!(
            "Failed to open database {}: {}",
            settings.db_path.display(),
            e
        )
    })?;
    Ok(store)
}

/// Format bytes as a human-readable size.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Print a `✓` line.
pub fn success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Print a `!` line.
pub fn warning(message: &str) {
    println!("{} {}", style("!").yellow(), message);
}
