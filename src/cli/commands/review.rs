//! Manual review visibility commands.

use crate::cli::helpers::{open_store, success, warning};
use reviewsync::config::Settings;

pub fn cmd_hide(settings: &Settings, review_id: &str, place_id: &str) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    if store.hide_review(review_id, place_id)? {
        success(&format!("Review {} hidden.", review_id));
    } else {
        warning(&format!("Review {} not found or already hidden.", review_id));
    }
    Ok(())
}

pub fn cmd_restore(settings: &Settings, review_id: &str, place_id: &str) -> anyhow::Result<()> {
    let store = open_store(settings)?;
    if store.restore_review(review_id, place_id)? {
        success(&format!("Review {} restored.", review_id));
    } else {
        warning(&format!("Review {} not found or not hidden.", review_id));
    }
    Ok(())
}
