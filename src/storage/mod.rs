//! Persistence layer.
//!
//! Saves and loads the decision/trade journal to a JSON file so the
//! dashboard history survives restarts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::engine::{DecisionRecord, TradeRecord};

/// On-disk journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
    #[serde(default)]
    pub trades: Vec<TradeRecord>,
}

/// Save the journal to a JSON file.
pub fn save_journal(journal: &Journal, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(journal).context("Failed to serialise journal")?;

    std::fs::write(path, &json).context(format!("Failed to write journal to {path}"))?;

    debug!(
        path,
        decisions = journal.decisions.len(),
        trades = journal.trades.len(),
        "Journal saved"
    );
    Ok(())
}

/// Load the journal from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_journal(path: &str) -> Result<Option<Journal>> {
    if !Path::new(path).exists() {
        info!(path, "No journal found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read journal from {path}"))?;

    let journal: Journal =
        serde_json::from_str(&json).context(format!("Failed to parse journal from {path}"))?;

    info!(
        path,
        decisions = journal.decisions.len(),
        trades = journal.trades.len(),
        saved_at = %journal.saved_at,
        "Journal loaded from disk"
    );

    Ok(Some(journal))
}

/// Delete the journal file (for testing or reset).
pub fn delete_journal(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete journal {path}"))?;
        info!(path, "Journal deleted");
    }
    Ok(())
}
