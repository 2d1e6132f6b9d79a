//! Persistence layer.
//!
//! Saves and loads risk accounting and balances to/from a JSON file so that
//! daily limits survive a restart. The file is written to a sibling temp
//! path and renamed into place.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{PortfolioState, RiskState};

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "arb_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub cycle_count: u64,
    pub risk: RiskState,
    pub portfolio: PortfolioState,
    pub saved_at: DateTime<Utc>,
}

impl PersistedState {
    pub fn new(cycle_count: u64, risk: RiskState, portfolio: PortfolioState) -> Self {
        Self {
            cycle_count,
            risk,
            portfolio,
            saved_at: Utc::now(),
        }
    }
}

/// Save engine state to a JSON file.
pub fn save_state(state: &PersistedState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise engine state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).context(format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path).context(format!("Failed to move state into {path}"))?;

    debug!(path, cycle = state.cycle_count, trades = state.risk.daily_trades, "State saved");
    Ok(())
}

/// Load engine state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<PersistedState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path).context(format!("Failed to read state from {path}"))?;

    let state: PersistedState =
        serde_json::from_str(&json).context(format!("Failed to parse state from {path}"))?;

    info!(
        path,
        cycle_count = state.cycle_count,
        risk = %state.risk,
        portfolio = %state.portfolio,
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
