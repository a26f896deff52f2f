//! Persistent state owned by the position engine.
//!
//! One JSON document holds everything the engine mutates: positions,
//! per-date early-resolution state, candidate confirmation state, stop
//! counters and the reported-dates guard. Writes go through a temp file
//! and a rename so an interrupted process never leaves a torn store.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::strategy::{CandidateState, Streak};
use crate::types::{Position, Side};

/// Early-resolution bookkeeping for one date.
///
/// The streak counts consecutive cycles in which some exact bracket
/// traded at or above the decided threshold. Once `decided_at` is set
/// it is never cleared; the trigger fields record which market tripped
/// it and at what price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecidedDateInfo {
    #[serde(default)]
    pub streak: Streak,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trigger_market_id: Option<String>,
    #[serde(default)]
    pub trigger_side: Option<Side>,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
}

impl DecidedDateInfo {
    pub fn is_decided(&self) -> bool {
        self.decided_at.is_some()
    }
}

/// Aggregate root for engine state. Single-writer: only the position
/// engine holds a mutable reference, and it persists after every
/// mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsStore {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub positions: HashMap<String, Position>,
    #[serde(default)]
    pub decided_dates: HashMap<String, DecidedDateInfo>,
    #[serde(default)]
    pub candidate_state: HashMap<String, CandidateState>,
    #[serde(default)]
    pub stopped_out_dates: HashMap<String, u32>,
    #[serde(default)]
    pub reported_dates: Vec<String>,
}

fn default_schema_version() -> u32 {
    1
}

impl Default for PositionsStore {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            positions: HashMap::new(),
            decided_dates: HashMap::new(),
            candidate_state: HashMap::new(),
            stopped_out_dates: HashMap::new(),
            reported_dates: Vec::new(),
        }
    }
}

impl PositionsStore {
    /// The open position for a date, if any. At most one exists.
    pub fn open_position_for_date(&self, date_key: &str) -> Option<&Position> {
        self.positions
            .values()
            .find(|p| p.open && p.date_key == date_key)
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().filter(|p| p.open).collect()
    }

    pub fn stop_count(&self, date_key: &str) -> u32 {
        self.stopped_out_dates.get(date_key).copied().unwrap_or(0)
    }

    pub fn is_decided(&self, date_key: &str) -> bool {
        self.decided_dates
            .get(date_key)
            .map_or(false, DecidedDateInfo::is_decided)
    }

    pub fn has_reported(&self, date_key: &str) -> bool {
        self.reported_dates.iter().any(|d| d == date_key)
    }
}

/// Reads the store from disk; a missing file is an empty store.
pub async fn load_store(path: &Path) -> Result<PositionsStore> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(PositionsStore::default())
        }
        Err(e) => return Err(BotError::Io(e)),
    };
    serde_json::from_str(&raw).map_err(BotError::from)
}

/// Writes the store atomically: temp file in the same directory, then
/// rename over the target.
pub async fn save_store(path: &Path, store: &PositionsStore) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Err(BotError::Internal("invalid store path".to_string()));
    };
    tokio::fs::create_dir_all(parent).await?;
    let tmp = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(store)?;
    tokio::fs::write(&tmp, body).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
