//! Settlement and P&L aggregation.
//!
//! Two P&L conventions coexist. Mark-to-market closes (stops, early
//! resolution) realize the difference between exit and entry price of
//! the held side. Official settlement replaces that with a binary
//! payoff once the venue resolves the market. Every settlement appends
//! a [`SettlementRecord`] to an append-only log; the log doubles as the
//! idempotency set across restarts.


use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{BotError, Result};
use crate::types::{CloseReason, Position, SettlementRecord, Side};

/// P&L of closing a position at the given favorable-side mark price.
/// The unfavorable side exits at the complement.
pub fn mark_to_market_pnl(position: &Position, exit_price_yes: Decimal) -> Decimal {
    match position.side {
        Side::Yes => (exit_price_yes - position.entry_price_yes) * position.size,
        Side::No => {
            let exit_price_no = Decimal::ONE - exit_price_yes;
            (exit_price_no - position.entry_price_no) * position.size
        }
    }
}

/// Official P&L: the held side pays 1 if it matches the resolution
/// outcome and 0 otherwise, minus what was paid for it.
pub fn settlement_pnl(position: &Position, outcome: Side) -> Decimal {
    let payoff = if position.side == outcome {
        Decimal::ONE
    } else {
        Decimal::ZERO
    };
    (payoff - position.entry_price()) * position.size
}

/// One row of the daily P&L summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPnl {
    pub date_key: String,
    pub realized_pnl: Decimal,
    pub trades: u32,
}

/// Groups settlement records by resolution date, summing P&L and
/// counting trades. Rows come back sorted by date ascending.
pub fn daily_summary(records: &[SettlementRecord]) -> Vec<DailyPnl> {
    let mut by_date: BTreeMap<String, DailyPnl> = BTreeMap::new();
    for record in records {
        let row = by_date
            .entry(record.date_key.clone())
            .or_insert_with(|| DailyPnl {
                date_key: record.date_key.clone(),
                realized_pnl: Decimal::ZERO,
                trades: 0,
            });
        row.realized_pnl += record.realized_pnl;
        row.trades += 1;
    }
    by_date.into_values().collect()
}

/// Reads all settlement records from the log. A missing file is an
/// empty history; malformed lines are skipped with a warning.
pub async fn read_settlement_log(path: &Path) -> Result<Vec<SettlementRecord>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(BotError::Io(e)),
    };
    let mut records = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<SettlementRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(error = %e, "skipping malformed settlement record"),
        }
    }
    Ok(records)
}

/// Applies official resolutions to positions, exactly once per market.
pub struct Settler {
    log_path: PathBuf,
    settled: HashSet<String>,
}

impl Settler {
    /// Rebuilds the idempotency set from the append-only log.
    pub async fn load(log_path: PathBuf) -> Result<Self> {
        let records = read_settlement_log(&log_path).await?;
        let settled: HashSet<String> = records.into_iter().map(|r| r.market_id).collect();
        debug!(count = settled.len(), "settlement idempotency set loaded");
        Ok(Self { log_path, settled })
    }

    pub fn is_settled(&self, market_id: &str) -> bool {
        self.settled.contains(market_id)
    }

    /// Settles one position against the official outcome. Returns
    /// `None` when the market id was already processed.
    ///
    /// The record is appended before any state changes; a failed append
    /// leaves the position untouched so the next cycle retries it.
    pub async fn settle(
        &mut self,
        position: &mut Position,
        outcome: Side,
        now: DateTime<Utc>,
    ) -> Result<Option<SettlementRecord>> {
        if self.settled.contains(&position.market_id) {
            debug!(market_id = %position.market_id, "already settled, skipping");
            return Ok(None);
        }

        let pnl = settlement_pnl(position, outcome);
        let record = SettlementRecord {
            market_id: position.market_id.clone(),
            date_key: position.date_key.clone(),
            side: position.side,
            entry_price_yes: position.entry_price_yes,
            entry_price_no: position.entry_price_no,
            resolved_outcome: outcome,
            realized_pnl: pnl,
            settled_at: now,
        };
        self.append_record(&record).await?;

        if position.open {
            let exit_price_yes = match outcome {
                Side::Yes => Decimal::ONE,
                Side::No => Decimal::ZERO,
            };
            position.open = false;
            position.closed_at = Some(now);
            position.exit_price_yes = Some(exit_price_yes);
            position.exit_price_no = Some(Decimal::ONE - exit_price_yes);
            position.close_reason = Some(CloseReason::Settlement);
        }
        // Official P&L overrides any earlier mark-to-market figure.
        position.realized_pnl = Some(pnl);
        self.settled.insert(position.market_id.clone());

        info!(
            market_id = %position.market_id,
            outcome = %outcome,
            pnl = %pnl,
            "position settled"
        );
        Ok(Some(record))
    }

    async fn append_record(&self, record: &SettlementRecord) -> Result<()> {
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        let line = serde_json::to_string(record)?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        Ok(())
    }
}
