//! Position lifecycle engine.
//!
//! Owns the [`PositionsStore`] and drives every position through
//! none -> open -> closed. Entry is gated behind five checks (date not
//! decided, stop cap, one-open-per-date, ladder coherence, confirmation
//! streak); open positions are re-evaluated every cycle against the
//! current forecast and mark; a persistently near-certain exact bracket
//! decides the whole date early. All mutations are persisted to disk
//! before the cycle moves on, and every transition lands in an
//! append-only audit log.

pub mod store;

pub use store::{DecidedDateInfo, PositionsStore};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::{RiskConfig, StorageConfig, StrategyConfig};
use crate::error::Result;
use crate::model;
use crate::settlement::{self, Settler};
use crate::strategy::{track_candidate, CandidateSelection, LadderCheck, Streak};
use crate::types::{
    BracketKind, CloseReason, ForecastPoint, Observation, ParsedBracket, Position,
    SettlementRecord, Side,
};

/// Why an entry attempt was refused. Skips mutate nothing; they are
/// logged to the audit trail and the candidate stays live for the next
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipReason {
    DateDecided,
    StopCapReached,
    PositionOpen,
    AlreadyTraded,
    LadderIncoherent,
    AwaitingConfirmation,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DateDecided => write!(f, "DATE_DECIDED"),
            SkipReason::StopCapReached => write!(f, "STOP_CAP_REACHED"),
            SkipReason::PositionOpen => write!(f, "POSITION_OPEN"),
            SkipReason::AlreadyTraded => write!(f, "ALREADY_TRADED"),
            SkipReason::LadderIncoherent => write!(f, "LADDER_INCOHERENT"),
            SkipReason::AwaitingConfirmation => write!(f, "AWAITING_CONFIRMATION"),
        }
    }
}

/// Outcome of [`PositionEngine::try_enter`].
#[derive(Debug, Clone)]
pub enum EntryDecision {
    Entered(Position),
    Skipped(SkipReason),
}

/// One line of the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub market_id: String,
    pub date_key: String,
    pub side: Option<String>,
    pub price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub reason: Option<String>,
    pub cycle_id: Option<String>,
}

/// Consolidated report emitted once per early-decided date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub date_key: String,
    pub decided_at: DateTime<Utc>,
    pub trigger_market_id: String,
    pub trigger_side: Side,
    pub trigger_price: Decimal,
    pub closed_positions: u32,
    pub total_pnl: Decimal,
}

/// Single writer over the position store.
///
/// Store writes are best-effort: a failed write keeps the latest state
/// in memory and the next successful write carries it. Nothing here
/// aborts a cycle.
pub struct PositionEngine {
    store: PositionsStore,
    store_path: PathBuf,
    audit_path: PathBuf,
    reports_path: PathBuf,
    strategy: StrategyConfig,
    risk: RiskConfig,
}

impl PositionEngine {
    pub async fn load(
        storage: &StorageConfig,
        strategy: StrategyConfig,
        risk: RiskConfig,
    ) -> Result<Self> {
        let store_path = storage.positions_path();
        let store = store::load_store(&store_path).await?;
        info!(
            positions = store.positions.len(),
            open = store.open_positions().len(),
            "position store loaded"
        );
        Ok(Self {
            store,
            store_path,
            audit_path: storage.audit_log_path(),
            reports_path: storage.daily_reports_path(),
            strategy,
            risk,
        })
    }

    pub fn store(&self) -> &PositionsStore {
        &self.store
    }

    /// Feeds this cycle's winning candidate (or lack of one) into the
    /// date's confirmation state and returns the updated streak.
    pub async fn record_candidate(
        &mut self,
        date_key: &str,
        candidate: Option<&CandidateSelection>,
        now: DateTime<Utc>,
    ) -> Streak {
        let streak = track_candidate(&mut self.store.candidate_state, date_key, candidate, now);
        self.persist().await;
        streak
    }

    /// Attempts to open a position for the date's confirmed candidate.
    ///
    /// All five gates must hold; a refusal mutates nothing and reports
    /// the first failing gate.
    pub async fn try_enter(
        &mut self,
        candidate: &CandidateSelection,
        ladder: &LadderCheck,
        cycle_id: &str,
        now: DateTime<Utc>,
    ) -> EntryDecision {
        let date_key = candidate.date_key.as_str();

        let skip = if self.store.is_decided(date_key) {
            Some(SkipReason::DateDecided)
        } else if self.store.stop_count(date_key) >= self.risk.max_stops_per_date {
            Some(SkipReason::StopCapReached)
        } else if self.store.open_position_for_date(date_key).is_some() {
            Some(SkipReason::PositionOpen)
        } else if self.store.positions.contains_key(&candidate.market_id) {
            // Closed is terminal for a market id; re-entry after a stop
            // must pick a different bracket.
            Some(SkipReason::AlreadyTraded)
        } else if !ladder.coherent {
            Some(SkipReason::LadderIncoherent)
        } else if !self.confirmation_reached(date_key, candidate) {
            Some(SkipReason::AwaitingConfirmation)
        } else {
            None
        };

        if let Some(reason) = skip {
            debug!(
                market_id = %candidate.market_id,
                date_key,
                %reason,
                "entry skipped"
            );
            self.audit(AuditEntry {
                timestamp: now,
                action: "SKIP".to_string(),
                market_id: candidate.market_id.clone(),
                date_key: date_key.to_string(),
                side: Some(candidate.side.to_string()),
                price: Some(candidate.market_price),
                pnl: None,
                reason: Some(reason.to_string()),
                cycle_id: Some(cycle_id.to_string()),
            })
            .await;
            return EntryDecision::Skipped(reason);
        }

        let entry_price_yes = candidate.yes_price;
        let position = Position {
            market_id: candidate.market_id.clone(),
            date_key: date_key.to_string(),
            side: candidate.side,
            bracket: candidate.bracket,
            entry_price_yes,
            entry_price_no: Decimal::ONE - entry_price_yes,
            size: self.strategy.stake_size,
            model_probability: candidate.model_probability,
            edge: candidate.edge,
            opened_at: now,
            cycle_id: cycle_id.to_string(),
            open: true,
            closed_at: None,
            exit_price_yes: None,
            exit_price_no: None,
            close_reason: None,
            realized_pnl: None,
        };

        info!(
            market_id = %position.market_id,
            date_key,
            side = %position.side,
            price = %candidate.market_price,
            edge = candidate.edge,
            "opening position"
        );
        self.store
            .positions
            .insert(position.market_id.clone(), position.clone());
        self.persist().await;
        self.audit(AuditEntry {
            timestamp: now,
            action: "ENTER".to_string(),
            market_id: position.market_id.clone(),
            date_key: date_key.to_string(),
            side: Some(position.side.to_string()),
            price: Some(candidate.market_price),
            pnl: None,
            reason: Some(format!(
                "edge {:.4} score {:.4}",
                candidate.edge, candidate.score
            )),
            cycle_id: Some(cycle_id.to_string()),
        })
        .await;

        EntryDecision::Entered(position)
    }

    fn confirmation_reached(&self, date_key: &str, candidate: &CandidateSelection) -> bool {
        self.store.candidate_state.get(date_key).map_or(false, |s| {
            s.market_id == candidate.market_id
                && s.side == candidate.side
                && s.streak.reached(self.strategy.confirmation_cycles)
        })
    }

    /// Re-checks every open position against the current forecast and
    /// mark. Proximity breach wins over edge flip; either closes the
    /// position at mark and counts toward the date's stop cap. A
    /// position whose observation or forecast is missing this cycle is
    /// left untouched.
    pub async fn evaluate_stops(
        &mut self,
        observations: &HashMap<String, Observation>,
        forecasts: &HashMap<String, ForecastPoint>,
        now: DateTime<Utc>,
    ) -> Vec<Position> {
        let open_ids: Vec<String> = self
            .store
            .open_positions()
            .into_iter()
            .map(|p| p.market_id.clone())
            .collect();

        let mut closed = Vec::new();
        for market_id in open_ids {
            let Some(observation) = observations.get(&market_id) else {
                debug!(market_id, "no observation this cycle, stop check deferred");
                continue;
            };
            let Some(yes_price) = observation.yes_price() else {
                debug!(market_id, "observation has no prices, stop check deferred");
                continue;
            };
            let (date_key, bracket, side) = match self.store.positions.get(&market_id) {
                Some(p) => (p.date_key.clone(), p.bracket, p.side),
                None => continue,
            };
            let Some(forecast) = forecasts.get(&date_key) else {
                debug!(market_id, date_key, "no forecast this cycle, stop check deferred");
                continue;
            };

            let hours = observation.hours_until_resolution(now);
            let fair = model::market_probability(forecast.value, hours, &bracket);
            let analysis =
                model::analyze_edge(fair, yes_price.to_f64().unwrap_or(0.0), Some(hours));
            let signed_edge = match side {
                Side::Yes => analysis.effective_edge,
                Side::No => -analysis.effective_edge,
            };
            let proximity = (forecast.value - bracket.value).abs();

            let reason = if proximity > self.risk.max_proximity {
                Some(CloseReason::StopProximity)
            } else if signed_edge < -self.risk.edge_flip_stop {
                Some(CloseReason::StopEdgeFlip)
            } else {
                None
            };
            let Some(reason) = reason else { continue };

            warn!(
                market_id,
                date_key,
                %reason,
                proximity,
                edge = signed_edge,
                "stop triggered"
            );
            let Some(position) = self.close_at_mark(&market_id, yes_price, reason, now) else {
                continue;
            };
            *self
                .store
                .stopped_out_dates
                .entry(date_key.clone())
                .or_insert(0) += 1;
            self.persist().await;
            self.audit(AuditEntry {
                timestamp: now,
                action: "STOP".to_string(),
                market_id: position.market_id.clone(),
                date_key,
                side: Some(position.side.to_string()),
                price: Some(yes_price),
                pnl: position.realized_pnl,
                reason: Some(reason.to_string()),
                cycle_id: Some(position.cycle_id.clone()),
            })
            .await;
            closed.push(position);
        }
        closed
    }

    /// Early-resolution detector for one date.
    ///
    /// Tracks the maximum favorable price among the date's exact
    /// brackets. At or above the decided threshold for the required
    /// consecutive cycles, the date is marked decided, every open
    /// position on it is closed at mark, and one consolidated report is
    /// emitted. Non-qualifying cycles reset the streak.
    pub async fn check_early_resolution(
        &mut self,
        date_key: &str,
        observations: &[(Observation, ParsedBracket)],
        now: DateTime<Utc>,
    ) -> Option<DailyReport> {
        if self.store.is_decided(date_key) {
            return None;
        }

        let trigger = observations
            .iter()
            .filter(|(_, bracket)| bracket.kind == BracketKind::Exact)
            .filter_map(|(obs, _)| obs.yes_price().map(|p| (obs, p)))
            .max_by_key(|(_, price)| *price);

        let qualifying = trigger
            .as_ref()
            .map_or(false, |(_, price)| *price >= self.risk.decided_price_threshold);

        if !qualifying {
            // Nothing decided here is ever stored; an interrupted
            // streak leaves no entry behind.
            if self.store.decided_dates.remove(date_key).is_some() {
                debug!(date_key, "early-resolution streak reset");
                self.persist().await;
            }
            return None;
        }

        let date_info = self
            .store
            .decided_dates
            .entry(date_key.to_string())
            .or_default();
        date_info.streak.advance();
        let streak = date_info.streak;
        if !streak.reached(self.risk.decided_confirmation_cycles) {
            debug!(date_key, streak = streak.count(), "early-resolution qualifying cycle");
            self.persist().await;
            return None;
        }

        let (trigger_obs, trigger_price) = match trigger {
            Some(t) => t,
            None => return None,
        };
        let trigger_market_id = trigger_obs.market_id.clone();

        let date_info = self
            .store
            .decided_dates
            .entry(date_key.to_string())
            .or_default();
        date_info.decided_at = Some(now);
        date_info.trigger_market_id = Some(trigger_market_id.clone());
        date_info.trigger_side = Some(Side::Yes);
        date_info.trigger_price = Some(trigger_price);

        info!(
            date_key,
            trigger = %trigger_market_id,
            price = %trigger_price,
            "date decided early, closing all open positions"
        );

        let marks: HashMap<&str, Decimal> = observations
            .iter()
            .filter_map(|(obs, _)| obs.yes_price().map(|p| (obs.market_id.as_str(), p)))
            .collect();
        let open_ids: Vec<String> = self
            .store
            .positions
            .values()
            .filter(|p| p.open && p.date_key == date_key)
            .map(|p| p.market_id.clone())
            .collect();

        let mut closed = Vec::new();
        let mut total_pnl = Decimal::ZERO;
        for market_id in open_ids {
            let Some(mark) = marks.get(market_id.as_str()).copied() else {
                warn!(market_id, date_key, "no mark for open position, close deferred");
                continue;
            };
            let Some(position) =
                self.close_at_mark(&market_id, mark, CloseReason::EarlyResolution, now)
            else {
                continue;
            };
            total_pnl += position.realized_pnl.unwrap_or(Decimal::ZERO);
            self.audit(AuditEntry {
                timestamp: now,
                action: "EARLY_CLOSE".to_string(),
                market_id: position.market_id.clone(),
                date_key: date_key.to_string(),
                side: Some(position.side.to_string()),
                price: Some(mark),
                pnl: position.realized_pnl,
                reason: Some(CloseReason::EarlyResolution.to_string()),
                cycle_id: Some(position.cycle_id.clone()),
            })
            .await;
            closed.push(position);
        }

        let report = if self.store.has_reported(date_key) {
            None
        } else {
            self.store.reported_dates.push(date_key.to_string());
            Some(DailyReport {
                date_key: date_key.to_string(),
                decided_at: now,
                trigger_market_id,
                trigger_side: Side::Yes,
                trigger_price,
                closed_positions: closed.len() as u32,
                total_pnl,
            })
        };

        // Store first so a crash cannot double-report.
        self.persist().await;
        if let Some(report) = &report {
            if let Err(e) = append_jsonl(&self.reports_path, report).await {
                warn!(date_key, error = %e, "daily report write failed");
            }
        }
        report
    }

    /// Applies official resolutions to known positions. Each market is
    /// settled at most once; a failed log append defers that market to
    /// the next cycle.
    pub async fn apply_settlements(
        &mut self,
        settler: &mut Settler,
        resolutions: &[(String, Side)],
        now: DateTime<Utc>,
    ) -> Vec<SettlementRecord> {
        let mut records = Vec::new();
        for (market_id, outcome) in resolutions {
            let Some(position) = self.store.positions.get_mut(market_id) else {
                continue;
            };
            let settled = match settler.settle(position, *outcome, now).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(market_id, error = %e, "settlement deferred");
                    continue;
                }
            };
            self.persist().await;
            self.audit(AuditEntry {
                timestamp: now,
                action: "SETTLE".to_string(),
                market_id: market_id.clone(),
                date_key: settled.date_key.clone(),
                side: Some(settled.side.to_string()),
                price: None,
                pnl: Some(settled.realized_pnl),
                reason: Some(format!("resolved {}", settled.resolved_outcome)),
                cycle_id: None,
            })
            .await;
            records.push(settled);
        }
        records
    }

    fn close_at_mark(
        &mut self,
        market_id: &str,
        mark_yes: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Option<Position> {
        let position = self.store.positions.get_mut(market_id)?;
        let pnl = settlement::mark_to_market_pnl(position, mark_yes);
        position.open = false;
        position.closed_at = Some(now);
        position.exit_price_yes = Some(mark_yes);
        position.exit_price_no = Some(Decimal::ONE - mark_yes);
        position.close_reason = Some(reason);
        position.realized_pnl = Some(pnl);
        Some(position.clone())
    }

    /// Best-effort write. A failure keeps state in memory; the next
    /// successful write carries it.
    async fn persist(&self) {
        if let Err(e) = store::save_store(&self.store_path, &self.store).await {
            warn!(error = %e, "position store write failed, state retained in memory");
        }
    }

    async fn audit(&self, entry: AuditEntry) {
        if let Err(e) = append_jsonl(&self.audit_path, &entry).await {
            warn!(error = %e, "audit log write failed");
        }
    }
}

async fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    let line = serde_json::to_string(value)?;
    file.write_all(format!("{}\n", line).as_bytes()).await?;
    Ok(())
}
