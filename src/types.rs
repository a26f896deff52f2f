//! Core domain types shared across the bot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Formats a timestamp as the UTC calendar-date key (`YYYY-MM-DD`) that
/// groups sibling bracket markets resolving on the same day.
pub fn date_key_for(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// Which outcome of a bracket market a position is backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Bracket semantics extracted from a market question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketKind {
    AtLeast,
    AtMost,
    Exact,
}

/// A bracket condition parsed out of a market's free-text question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParsedBracket {
    pub kind: BracketKind,
    pub value: f64,
}

impl std::fmt::Display for ParsedBracket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            BracketKind::AtLeast => write!(f, ">= {}", self.value),
            BracketKind::AtMost => write!(f, "<= {}", self.value),
            BracketKind::Exact => write!(f, "= {}", self.value),
        }
    }
}

/// One market's public state captured at the start of a cycle.
/// Immutable once captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub market_id: String,
    pub question: String,
    /// Favorable (YES) price first, complement second.
    pub outcome_prices: Vec<Decimal>,
    pub end_date: DateTime<Utc>,
    pub volume: Decimal,
    pub liquidity: Decimal,
    pub closed: bool,
    /// Official resolution, once the venue publishes one.
    #[serde(default)]
    pub resolved_outcome: Option<Side>,
}

impl Observation {
    pub fn yes_price(&self) -> Option<Decimal> {
        self.outcome_prices.first().copied()
    }

    pub fn no_price(&self) -> Option<Decimal> {
        self.outcome_prices.get(1).copied()
    }

    /// UTC calendar date this market resolves on.
    pub fn date_key(&self) -> String {
        date_key_for(self.end_date)
    }

    /// Hours from `now` until resolution; negative once past end time.
    pub fn hours_until_resolution(&self, now: DateTime<Utc>) -> f64 {
        (self.end_date - now).num_seconds() as f64 / 3600.0
    }
}

/// A forecast value for one date key, refreshed every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub date_key: String,
    pub value: f64,
}

/// Why a position left the open state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    EarlyResolution,
    StopProximity,
    StopEdgeFlip,
    Settlement,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CloseReason::EarlyResolution => "EARLY_RESOLUTION",
            CloseReason::StopProximity => "STOP_PROXIMITY",
            CloseReason::StopEdgeFlip => "STOP_EDGE_FLIP",
            CloseReason::Settlement => "SETTLEMENT",
        };
        write!(f, "{}", s)
    }
}

/// One trade through its lifecycle. At most one open position exists per
/// date key at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub date_key: String,
    pub side: Side,
    pub bracket: ParsedBracket,
    /// Entry prices for both outcomes; sum to 1 by construction.
    pub entry_price_yes: Decimal,
    pub entry_price_no: Decimal,
    pub size: Decimal,
    pub model_probability: f64,
    pub edge: f64,
    pub opened_at: DateTime<Utc>,
    /// Decision cycle that opened this position.
    pub cycle_id: String,
    pub open: bool,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price_yes: Option<Decimal>,
    #[serde(default)]
    pub exit_price_no: Option<Decimal>,
    #[serde(default)]
    pub close_reason: Option<CloseReason>,
    #[serde(default)]
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// Entry price paid for the side this position backs.
    pub fn entry_price(&self) -> Decimal {
        match self.side {
            Side::Yes => self.entry_price_yes,
            Side::No => self.entry_price_no,
        }
    }
}

/// One resolved trade, appended to the settlement log. Market ids in the
/// log are never settled twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub market_id: String,
    pub date_key: String,
    pub side: Side,
    pub entry_price_yes: Decimal,
    pub entry_price_no: Decimal,
    pub resolved_outcome: Side,
    pub realized_pnl: Decimal,
    pub settled_at: DateTime<Utc>,
}
