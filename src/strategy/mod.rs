//! Candidate selection and confirmation.
//!
//! Each cycle, every sibling bracket for a date is scored against the
//! model; the top scorer becomes the date's candidate. A candidate must
//! hold the lead for a configured number of consecutive cycles before
//! the engine may open a position on it.

pub mod confirmation;
pub mod ladder;


pub use confirmation::Streak;
pub use ladder::{validate_ladder, LadderCheck, LadderFault};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StrategyConfig;
use crate::model::{self, EdgeSignal};
use crate::types::{ForecastPoint, Observation, ParsedBracket, Side};

/// A scored proposal to open a position. Recomputed every cycle.
#[derive(Debug, Clone)]
pub struct CandidateSelection {
    pub market_id: String,
    pub date_key: String,
    pub side: Side,
    pub bracket: ParsedBracket,
    /// Fair probability of the favorable outcome.
    pub model_probability: f64,
    /// Current price of the favorable outcome.
    pub yes_price: Decimal,
    /// Price paid for the chosen side.
    pub market_price: Decimal,
    /// Time-compressed edge, signed in the favorable-outcome frame.
    pub edge: f64,
    /// |forecast - bracket value|.
    pub proximity: f64,
    pub score: f64,
    pub computed_at: DateTime<Utc>,
}

/// The persisted identity and streak of a date's leading candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateState {
    pub market_id: String,
    pub side: Side,
    pub score: f64,
    pub streak: Streak,
    pub since: DateTime<Utc>,
}

/// Scores observations and picks the best candidate per date.
pub struct CandidateRanker {
    config: StrategyConfig,
}

impl CandidateRanker {
    pub fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Scores one observation against the forecast for its date.
    /// Returns `None` when the market fails a floor or the model sees no
    /// actionable edge.
    pub fn score_observation(
        &self,
        observation: &Observation,
        bracket: &ParsedBracket,
        forecast: &ForecastPoint,
        now: DateTime<Utc>,
    ) -> Option<CandidateSelection> {
        if observation.closed {
            return None;
        }
        if observation.liquidity < self.config.min_liquidity
            || observation.volume < self.config.min_volume
        {
            return None;
        }
        let yes_price = observation.yes_price()?;
        if self.is_placeholder_book(observation) {
            debug!(
                market_id = %observation.market_id,
                "skipping uninitialized book"
            );
            return None;
        }
        let hours = observation.hours_until_resolution(now);
        if hours <= 0.0 {
            return None;
        }

        let fair = model::market_probability(forecast.value, hours, bracket);
        let market_yes = yes_price.to_f64().unwrap_or(0.0);
        let analysis = model::analyze_edge(fair, market_yes, Some(hours));

        let (side, market_price) = match analysis.signal {
            EdgeSignal::Buy => (Side::Yes, yes_price),
            EdgeSignal::Sell => (Side::No, Decimal::ONE - yes_price),
            EdgeSignal::Hold => return None,
        };
        if analysis.effective_edge.abs() < self.config.min_edge {
            return None;
        }

        let proximity = (forecast.value - bracket.value).abs();
        let score = analysis.effective_edge.abs() - self.config.proximity_weight * proximity;

        Some(CandidateSelection {
            market_id: observation.market_id.clone(),
            date_key: observation.date_key(),
            side,
            bracket: *bracket,
            model_probability: fair,
            yes_price,
            market_price,
            edge: analysis.effective_edge,
            proximity,
            score,
            computed_at: now,
        })
    }

    /// The top-scoring candidate for a date.
    pub fn select_best(
        &self,
        candidates: Vec<CandidateSelection>,
    ) -> Option<CandidateSelection> {
        candidates.into_iter().max_by(|a, b| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    }

    /// Both outcome prices parked at the venue's 0.50/0.50 default mean
    /// the book has never traded.
    fn is_placeholder_book(&self, observation: &Observation) -> bool {
        let half = dec!(0.5);
        match (observation.yes_price(), observation.no_price()) {
            (Some(yes), Some(no)) => {
                (yes - half).abs() <= self.config.placeholder_epsilon
                    && (no - half).abs() <= self.config.placeholder_epsilon
            }
            _ => false,
        }
    }
}

/// Updates a date's candidate state from this cycle's winner.
///
/// The same candidate repeating advances its streak; a different winner
/// restarts the streak at 1 with a fresh `since`; no winner removes the
/// state entirely. Returns the streak after the update.
pub fn track_candidate(
    states: &mut HashMap<String, CandidateState>,
    date_key: &str,
    candidate: Option<&CandidateSelection>,
    now: DateTime<Utc>,
) -> Streak {
    let Some(candidate) = candidate else {
        if states.remove(date_key).is_some() {
            debug!(date_key, "candidate cleared, no valid market this cycle");
        }
        return Streak::new();
    };

    match states.get_mut(date_key) {
        Some(state)
            if state.market_id == candidate.market_id && state.side == candidate.side =>
        {
            state.streak.advance();
            state.score = candidate.score;
            state.streak
        }
        _ => {
            let mut streak = Streak::new();
            streak.restart();
            states.insert(
                date_key.to_string(),
                CandidateState {
                    market_id: candidate.market_id.clone(),
                    side: candidate.side,
                    score: candidate.score,
                    streak,
                    since: now,
                },
            );
            streak
        }
    }
}
