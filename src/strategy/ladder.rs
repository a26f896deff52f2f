//! Ladder coherence validation.
//!
//! A date's sibling brackets should price out like a probability
//! distribution. Before any new entry for that date, the whole ladder is
//! checked; an incoherent ladder blocks entries (it never force-closes
//! existing positions).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

/// Why a ladder failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LadderFault {
    /// Favorable prices sum far from 1.
    SumOutOfRange,
    /// Everything priced high with almost no spread.
    UniformOverpricing,
    /// A missing bracket leaves a blind spot wider than one unit.
    BracketGap,
}

impl std::fmt::Display for LadderFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LadderFault::SumOutOfRange => "SUM_OUT_OF_RANGE",
            LadderFault::UniformOverpricing => "UNIFORM_OVERPRICING",
            LadderFault::BracketGap => "BRACKET_GAP",
        };
        write!(f, "{}", s)
    }
}

/// Statistics over one date's ladder plus the verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LadderCheck {
    pub coherent: bool,
    pub sum: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub max_gap: f64,
    pub fault: Option<LadderFault>,
}

/// Validates one date's ladder from `(bracket value, favorable price)`
/// pairs.
///
/// Coherent iff the price sum lands in [0.75, 1.25], the ladder is not
/// uniformly overpriced (mean > 0.4 with std dev < 0.05), and no two
/// adjacent bracket values are more than one unit apart.
pub fn validate_ladder(rungs: &[(f64, Decimal)]) -> LadderCheck {
    let prices: Vec<f64> = rungs
        .iter()
        .map(|(_, price)| price.to_f64().unwrap_or(0.0))
        .collect();

    let sum: f64 = prices.iter().sum();
    let mean = if prices.is_empty() {
        0.0
    } else {
        sum / prices.len() as f64
    };
    let variance = if prices.is_empty() {
        0.0
    } else {
        prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / prices.len() as f64
    };
    let std_dev = variance.sqrt();

    let mut values: Vec<f64> = rungs.iter().map(|(value, _)| *value).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let max_gap = values
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold(0.0_f64, f64::max);

    let fault = if !(0.75..=1.25).contains(&sum) {
        Some(LadderFault::SumOutOfRange)
    } else if mean > 0.4 && std_dev < 0.05 {
        Some(LadderFault::UniformOverpricing)
    } else if max_gap > 1.0 {
        Some(LadderFault::BracketGap)
    } else {
        None
    };

    LadderCheck {
        coherent: fault.is_none(),
        sum,
        mean,
        std_dev,
        max_gap,
        fault,
    }
}
