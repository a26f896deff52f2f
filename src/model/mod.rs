//! Probability model for date-bound bracket markets.
//!
//! Pure functions from a forecast value and a time horizon to a fair
//! probability for an arbitrary bracket, plus edge analysis against the
//! market-implied price. All math runs in `f64`; callers convert
//! `Decimal` prices at the boundary.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{BracketKind, ParsedBracket};

/// Horizon at which a statistical edge counts as fully exploitable.
/// Raw edges measured further out are discounted proportionally.
pub const REFERENCE_HORIZON_HOURS: f64 = 6.0;

/// Effective-edge magnitude beyond which a BUY/SELL signal fires.
pub const EDGE_SIGNAL_THRESHOLD: f64 = 0.05;

/// Uncertainty scale for a forecast at the given horizon. Step table,
/// monotone non-decreasing in the horizon; a resolved market (negative
/// horizon) is deterministic.
pub fn standard_deviation(hours_until_resolution: f64) -> f64 {
    if hours_until_resolution < 0.0 {
        0.0
    } else if hours_until_resolution <= 6.0 {
        0.8
    } else if hours_until_resolution <= 12.0 {
        1.1
    } else if hours_until_resolution <= 24.0 {
        1.5
    } else if hours_until_resolution <= 48.0 {
        2.1
    } else if hours_until_resolution <= 72.0 {
        2.6
    } else {
        3.2
    }
}

/// Probability mass of `Normal(forecast, sigma)` inside `(lower, upper]`,
/// with `None` meaning unbounded on that side.
///
/// With sigma = 0 the distribution is a point mass: 1 if the forecast
/// lies in the interval, else 0. A non-finite forecast or inverted
/// bounds yield 0 with a warning rather than an error.
pub fn bracket_probability(
    forecast: f64,
    hours_until_resolution: f64,
    lower: Option<f64>,
    upper: Option<f64>,
) -> f64 {
    if !forecast.is_finite() {
        warn!(?forecast, "non-finite forecast value, probability forced to 0");
        return 0.0;
    }
    if let (Some(lo), Some(hi)) = (lower, upper) {
        if lo >= hi {
            warn!(
                lower = lo,
                upper = hi,
                "inverted bracket bounds, probability forced to 0"
            );
            return 0.0;
        }
    }

    let sigma = standard_deviation(hours_until_resolution);
    if sigma == 0.0 {
        let above_lower = lower.map_or(true, |lo| forecast > lo);
        let within_upper = upper.map_or(true, |hi| forecast <= hi);
        return if above_lower && within_upper { 1.0 } else { 0.0 };
    }

    let upper_mass = upper.map_or(1.0, |hi| normal_cdf((hi - forecast) / sigma));
    let lower_mass = lower.map_or(0.0, |lo| normal_cdf((lo - forecast) / sigma));

    // Clamp absorbs floating-point drift at the tails.
    (upper_mass - lower_mass).clamp(0.0, 1.0)
}

/// Fair probability for a parsed bracket.
///
/// Brackets are padded by half a unit so that a complete family of
/// adjacent integer brackets tiles the real line with no gap and no
/// overlap: the probabilities of a full ladder sum to 1.
pub fn market_probability(
    forecast: f64,
    hours_until_resolution: f64,
    bracket: &ParsedBracket,
) -> f64 {
    let (lower, upper) = bracket_bounds(bracket);
    bracket_probability(forecast, hours_until_resolution, lower, upper)
}

fn bracket_bounds(bracket: &ParsedBracket) -> (Option<f64>, Option<f64>) {
    match bracket.kind {
        BracketKind::AtLeast => (Some(bracket.value - 0.5), None),
        BracketKind::AtMost => (None, Some(bracket.value + 0.5)),
        BracketKind::Exact => (Some(bracket.value - 0.5), Some(bracket.value + 0.5)),
    }
}

/// Linear decay applied to a raw edge far from resolution; at or inside
/// the reference horizon the edge counts in full.
pub fn time_compression(hours_to_settlement: f64) -> f64 {
    if hours_to_settlement <= 0.0 {
        return 1.0;
    }
    (REFERENCE_HORIZON_HOURS / hours_to_settlement).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeSignal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for EdgeSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeSignal::Buy => write!(f, "BUY"),
            EdgeSignal::Sell => write!(f, "SELL"),
            EdgeSignal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Edge of the model's fair probability over the market price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeAnalysis {
    pub edge: f64,
    /// Edge after time compression; equals `edge` when no horizon is
    /// supplied.
    pub effective_edge: f64,
    pub signal: EdgeSignal,
}

/// Compares fair probability to market price and classifies the result.
/// Outputs are rounded to four decimal places for stable logging.
pub fn analyze_edge(
    fair_probability: f64,
    market_price: f64,
    hours_to_settlement: Option<f64>,
) -> EdgeAnalysis {
    let edge = round4(fair_probability - market_price);
    let effective_edge = match hours_to_settlement {
        Some(hours) => round4(edge * time_compression(hours)),
        None => edge,
    };

    let signal = if effective_edge > EDGE_SIGNAL_THRESHOLD {
        EdgeSignal::Buy
    } else if effective_edge < -EDGE_SIGNAL_THRESHOLD {
        EdgeSignal::Sell
    } else {
        EdgeSignal::Hold
    };

    EdgeAnalysis {
        edge,
        effective_edge,
        signal,
    }
}

/// Standard normal CDF approximation (Abramowitz-Stegun)
/// Accurate to ~4 decimal places
pub fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let z = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * z);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-z * z).exp();

    0.5 * (1.0 + sign * y)
}

pub(crate) fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
