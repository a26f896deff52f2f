//! Gamma API client for bracket market data.
//!
//! Fetches market information, prices, and metadata for one tag.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

use crate::client::{rate_limit_error, MarketProvider};
use crate::config::MarketsConfig;
use crate::error::Result;
use crate::types::{Observation, Side};

/// Gamma API client scoped to one market tag.
#[derive(Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
    tag: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct GammaMarket {
    id: String,
    question: String,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    volume: Option<String>,
    liquidity: Option<String>,
    closed: bool,
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<String>, // JSON string "[\"0.55\", \"0.45\"]"
}

impl GammaClient {
    /// Create a new Gamma client
    pub fn new(config: &MarketsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.gamma_url.trim_end_matches('/').to_string(),
            tag: config.tag.clone(),
        })
    }

    /// Active markets under the configured tag.
    pub async fn get_active_markets(&self) -> Result<Vec<Observation>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("tag_slug", self.tag.as_str()),
                ("limit", "200"),
            ])
            .send()
            .await?;
        if let Some(e) = rate_limit_error(&resp) {
            return Err(e);
        }

        let markets: Vec<GammaMarket> = resp.json().await?;
        Ok(markets.into_iter().filter_map(parse_observation).collect())
    }

    /// Recently closed markets under the tag, newest first. Settlement
    /// reads official outcomes from these.
    pub async fn get_recently_closed_markets(&self) -> Result<Vec<Observation>> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("closed", "true"),
                ("tag_slug", self.tag.as_str()),
                ("order", "endDate"),
                ("ascending", "false"),
                ("limit", "100"),
            ])
            .send()
            .await?;
        if let Some(e) = rate_limit_error(&resp) {
            return Err(e);
        }

        let markets: Vec<GammaMarket> = resp.json().await?;
        Ok(markets.into_iter().filter_map(parse_observation).collect())
    }
}

#[async_trait]
impl MarketProvider for GammaClient {
    async fn fetch_observations(&self) -> Result<Vec<Observation>> {
        let mut observations = self.get_active_markets().await?;
        let mut seen: HashSet<String> =
            observations.iter().map(|o| o.market_id.clone()).collect();

        // Settlement degrades gracefully when this leg fails; the next
        // cycle retries.
        match self.get_recently_closed_markets().await {
            Ok(closed) => {
                for observation in closed {
                    if seen.insert(observation.market_id.clone()) {
                        observations.push(observation);
                    }
                }
            }
            Err(e) => debug!("closed-market fetch failed: {}", e),
        }

        debug!(
            "fetched {} observations for tag '{}'",
            observations.len(),
            self.tag
        );
        Ok(observations)
    }
}

pub(super) fn parse_observation(gm: GammaMarket) -> Option<Observation> {
    // A market without an end date has no dateKey; skip it.
    let end_date = gm.end_date.as_ref()?.parse().ok()?;

    // Parse outcome prices - API returns string array like ["0.55", "0.45"]
    let outcome_prices: Vec<Decimal> = gm
        .outcome_prices
        .as_ref()
        .and_then(|s| {
            if let Ok(string_prices) = serde_json::from_str::<Vec<String>>(s) {
                let parsed: Vec<Decimal> = string_prices
                    .iter()
                    .filter_map(|p| p.parse().ok())
                    .collect();
                if !parsed.is_empty() {
                    return Some(parsed);
                }
            }
            // Fallback: bare numeric array
            serde_json::from_str::<Vec<f64>>(s).ok().map(|prices| {
                prices
                    .into_iter()
                    .filter_map(|p| Decimal::try_from(p).ok())
                    .collect()
            })
        })
        .unwrap_or_default();

    let resolved_outcome = if gm.closed {
        resolved_side(&outcome_prices)
    } else {
        None
    };

    Some(Observation {
        market_id: gm.id,
        question: gm.question,
        outcome_prices,
        end_date,
        volume: gm
            .volume
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Decimal::ZERO),
        liquidity: gm
            .liquidity
            .as_ref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Decimal::ZERO),
        closed: gm.closed,
        resolved_outcome,
    })
}

/// A resolved market collapses to 1/0. Prices still in between mean
/// the venue has not finalized the outcome.
pub(super) fn resolved_side(prices: &[Decimal]) -> Option<Side> {
    let yes = prices.first()?;
    if *yes >= dec!(0.99) {
        Some(Side::Yes)
    } else if *yes <= dec!(0.01) {
        Some(Side::No)
    } else {
        None
    }
}
