//! HTTP collaborators: market data and forecasts.
//!
//! The decision cycle consumes these through the two provider traits so
//! the engine and runner stay testable without a network.

pub mod forecast;
pub mod markets;
pub mod retry;


pub use forecast::ForecastClient;
pub use markets::GammaClient;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use reqwest::{header, Response, StatusCode};

use crate::error::{BotError, Result};
use crate::types::{ForecastPoint, Observation};

/// Source of market observations for a cycle.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Current markets under the configured tag, including recently
    /// closed ones so settlement can observe official outcomes.
    async fn fetch_observations(&self) -> Result<Vec<Observation>>;
}

/// Source of forecast values for a set of dates.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch(&self, date_keys: &[String]) -> Result<Vec<ForecastPoint>>;
}

/// Maps an HTTP 429 to [`BotError::RateLimited`], carrying the
/// server's retry-after hint when one is given.
pub(crate) fn rate_limit_error(resp: &Response) -> Option<BotError> {
    if resp.status() != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let retry_after_secs = resp
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok());
    Some(BotError::RateLimited { retry_after_secs })
}
