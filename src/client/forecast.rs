//! Forecast retrieval.
//!
//! Daily forecast values come from an open-meteo style endpoint: one
//! primary source plus an optional fallback whose points only fill
//! dates the primary left missing.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::{rate_limit_error, ForecastProvider};
use crate::config::ForecastConfig;
use crate::error::{BotError, Result};
use crate::types::ForecastPoint;

pub struct ForecastClient {
    http: Client,
    config: ForecastConfig,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<String>,
    /// One numeric series per requested metric, keyed by metric name.
    /// A null entry means the source has no value for that date yet.
    #[serde(flatten)]
    series: HashMap<String, Vec<Option<f64>>>,
}

impl ForecastClient {
    pub fn new(config: ForecastConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { http, config })
    }

    async fn fetch_from(&self, url: &str, date_keys: &[String]) -> Result<Vec<ForecastPoint>> {
        // YYYY-MM-DD sorts chronologically.
        let Some(start_date) = date_keys.iter().min() else {
            return Ok(Vec::new());
        };
        let Some(end_date) = date_keys.iter().max() else {
            return Ok(Vec::new());
        };

        let resp = self
            .http
            .get(url)
            .query(&[
                ("latitude", self.config.latitude.to_string()),
                ("longitude", self.config.longitude.to_string()),
                ("daily", self.config.metric.clone()),
                ("timezone", "UTC".to_string()),
                ("start_date", start_date.clone()),
                ("end_date", end_date.clone()),
            ])
            .send()
            .await?;
        if let Some(e) = rate_limit_error(&resp) {
            return Err(e);
        }
        let body: OpenMeteoResponse = resp.json().await?;

        let Some(daily) = body.daily else {
            return Err(BotError::ForecastUnavailable(format!(
                "no daily block in response from {url}"
            )));
        };
        let Some(values) = daily.series.get(&self.config.metric) else {
            return Err(BotError::ForecastUnavailable(format!(
                "metric '{}' missing from response",
                self.config.metric
            )));
        };

        let wanted: HashSet<&str> = date_keys.iter().map(String::as_str).collect();
        let mut points = Vec::new();
        for (date_key, value) in daily.time.iter().zip(values.iter()) {
            if !wanted.contains(date_key.as_str()) {
                continue;
            }
            let Some(value) = value else { continue };
            points.push(ForecastPoint {
                date_key: date_key.clone(),
                value: *value,
            });
        }
        debug!("{} forecast points from {}", points.len(), url);
        Ok(points)
    }
}

#[async_trait]
impl ForecastProvider for ForecastClient {
    async fn fetch(&self, date_keys: &[String]) -> Result<Vec<ForecastPoint>> {
        if date_keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut points = match self.fetch_from(&self.config.url, date_keys).await {
            Ok(points) => points,
            Err(e) => {
                warn!("primary forecast source failed: {}", e);
                Vec::new()
            }
        };

        if let Some(fallback_url) = &self.config.fallback_url {
            let missing: Vec<String> = date_keys
                .iter()
                .filter(|d| !points.iter().any(|p| &p.date_key == *d))
                .cloned()
                .collect();
            if !missing.is_empty() {
                match self.fetch_from(fallback_url, &missing).await {
                    Ok(extra) => merge_missing(&mut points, extra),
                    Err(e) => warn!("fallback forecast source failed: {}", e),
                }
            }
        }

        if points.is_empty() {
            return Err(BotError::ForecastUnavailable(
                "no forecast source returned data".to_string(),
            ));
        }
        Ok(points)
    }
}

/// Adds `extra` points for dates `base` does not already cover. On a
/// conflict the existing point wins.
pub(super) fn merge_missing(base: &mut Vec<ForecastPoint>, extra: Vec<ForecastPoint>) {
    for point in extra {
        if !base.iter().any(|p| p.date_key == point.date_key) {
            base.push(point);
        }
    }
}
