//! Configuration loading and validation.
//!
//! Settings come from a TOML file merged with `BRACKET_BOT__`-prefixed
//! environment variables. Every field has a default so a missing file or
//! an empty table still yields a runnable configuration.

use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub markets: MarketsConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Loads configuration from `path` (optional) merged with environment
    /// variables, e.g. `BRACKET_BOT__STRATEGY__MIN_EDGE=0.05`.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("BRACKET_BOT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

/// Market-data provider settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// Tag slug selecting the bracket-market family to trade.
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            tag: default_tag(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Forecast provider settings. The fallback source, when configured,
/// fills dates the primary source missed.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_forecast_url")]
    pub url: String,
    #[serde(default)]
    pub fallback_url: Option<String>,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    /// Daily metric requested from the provider.
    #[serde(default = "default_metric")]
    pub metric: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            url: default_forecast_url(),
            fallback_url: None,
            latitude: default_latitude(),
            longitude: default_longitude(),
            metric: default_metric(),
        }
    }
}

/// Candidate selection thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    /// Minimum absolute time-compressed edge to consider a market.
    #[serde(default = "default_min_edge")]
    pub min_edge: f64,
    #[serde(default = "default_min_liquidity")]
    pub min_liquidity: Decimal,
    #[serde(default = "default_min_volume")]
    pub min_volume: Decimal,
    /// Consecutive cycles the same candidate must lead before entry.
    #[serde(default = "default_confirmation_cycles")]
    pub confirmation_cycles: u32,
    /// Weight of forecast proximity in the candidate score.
    #[serde(default = "default_proximity_weight")]
    pub proximity_weight: f64,
    /// Both outcome prices within this distance of 0.50 marks an
    /// uninitialized book. Venue-specific; may need recalibration.
    #[serde(default = "default_placeholder_epsilon")]
    pub placeholder_epsilon: Decimal,
    #[serde(default = "default_stake_size")]
    pub stake_size: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_edge: default_min_edge(),
            min_liquidity: default_min_liquidity(),
            min_volume: default_min_volume(),
            confirmation_cycles: default_confirmation_cycles(),
            proximity_weight: default_proximity_weight(),
            placeholder_epsilon: default_placeholder_epsilon(),
            stake_size: default_stake_size(),
        }
    }
}

/// Stop-loss and early-resolution limits.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Max |forecast - bracket value| before a proximity stop fires.
    #[serde(default = "default_max_proximity")]
    pub max_proximity: f64,
    /// Recomputed signed edge below the negation of this closes the
    /// position.
    #[serde(default = "default_edge_flip_stop")]
    pub edge_flip_stop: f64,
    /// Stop-loss closures permitted per date before entries are blocked.
    #[serde(default = "default_max_stops_per_date")]
    pub max_stops_per_date: u32,
    /// Exact-bracket price at or above which a date counts as decided.
    #[serde(default = "default_decided_price_threshold")]
    pub decided_price_threshold: Decimal,
    #[serde(default = "default_decided_confirmation_cycles")]
    pub decided_confirmation_cycles: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_proximity: default_max_proximity(),
            edge_flip_stop: default_edge_flip_stop(),
            max_stops_per_date: default_max_stops_per_date(),
            decided_price_threshold: default_decided_price_threshold(),
            decided_confirmation_cycles: default_decided_confirmation_cycles(),
        }
    }
}

/// Wall-clock minute offsets per hour at which cycles run.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_minute_offsets")]
    pub minute_offsets: Vec<u32>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            minute_offsets: default_minute_offsets(),
        }
    }
}

/// File-based persistence locations.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn base_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }

    pub fn positions_path(&self) -> PathBuf {
        self.base_dir().join("positions.json")
    }

    pub fn daily_reports_path(&self) -> PathBuf {
        self.base_dir().join("daily_reports.jsonl")
    }

    pub fn settlement_log_path(&self) -> PathBuf {
        self.base_dir().join("settlement_log.jsonl")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.base_dir().join("audit_log.jsonl")
    }
}

/// Bounded exponential backoff for provider calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_tag() -> String {
    "weather".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_latitude() -> f64 {
    40.78
}

fn default_longitude() -> f64 {
    -73.97
}

fn default_metric() -> String {
    "temperature_2m_max".to_string()
}

fn default_min_edge() -> f64 {
    0.04
}

fn default_min_liquidity() -> Decimal {
    dec!(500)
}

fn default_min_volume() -> Decimal {
    dec!(250)
}

fn default_confirmation_cycles() -> u32 {
    3
}

fn default_proximity_weight() -> f64 {
    0.01
}

fn default_placeholder_epsilon() -> Decimal {
    dec!(0.005)
}

fn default_stake_size() -> Decimal {
    dec!(1)
}

fn default_max_proximity() -> f64 {
    2.5
}

fn default_edge_flip_stop() -> f64 {
    0.05
}

fn default_max_stops_per_date() -> u32 {
    2
}

fn default_decided_price_threshold() -> Decimal {
    dec!(0.95)
}

fn default_decided_confirmation_cycles() -> u32 {
    2
}

fn default_minute_offsets() -> Vec<u32> {
    vec![1, 11, 21, 31, 41, 51]
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    15_000
}
