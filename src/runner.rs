//! One decision cycle, end to end.
//!
//! Fetch observations, parse brackets and group them into date
//! ladders, fetch forecasts, then per date: validate the ladder, score
//! and confirm a candidate, and attempt a gated entry. After entries
//! come stop checks, early-resolution checks, and settlement of
//! officially resolved markets. A step that fails is logged and the
//! cycle continues with whatever data it has.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ForecastProvider, MarketProvider, RetryPolicy};
use crate::engine::{EntryDecision, PositionEngine};
use crate::error::Result;
use crate::parser::parse_bracket;
use crate::settlement::Settler;
use crate::strategy::{validate_ladder, CandidateRanker};
use crate::types::{ForecastPoint, Observation, ParsedBracket, Side};

/// Counters for the end-of-cycle summary line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub observations: usize,
    pub parsed: usize,
    pub dates: usize,
    pub entered: usize,
    pub stopped: usize,
    pub decided: usize,
    pub settled: usize,
}

/// Drives one decision cycle over the provider traits, the ranker, and
/// the position engine.
pub struct CycleRunner<M, F> {
    markets: M,
    forecasts: F,
    ranker: CandidateRanker,
    retry: RetryPolicy,
    engine: PositionEngine,
    settler: Settler,
    /// Forecast values seen last cycle; an unchanged refresh is not
    /// logged again.
    last_forecasts: HashMap<String, f64>,
}

impl<M, F> CycleRunner<M, F>
where
    M: MarketProvider,
    F: ForecastProvider,
{
    pub fn new(
        markets: M,
        forecasts: F,
        ranker: CandidateRanker,
        retry: RetryPolicy,
        engine: PositionEngine,
        settler: Settler,
    ) -> Self {
        Self {
            markets,
            forecasts,
            ranker,
            retry,
            engine,
            settler,
            last_forecasts: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &PositionEngine {
        &self.engine
    }

    /// Runs one full cycle. Only an empty-handed market fetch aborts;
    /// every later step degrades to a deferral.
    pub async fn run_cycle(&mut self) -> Result<CycleSummary> {
        let cycle_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut summary = CycleSummary::default();
        debug!(cycle_id = %cycle_id, "cycle start");

        let markets = &self.markets;
        let observations = self
            .retry
            .run("market fetch", || markets.fetch_observations())
            .await?;
        summary.observations = observations.len();

        // Official resolutions ride along with the observations; collect
        // them before parsing since settlement needs no bracket.
        let resolutions: Vec<(String, Side)> = observations
            .iter()
            .filter_map(|o| o.resolved_outcome.map(|side| (o.market_id.clone(), side)))
            .collect();

        let groups = group_by_date(&observations, &mut summary);
        summary.dates = groups.len();

        let forecasts = self.fetch_forecasts(&groups).await;

        for (date_key, group) in &groups {
            let rungs: Vec<(f64, Decimal)> = group
                .iter()
                .filter(|(o, _)| !o.closed)
                .filter_map(|(o, b)| o.yes_price().map(|p| (b.value, p)))
                .collect();
            if rungs.is_empty() {
                continue;
            }
            let ladder = validate_ladder(&rungs);

            let Some(forecast) = forecasts.get(date_key) else {
                debug!(date_key, "no forecast this cycle, scoring deferred");
                continue;
            };

            let candidates: Vec<_> = group
                .iter()
                .filter_map(|(o, b)| self.ranker.score_observation(o, b, forecast, now))
                .collect();
            let best = self.ranker.select_best(candidates);
            let streak = self
                .engine
                .record_candidate(date_key, best.as_ref(), now)
                .await;

            if let Some(candidate) = best {
                debug!(
                    date_key,
                    market_id = %candidate.market_id,
                    score = candidate.score,
                    streak = streak.count(),
                    "cycle candidate"
                );
                match self
                    .engine
                    .try_enter(&candidate, &ladder, &cycle_id, now)
                    .await
                {
                    EntryDecision::Entered(position) => {
                        info!(
                            market_id = %position.market_id,
                            date_key,
                            side = %position.side,
                            price = %position.entry_price(),
                            "position opened"
                        );
                        summary.entered += 1;
                    }
                    EntryDecision::Skipped(reason) => {
                        debug!(date_key, %reason, "entry skipped");
                    }
                }
            }
        }

        // Stop checks run against live books only; a closed market's
        // position belongs to settlement.
        let live: HashMap<String, Observation> = observations
            .iter()
            .filter(|o| !o.closed)
            .map(|o| (o.market_id.clone(), o.clone()))
            .collect();
        summary.stopped = self.engine.evaluate_stops(&live, &forecasts, now).await.len();

        for (date_key, group) in &groups {
            if let Some(report) = self.engine.check_early_resolution(date_key, group, now).await {
                info!(
                    date_key,
                    closed = report.closed_positions,
                    pnl = %report.total_pnl,
                    "date decided early"
                );
                summary.decided += 1;
            }
        }

        summary.settled = self
            .engine
            .apply_settlements(&mut self.settler, &resolutions, now)
            .await
            .len();

        info!(
            cycle_id = %cycle_id,
            observations = summary.observations,
            dates = summary.dates,
            entered = summary.entered,
            stopped = summary.stopped,
            decided = summary.decided,
            settled = summary.settled,
            open = self.engine.store().open_positions().len(),
            "cycle done"
        );
        Ok(summary)
    }

    /// Forecasts for every date with a ladder or an open position. A
    /// provider failure defers the dates it covers, nothing more.
    async fn fetch_forecasts(
        &mut self,
        groups: &BTreeMap<String, Vec<(Observation, ParsedBracket)>>,
    ) -> HashMap<String, ForecastPoint> {
        let mut dates: BTreeSet<String> = groups.keys().cloned().collect();
        for position in self.engine.store().open_positions() {
            dates.insert(position.date_key.clone());
        }
        if dates.is_empty() {
            return HashMap::new();
        }
        let date_keys: Vec<String> = dates.into_iter().collect();

        let forecasts = &self.forecasts;
        let points = match self
            .retry
            .run("forecast fetch", || forecasts.fetch(&date_keys))
            .await
        {
            Ok(points) => points,
            Err(e) => {
                warn!("forecast fetch failed, dates deferred: {}", e);
                Vec::new()
            }
        };
        for point in &points {
            let previous = self.last_forecasts.get(&point.date_key).copied();
            match previous {
                Some(previous) if previous == point.value => continue,
                Some(previous) => info!(
                    date_key = %point.date_key,
                    from = previous,
                    to = point.value,
                    "forecast changed"
                ),
                None => {
                    info!(date_key = %point.date_key, value = point.value, "forecast received")
                }
            }
            self.last_forecasts
                .insert(point.date_key.clone(), point.value);
        }
        points.into_iter().map(|p| (p.date_key.clone(), p)).collect()
    }
}

/// Parses each observation's question and groups the survivors into
/// per-date ladders. Unparsable questions are skipped for the cycle.
fn group_by_date(
    observations: &[Observation],
    summary: &mut CycleSummary,
) -> BTreeMap<String, Vec<(Observation, ParsedBracket)>> {
    let mut groups: BTreeMap<String, Vec<(Observation, ParsedBracket)>> = BTreeMap::new();
    for observation in observations {
        let Some(bracket) = parse_bracket(&observation.question) else {
            debug!(
                market_id = %observation.market_id,
                "question not parsable, market skipped"
            );
            continue;
        };
        summary.parsed += 1;
        groups
            .entry(observation.date_key())
            .or_default()
            .push((observation.clone(), bracket));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ForecastProvider, MarketProvider};
    use crate::config::{RetryConfig, RiskConfig, StorageConfig, StrategyConfig};
    use crate::engine::PositionEngine;
    use crate::error::Result;
    use async_trait::async_trait;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    const DATE_VALUE: f64 = 8.2;

    struct FakeMarkets {
        observations: Vec<Observation>,
    }

    #[async_trait]
    impl MarketProvider for FakeMarkets {
        async fn fetch_observations(&self) -> Result<Vec<Observation>> {
            Ok(self.observations.clone())
        }
    }

    struct FakeForecasts {
        points: Vec<ForecastPoint>,
    }

    #[async_trait]
    impl ForecastProvider for FakeForecasts {
        async fn fetch(&self, date_keys: &[String]) -> Result<Vec<ForecastPoint>> {
            Ok(self
                .points
                .iter()
                .filter(|p| date_keys.contains(&p.date_key))
                .cloned()
                .collect())
        }
    }

    fn observation(market_id: &str, question: &str, yes: Decimal) -> Observation {
        Observation {
            market_id: market_id.to_string(),
            question: question.to_string(),
            outcome_prices: vec![yes, Decimal::ONE - yes],
            end_date: Utc::now() + Duration::hours(4),
            volume: dec!(1000),
            liquidity: dec!(1000),
            closed: false,
            resolved_outcome: None,
        }
    }

    /// Three-rung ladder around a forecast of 8.2; the exact 8 bracket
    /// at 0.30 carries the dominant edge.
    fn ladder_markets() -> Vec<Observation> {
        vec![
            observation(
                "m-9up",
                "Will the high in NYC be 9°F or higher on March 3?",
                dec!(0.35),
            ),
            observation("m-8", "Will the high in NYC be 8°F on March 3?", dec!(0.30)),
            observation(
                "m-7dn",
                "Will the high in NYC be 7°F or lower on March 3?",
                dec!(0.30),
            ),
        ]
    }

    fn forecast_for(observations: &[Observation], value: f64) -> Vec<ForecastPoint> {
        observations
            .iter()
            .map(|o| ForecastPoint {
                date_key: o.date_key(),
                value,
            })
            .collect()
    }

    async fn runner(
        dir: &TempDir,
        observations: Vec<Observation>,
        points: Vec<ForecastPoint>,
    ) -> CycleRunner<FakeMarkets, FakeForecasts> {
        let storage = StorageConfig {
            data_dir: dir.path().to_string_lossy().to_string(),
        };
        let engine = PositionEngine::load(&storage, StrategyConfig::default(), RiskConfig::default())
            .await
            .unwrap();
        let settler = Settler::load(storage.settlement_log_path()).await.unwrap();
        CycleRunner::new(
            FakeMarkets { observations },
            FakeForecasts { points },
            CandidateRanker::new(StrategyConfig::default()),
            RetryPolicy::new(RetryConfig {
                max_attempts: 1,
                base_delay_ms: 1,
                max_delay_ms: 1,
            }),
            engine,
            settler,
        )
    }

    #[tokio::test]
    async fn entry_requires_three_confirming_cycles() {
        let dir = TempDir::new().unwrap();
        let markets = ladder_markets();
        let points = forecast_for(&markets, DATE_VALUE);
        let mut runner = runner(&dir, markets, points).await;

        for cycle in 1..=2 {
            let summary = runner.run_cycle().await.unwrap();
            assert_eq!(summary.entered, 0, "cycle {cycle}");
            assert!(runner.engine().store().open_positions().is_empty());
        }

        let summary = runner.run_cycle().await.unwrap();
        assert_eq!(summary.entered, 1);
        let open = runner.engine().store().open_positions();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].market_id, "m-8");
    }

    #[tokio::test]
    async fn missing_forecast_defers_without_clearing_streak() {
        let dir = TempDir::new().unwrap();
        let markets = ladder_markets();
        let points = forecast_for(&markets, DATE_VALUE);
        let date_key = markets[0].date_key();

        let mut with_forecast = runner(&dir, markets.clone(), points.clone()).await;
        with_forecast.run_cycle().await.unwrap();
        assert_eq!(
            with_forecast.engine().store().candidate_state[&date_key]
                .streak
                .count(),
            1
        );
        drop(with_forecast);

        // A cycle with no forecast leaves the streak untouched.
        let mut without = runner(&dir, markets.clone(), Vec::new()).await;
        let summary = without.run_cycle().await.unwrap();
        assert_eq!(summary.entered, 0);
        assert_eq!(
            without.engine().store().candidate_state[&date_key]
                .streak
                .count(),
            1
        );
        drop(without);

        let mut resumed = runner(&dir, markets, points).await;
        resumed.run_cycle().await.unwrap();
        let summary = resumed.run_cycle().await.unwrap();
        assert_eq!(summary.entered, 1);
    }

    #[tokio::test]
    async fn incoherent_ladder_never_admits_entries() {
        let dir = TempDir::new().unwrap();
        // Sum of 0.40 is far under the coherence floor.
        let markets = vec![
            observation(
                "m-9up",
                "Will the high in NYC be 9°F or higher on March 3?",
                dec!(0.10),
            ),
            observation("m-8", "Will the high in NYC be 8°F on March 3?", dec!(0.20)),
            observation(
                "m-7dn",
                "Will the high in NYC be 7°F or lower on March 3?",
                dec!(0.10),
            ),
        ];
        let points = forecast_for(&markets, DATE_VALUE);
        let mut runner = runner(&dir, markets, points).await;

        for _ in 0..4 {
            let summary = runner.run_cycle().await.unwrap();
            assert_eq!(summary.entered, 0);
        }
        assert!(runner.engine().store().open_positions().is_empty());
    }

    #[tokio::test]
    async fn near_certain_exact_bracket_decides_the_date() {
        let dir = TempDir::new().unwrap();
        let markets = vec![
            observation(
                "m-9up",
                "Will the high in NYC be 9°F or higher on March 3?",
                dec!(0.02),
            ),
            observation("m-8", "Will the high in NYC be 8°F on March 3?", dec!(0.96)),
            observation(
                "m-7dn",
                "Will the high in NYC be 7°F or lower on March 3?",
                dec!(0.02),
            ),
        ];
        let date_key = markets[0].date_key();
        let points = forecast_for(&markets, DATE_VALUE);
        let mut runner = runner(&dir, markets, points).await;

        let summary = runner.run_cycle().await.unwrap();
        assert_eq!(summary.decided, 0);
        assert!(!runner.engine().store().is_decided(&date_key));

        let summary = runner.run_cycle().await.unwrap();
        assert_eq!(summary.decided, 1);
        assert!(runner.engine().store().is_decided(&date_key));

        // Decided once; later cycles must not re-report.
        let summary = runner.run_cycle().await.unwrap();
        assert_eq!(summary.decided, 0);
    }

    #[tokio::test]
    async fn forecast_shift_stops_out_open_position() {
        let dir = TempDir::new().unwrap();
        let markets = ladder_markets();
        let date_key = markets[0].date_key();
        let points = forecast_for(&markets, DATE_VALUE);

        let mut entering = runner(&dir, markets.clone(), points).await;
        for _ in 0..3 {
            entering.run_cycle().await.unwrap();
        }
        assert_eq!(entering.engine().store().open_positions().len(), 1);
        drop(entering);

        // Forecast jumps far from the entered bracket of 8.
        let shifted = forecast_for(&markets, 14.0);
        let mut stopping = runner(&dir, markets, shifted).await;
        let summary = stopping.run_cycle().await.unwrap();
        assert_eq!(summary.stopped, 1);
        assert!(stopping.engine().store().open_positions().is_empty());
        assert_eq!(stopping.engine().store().stop_count(&date_key), 1);
    }

    #[tokio::test]
    async fn official_resolution_settles_open_position() {
        let dir = TempDir::new().unwrap();
        let markets = ladder_markets();
        let points = forecast_for(&markets, DATE_VALUE);

        let mut entering = runner(&dir, markets.clone(), points.clone()).await;
        for _ in 0..3 {
            entering.run_cycle().await.unwrap();
        }
        assert_eq!(entering.engine().store().open_positions().len(), 1);
        drop(entering);

        let mut resolved = markets;
        for observation in &mut resolved {
            if observation.market_id == "m-8" {
                observation.closed = true;
                observation.outcome_prices = vec![dec!(1), dec!(0)];
                observation.resolved_outcome = Some(Side::Yes);
            }
        }
        let mut settling = runner(&dir, resolved, points).await;
        let summary = settling.run_cycle().await.unwrap();
        assert_eq!(summary.settled, 1);

        let store = settling.engine().store();
        let position = &store.positions["m-8"];
        assert!(!position.open);
        // Yes entry at 0.30 resolving Yes pays 1 - 0.30.
        assert_eq!(position.realized_pnl, Some(dec!(0.70)));

        // Replaying the same resolution is a no-op.
        let summary = settling.run_cycle().await.unwrap();
        assert_eq!(summary.settled, 0);
    }
}
