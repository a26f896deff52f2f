//! Wall-clock cycle scheduling.
//!
//! Cycles run at fixed minute offsets within each hour, one at a time;
//! the next cycle is scheduled only after the previous one returns.
//! Shutdown stops future cycles without cancelling one in flight.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ScheduleConfig;
use crate::error::Result;

pub struct CycleScheduler {
    minute_offsets: Vec<u32>,
}

impl CycleScheduler {
    pub fn new(config: &ScheduleConfig) -> Self {
        let mut minute_offsets: Vec<u32> = config
            .minute_offsets
            .iter()
            .copied()
            .filter(|m| *m < 60)
            .collect();
        minute_offsets.sort_unstable();
        minute_offsets.dedup();
        if minute_offsets.is_empty() {
            minute_offsets = ScheduleConfig::default().minute_offsets;
        }
        Self { minute_offsets }
    }

    /// Seconds from `now` until the next configured minute offset,
    /// always strictly in the future.
    pub fn seconds_until_next(&self, now: DateTime<Utc>) -> u64 {
        let minute = now.minute();
        let second = now.second() as u64;
        let delta_minutes = match self.minute_offsets.iter().copied().find(|m| *m > minute) {
            Some(next) => (next - minute) as u64,
            None => (60 - minute + self.minute_offsets[0]) as u64,
        };
        delta_minutes * 60 - second
    }

    /// Runs `cycle` at each scheduled offset until `shutdown_rx` fires.
    /// A failed cycle is logged at the boundary; the schedule proceeds.
    pub async fn run<F, Fut>(&self, mut shutdown_rx: watch::Receiver<bool>, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!("scheduler running at minute offsets {:?}", self.minute_offsets);
        loop {
            let wait = self.seconds_until_next(Utc::now());
            debug!("next cycle in {}s", wait);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(wait)) => {}
                _ = shutdown_rx.changed() => {
                    info!("shutdown requested, no further cycles");
                    return;
                }
            }

            if let Err(e) = cycle().await {
                error!("cycle failed: {}", e);
            }

            // A shutdown during the cycle takes effect here; the cycle
            // itself is never cancelled.
            if *shutdown_rx.borrow() {
                info!("shutdown requested, no further cycles");
                return;
            }
        }
    }
}
