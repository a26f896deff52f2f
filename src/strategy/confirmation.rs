//! Consecutive-cycle confirmation counter.
//!
//! The same gating pattern shows up in candidate confirmation and in
//! early-resolution detection: a condition must hold for N consecutive
//! cycles before it is acted on. `Streak` is that counter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    count: u32,
}

impl Streak {
    pub fn new() -> Self {
        Self::default()
    }

    /// One more consecutive qualifying cycle.
    pub fn advance(&mut self) {
        self.count = self.count.saturating_add(1);
    }

    /// The tracked condition changed identity: start over at 1.
    pub fn restart(&mut self) {
        self.count = 1;
    }

    /// The condition failed to hold: back to 0.
    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn reached(&self, required: u32) -> bool {
        self.count >= required
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
