//! Bracket-Ladder Prediction Market Bot
//!
//! A Rust-based decision engine for date-bound, bracketed prediction
//! markets: an observed ladder of sibling brackets per calendar date is
//! priced against a numeric forecast, and positions are carried from
//! gated entry through stops, early resolution, or official settlement.
//!
//! ## Architecture
//!
//! ```text
//! Markets/Forecast (HTTP) → Parser → Model → Strategy (rank + confirm)
//!                                               ↓
//!                         Ladder Validator → Position Engine → Settlement
//!                                               ↓
//!                              Persistence (positions, audit, reports)
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod runner;
pub mod scheduler;
pub mod settlement;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod types_tests;
