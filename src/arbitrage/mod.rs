//! Arbitrage module for detecting and acting on spot/futures spreads.
//!
//! This module handles:
//! - Spread and fee-adjusted profit calculations
//! - Opportunity ranking across symbols
//! - The decision loop that opens hedged positions

pub mod calculator;
pub mod detector;
pub mod engine;

pub use calculator::{spread, FeeSchedule, SpreadBreakdown};
pub use detector::{best_opportunity, diagnose_no_opportunity, rank, Opportunity};
pub use engine::{ArbitrageEngine, CycleOutcome, EngineSettings, EngineStats, EngineStatsSnapshot};
