//! Decision loop: rank, check balances, open hedged positions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::detector::{best_opportunity, diagnose_no_opportunity, Opportunity};
use crate::config::Config;
use crate::market::{Symbol, TradablePairs};
use crate::metrics;
use crate::pricebook::PriceBook;
use crate::trading::{OrderExecutor, Position, PositionManager};

/// Engine parameters.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Asset funding the spot leg.
    pub quote_asset: String,
    /// Base asset used when exchange metadata has none.
    pub fallback_base_asset: String,
    /// Wait between cycles that did not trade.
    pub decision_interval: Duration,
    /// Wait after a trade attempt or balance shortfall.
    pub cooldown: Duration,
}

impl EngineSettings {
    /// Settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            quote_asset: config.quote_asset.to_uppercase(),
            fallback_base_asset: config.base_asset.to_uppercase(),
            decision_interval: config.decision_interval(),
            cooldown: config.cooldown(),
        }
    }
}

/// What one decision cycle did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No symbol had positive potential profit.
    NoOpportunity,
    /// The best symbol already holds a position.
    AlreadyOpen {
        /// The symbol.
        symbol: Symbol,
    },
    /// A balance was unavailable or too small; no orders placed.
    InsufficientBalance {
        /// The symbol that would have been traded.
        symbol: Symbol,
        /// Asset that fell short.
        asset: String,
        /// Amount needed.
        required: Decimal,
        /// Amount available, `None` if the balance could not be fetched.
        available: Option<Decimal>,
    },
    /// Both legs filled and the position was recorded.
    Opened {
        /// The new position.
        position: Position,
    },
    /// At least one leg failed; nothing recorded.
    OpenFailed {
        /// The symbol.
        symbol: Symbol,
        /// Whether the spot buy went through.
        spot_filled: bool,
        /// Whether the futures sell went through.
        futures_filled: bool,
    },
}

impl CycleOutcome {
    /// Whether the loop should wait out the cooldown before the next cycle.
    pub fn needs_cooldown(&self) -> bool {
        matches!(
            self,
            CycleOutcome::InsufficientBalance { .. }
                | CycleOutcome::Opened { .. }
                | CycleOutcome::OpenFailed { .. }
        )
    }
}

/// Decision loop counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    cycles: AtomicU64,
    opportunities: AtomicU64,
    positions_opened: AtomicU64,
    open_failures: AtomicU64,
    balance_shortfalls: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStatsSnapshot {
    /// Cycles run.
    pub cycles: u64,
    /// Cycles that found an opportunity.
    pub opportunities: u64,
    /// Positions opened.
    pub positions_opened: u64,
    /// Opens with at least one failed leg.
    pub open_failures: u64,
    /// Cycles stopped by a balance check.
    pub balance_shortfalls: u64,
}

impl EngineStats {
    /// Copy the counters.
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            opportunities: self.opportunities.load(Ordering::Relaxed),
            positions_opened: self.positions_opened.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            balance_shortfalls: self.balance_shortfalls.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &CycleOutcome) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            CycleOutcome::NoOpportunity => return,
            CycleOutcome::AlreadyOpen { .. } => None,
            CycleOutcome::InsufficientBalance { .. } => Some(&self.balance_shortfalls),
            CycleOutcome::Opened { .. } => Some(&self.positions_opened),
            CycleOutcome::OpenFailed { .. } => Some(&self.open_failures),
        };
        self.opportunities.fetch_add(1, Ordering::Relaxed);
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Opens hedged positions on the best opportunity.
#[derive(Debug)]
pub struct ArbitrageEngine {
    book: Arc<PriceBook>,
    positions: Arc<PositionManager>,
    executor: OrderExecutor,
    pairs: TradablePairs,
    settings: EngineSettings,
    stats: Arc<EngineStats>,
}

impl ArbitrageEngine {
    /// Create an engine.
    pub fn new(
        book: Arc<PriceBook>,
        positions: Arc<PositionManager>,
        executor: OrderExecutor,
        pairs: TradablePairs,
        settings: EngineSettings,
    ) -> Self {
        Self {
            book,
            positions,
            executor,
            pairs,
            settings,
            stats: Arc::new(EngineStats::default()),
        }
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Base asset of a symbol, falling back to the configured one.
    pub fn base_asset_for(&self, symbol: &Symbol) -> &str {
        self.pairs
            .base_asset(symbol.as_str())
            .unwrap_or(self.settings.fallback_base_asset.as_str())
    }

    /// Run one decision cycle.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let outcome = self.decide().await;
        self.stats.record(&outcome);
        outcome
    }

    /// Best opportunity among symbols without an open position.
    ///
    /// `Err` carries the best held symbol when every profitable symbol is held.
    fn select(&self) -> Result<Option<Opportunity>, Symbol> {
        let snapshot = self.book.snapshot();
        let free = snapshot
            .iter()
            .filter(|(symbol, _)| !self.positions.is_open(symbol.as_str()));

        match best_opportunity(free) {
            Some(opp) => Ok(Some(opp)),
            None => match best_opportunity(&snapshot) {
                Some(held) => Err(held.symbol),
                None => Ok(None),
            },
        }
    }

    async fn decide(&self) -> CycleOutcome {
        let opp = match self.select() {
            Ok(Some(opp)) => opp,
            Ok(None) => {
                debug!(diagnosis = %diagnose_no_opportunity(&self.book), "No arbitrage opportunity");
                return CycleOutcome::NoOpportunity;
            }
            Err(symbol) => {
                debug!(symbol = %symbol, "Every profitable symbol already holds a position");
                return CycleOutcome::AlreadyOpen { symbol };
            }
        };

        metrics::inc_opportunities_detected();
        info!(
            symbol = %opp.symbol,
            spot = %opp.spot,
            futures = %opp.futures,
            spread = %opp.spread,
            profit = %opp.potential_profit,
            "Arbitrage opportunity detected"
        );

        let quote_asset = self.settings.quote_asset.as_str();
        let quote_balance = match self.executor.get_balance(quote_asset).await {
            Some(balance) if balance >= opp.spot && opp.spot > Decimal::ZERO => balance,
            available => {
                return self.shortfall(&opp, quote_asset, opp.spot, available);
            }
        };

        let Some(quantity) = quote_balance.checked_div(opp.spot) else {
            return self.shortfall(&opp, quote_asset, opp.spot, Some(quote_balance));
        };

        let base_asset = self.base_asset_for(&opp.symbol).to_string();
        match self.executor.get_balance(&base_asset).await {
            Some(balance) if balance >= quantity => {}
            available => {
                return self.shortfall(&opp, &base_asset, quantity, available);
            }
        }

        self.open(opp, quantity).await
    }

    fn shortfall(
        &self,
        opp: &Opportunity,
        asset: &str,
        required: Decimal,
        available: Option<Decimal>,
    ) -> CycleOutcome {
        warn!(
            symbol = %opp.symbol,
            asset,
            required = %required,
            available = ?available,
            "Insufficient balance"
        );
        CycleOutcome::InsufficientBalance {
            symbol: opp.symbol.clone(),
            asset: asset.to_string(),
            required,
            available,
        }
    }

    async fn open(&self, opp: Opportunity, quantity: Decimal) -> CycleOutcome {
        info!(symbol = %opp.symbol, quantity = %quantity, "Opening hedged position");

        let legs = self.executor.open_legs(&opp.symbol, quantity).await;
        info!(
            symbol = %opp.symbol,
            spot_order = ?legs.spot.as_ref().map(|o| &o.order_id),
            futures_order = ?legs.futures.as_ref().map(|o| &o.order_id),
            "Open legs completed"
        );

        if !legs.both_ok() {
            if legs.is_partial() {
                error!(
                    symbol = %opp.symbol,
                    spot_filled = legs.spot.is_ok(),
                    futures_filled = legs.futures.is_ok(),
                    "One leg failed, position is unhedged"
                );
            } else {
                error!(symbol = %opp.symbol, "Both open legs failed");
            }
            return CycleOutcome::OpenFailed {
                symbol: opp.symbol,
                spot_filled: legs.spot.is_ok(),
                futures_filled: legs.futures.is_ok(),
            };
        }

        match self.positions.open(&opp.symbol, quantity, opp.spot, opp.futures) {
            Ok(position) => CycleOutcome::Opened { position },
            Err(e) => {
                error!(symbol = %opp.symbol, error = %e, "Legs filled but position not recorded");
                CycleOutcome::OpenFailed {
                    symbol: opp.symbol,
                    spot_filled: true,
                    futures_filled: true,
                }
            }
        }
    }

    /// Run cycles until the task is dropped.
    pub async fn run(self) {
        info!(
            quote_asset = %self.settings.quote_asset,
            interval_s = self.settings.decision_interval.as_secs(),
            cooldown_s = self.settings.cooldown.as_secs(),
            "Arbitrage engine started"
        );

        loop {
            let outcome = self.run_cycle().await;
            let wait = if outcome.needs_cooldown() {
                self.settings.cooldown
            } else {
                self.settings.decision_interval
            };
            tokio::time::sleep(wait).await;
        }
    }
}
