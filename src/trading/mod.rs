//! Trading module for order management and execution.
//!
//! This module handles:
//! - Order types and creation
//! - Order placement with bounded retries
//! - Hedged position tracking and exits

pub mod execution;
pub mod order;
pub mod position;

pub use execution::{LegResults, OrderExecutor, RetryPolicy};
pub use order::{Order, OrderRequest, OrderStatus, OrderType, Side};
pub use position::{
    evaluate_trigger, ClosedPosition, Position, PositionManager, PositionState, Trigger,
    TriggerThresholds,
};
