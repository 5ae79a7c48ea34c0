//! Threshold-based routing of review snapshots.

pub mod engine;
pub mod thresholds;

pub use engine::{decide, DecisionEngine, CRITICAL_CATEGORIES};
pub use thresholds::{ScoreBinding, ScoreBindings, Thresholds};
