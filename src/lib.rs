//! ReviewGate - concurrent multi-analyzer review gate.
//!
//! A change set is fanned out to a registry of independent analyzers
//! (security, quality, coverage, documentation and an AI reviewer), their
//! results are joined into one snapshot, and a threshold-based decision
//! engine routes the change to an outcome. Each run is tracked as a
//! [`workflow::ReviewState`] and reported through a [`notify::Notifier`].

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod decision;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod notify;
pub mod report;
pub mod scanner;
pub mod source;
pub mod workflow;

pub use analyzer::{Analyzer, AnalyzerRegistry};
pub use decision::{DecisionEngine, Thresholds};
pub use dispatch::Dispatcher;
pub use models::{AnalyzerResult, Decision, Outcome, ReviewSnapshot, WorkUnit};
pub use workflow::{ReviewState, ReviewWorkflow, Stage};
