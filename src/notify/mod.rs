//! Review notifications.
//!
//! The workflow calls a [`Notifier`] at fixed points of a run. Delivery
//! failures are recorded in the review's audit log and never stop the run.

use crate::error::NotifyError;
use crate::workflow::ReviewState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// When in the run a notification is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// Analyzers were dispatched.
    Started,
    /// The join returned a complete snapshot.
    AnalysisComplete,
    /// The AI reviewer produced a result.
    AiComplete,
    /// The run reached its decision, or errored.
    Final,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Started => write!(f, "STARTED"),
            NotificationKind::AnalysisComplete => write!(f, "ANALYSIS_COMPLETE"),
            NotificationKind::AiComplete => write!(f, "AI_COMPLETE"),
            NotificationKind::Final => write!(f, "FINAL"),
        }
    }
}

/// Delivers review updates to an external channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, kind: NotificationKind, state: &ReviewState) -> Result<(), NotifyError>;
}

/// Writes each notification as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, kind: NotificationKind, state: &ReviewState) -> Result<(), NotifyError> {
        let outcome = state
            .decision()
            .map(|d| d.outcome.to_string())
            .unwrap_or_else(|| "-".to_string());

        info!(
            review_id = %state.id(),
            stage = %state.stage(),
            repo = %state.unit().repo,
            change = %state.unit().change,
            outcome = %outcome,
            "notification {}",
            kind
        );
        Ok(())
    }
}
