//! The record of a single review run.

use crate::error::{ReviewErrorKind, WorkflowError};
use crate::models::{Decision, ReviewSnapshot, SkippedFile, WorkUnit};
use crate::notify::NotificationKind;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Stage of a review run.
///
/// `Created -> Dispatched -> Aggregating -> Decided -> Notified`, with
/// `Errored` reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Created,
    Dispatched,
    Aggregating,
    Decided,
    Notified,
    Errored,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Notified | Stage::Errored)
    }

    /// Whether `next` directly follows this stage.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        match (self, next) {
            (Stage::Created, Stage::Dispatched)
            | (Stage::Dispatched, Stage::Aggregating)
            | (Stage::Aggregating, Stage::Decided)
            | (Stage::Decided, Stage::Notified) => true,
            (current, Stage::Errored) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Created => write!(f, "CREATED"),
            Stage::Dispatched => write!(f, "DISPATCHED"),
            Stage::Aggregating => write!(f, "AGGREGATING"),
            Stage::Decided => write!(f, "DECIDED"),
            Stage::Notified => write!(f, "NOTIFIED"),
            Stage::Errored => write!(f, "ERRORED"),
        }
    }
}

/// When the run entered a stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageChange {
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Audit-log entry for a notification attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub kind: NotificationKind,
    pub at: DateTime<Utc>,
    pub outcome: DeliveryOutcome,
}

/// A problem recorded during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewIssue {
    pub kind: ReviewErrorKind,
    pub message: String,
}

/// State of one review, owned by the run that drives it.
///
/// All mutators fail once the stage is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewState {
    id: String,
    stage: Stage,
    created_at: DateTime<Utc>,
    history: Vec<StageChange>,
    #[serde(rename = "work_unit", serialize_with = "summarize_unit")]
    unit: Arc<WorkUnit>,
    snapshot: Option<Arc<ReviewSnapshot>>,
    decision: Option<Decision>,
    notifications: Vec<NotificationRecord>,
    issues: Vec<ReviewIssue>,
}

impl ReviewState {
    pub fn new(unit: Arc<WorkUnit>) -> Self {
        let created_at = Utc::now();
        Self {
            id: generate_review_id(created_at),
            stage: Stage::Created,
            created_at,
            history: vec![StageChange {
                stage: Stage::Created,
                at: created_at,
            }],
            unit,
            snapshot: None,
            decision: None,
            notifications: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn history(&self) -> &[StageChange] {
        &self.history
    }

    pub fn unit(&self) -> &Arc<WorkUnit> {
        &self.unit
    }

    pub fn snapshot(&self) -> Option<&Arc<ReviewSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    pub fn notifications(&self) -> &[NotificationRecord] {
        &self.notifications
    }

    pub fn issues(&self) -> &[ReviewIssue] {
        &self.issues
    }

    /// The fatal issue that sent the run to `Errored`, if any.
    pub fn error(&self) -> Option<&ReviewIssue> {
        self.issues.iter().find(|issue| issue.kind.is_fatal())
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to the next stage, rejecting skips, re-entry and leaving a terminal stage.
    pub fn advance(&mut self, next: Stage) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        if !self.stage.can_advance_to(next) {
            return Err(WorkflowError::IllegalTransition {
                from: self.stage,
                to: next,
            });
        }

        info!("Review {}: {} -> {}", self.id, self.stage, next);
        self.stage = next;
        self.history.push(StageChange {
            stage: next,
            at: Utc::now(),
        });
        Ok(())
    }

    pub fn set_snapshot(&mut self, snapshot: Arc<ReviewSnapshot>) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        self.snapshot = Some(snapshot);
        Ok(())
    }

    pub fn set_decision(&mut self, decision: Decision) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        self.decision = Some(decision);
        Ok(())
    }

    pub fn record_notification(
        &mut self,
        kind: NotificationKind,
        outcome: DeliveryOutcome,
    ) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        self.notifications.push(NotificationRecord {
            kind,
            at: Utc::now(),
            outcome,
        });
        Ok(())
    }

    pub fn record_issue(
        &mut self,
        kind: ReviewErrorKind,
        message: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        self.ensure_open()?;
        self.issues.push(ReviewIssue {
            kind,
            message: message.into(),
        });
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), WorkflowError> {
        if self.stage.is_terminal() {
            Err(WorkflowError::Terminal { stage: self.stage })
        } else {
            Ok(())
        }
    }
}

/// `REV-YYYYMMDD-XXXXXXXX`: the date plus 8 upper-case hex digits of a v4 UUID.
fn generate_review_id(at: DateTime<Utc>) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("REV-{}-{}", at.format("%Y%m%d"), uuid[..8].to_uppercase())
}

#[derive(Serialize)]
struct UnitSummary<'a> {
    repo: String,
    change: &'a str,
    files: Vec<&'a str>,
    total_lines: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped: Vec<&'a SkippedFile>,
}

fn summarize_unit<S: Serializer>(unit: &Arc<WorkUnit>, serializer: S) -> Result<S::Ok, S::Error> {
    UnitSummary {
        repo: unit.repo.to_string(),
        change: &unit.change.0,
        files: unit.files.iter().map(|f| f.path.as_str()).collect(),
        total_lines: unit.total_lines(),
        skipped: unit.skipped.iter().collect(),
    }
    .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoId, SkipReason, SourceFile};

    fn state() -> ReviewState {
        ReviewState::new(Arc::new(WorkUnit::new(
            RepoId::new("acme", "shop"),
            "12".into(),
            vec![SourceFile::new("app.py", "x = 1\n")],
        )))
    }

    #[test]
    fn test_review_id_format() {
        let state = state();
        let id = state.id();
        let parts: Vec<&str> = id.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "REV");
        assert_eq!(parts[1], state.created_at().format("%Y%m%d").to_string());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut state = state();
        for next in [
            Stage::Dispatched,
            Stage::Aggregating,
            Stage::Decided,
            Stage::Notified,
        ] {
            state.advance(next).unwrap();
        }

        let stages: Vec<Stage> = state.history().iter().map(|h| h.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::Created,
                Stage::Dispatched,
                Stage::Aggregating,
                Stage::Decided,
                Stage::Notified,
            ]
        );
        assert!(state.is_terminal());
    }

    #[test]
    fn test_skipping_is_rejected() {
        let mut state = state();
        assert_eq!(
            state.advance(Stage::Decided),
            Err(WorkflowError::IllegalTransition {
                from: Stage::Created,
                to: Stage::Decided,
            })
        );
        assert_eq!(state.stage(), Stage::Created);
    }

    #[test]
    fn test_reentering_is_rejected() {
        let mut state = state();
        state.advance(Stage::Dispatched).unwrap();
        assert!(state.advance(Stage::Dispatched).is_err());
        assert!(state.advance(Stage::Created).is_err());
    }

    #[test]
    fn test_errored_reachable_from_any_open_stage() {
        for stage in [
            Stage::Created,
            Stage::Dispatched,
            Stage::Aggregating,
            Stage::Decided,
        ] {
            assert!(stage.can_advance_to(Stage::Errored), "{}", stage);
        }
        assert!(!Stage::Notified.can_advance_to(Stage::Errored));
        assert!(!Stage::Errored.can_advance_to(Stage::Errored));
    }

    #[test]
    fn test_terminal_state_is_frozen() {
        let mut state = state();
        state
            .record_issue(ReviewErrorKind::InvalidInput, "no files")
            .unwrap();
        state.advance(Stage::Errored).unwrap();

        let terminal = Err(WorkflowError::Terminal {
            stage: Stage::Errored,
        });
        assert_eq!(state.advance(Stage::Dispatched), terminal);
        assert_eq!(
            state.record_notification(NotificationKind::Final, DeliveryOutcome::Delivered),
            terminal
        );
        assert_eq!(state.set_decision(Decision::error(vec![], None)), terminal);
        assert_eq!(
            state.error().map(|e| e.kind),
            Some(ReviewErrorKind::InvalidInput)
        );
    }

    #[test]
    fn test_serializes_unit_summary() {
        let json = serde_json::to_value(state()).unwrap();
        assert_eq!(json["stage"], "CREATED");
        assert_eq!(json["work_unit"]["repo"], "acme/shop");
        assert_eq!(json["work_unit"]["files"][0], "app.py");
        assert!(json["work_unit"].get("content").is_none());
        assert!(json["work_unit"].get("skipped").is_none());
    }

    #[test]
    fn test_serializes_skipped_files() {
        let unit = WorkUnit::new(
            RepoId::new("acme", "shop"),
            "12".into(),
            vec![SourceFile::new("app.py", "x = 1\n")],
        )
        .with_skipped(vec![SkippedFile::new(
            "vendor/huge.py",
            SkipReason::TooLarge {
                size: 4096,
                limit: 1024,
            },
        )]);
        let json = serde_json::to_value(ReviewState::new(Arc::new(unit))).unwrap();

        let skipped = &json["work_unit"]["skipped"][0];
        assert_eq!(skipped["path"], "vendor/huge.py");
        assert_eq!(skipped["reason"], "too_large");
        assert_eq!(skipped["size"], 4096);
    }
}
