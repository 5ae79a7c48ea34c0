//! Drives one review from work unit to decision.

use super::state::{DeliveryOutcome, ReviewState, Stage};
use crate::analyzer::AnalyzerRegistry;
use crate::decision::DecisionEngine;
use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::error::{NotifyError, ReviewErrorKind, WorkflowError};
use crate::models::{AnalyzerResult, ChangeId, Decision, RepoId, ReviewSnapshot, WorkUnit};
use crate::notify::{NotificationKind, Notifier};
use crate::source::ChangeSetProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default bound on a single notification delivery.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// A configured review pipeline: analyzers, decision rules and a notifier.
///
/// The analyzers, thresholds and bindings are fixed at construction;
/// every call to [`run`](Self::run) is an independent review.
pub struct ReviewWorkflow {
    registry: AnalyzerRegistry,
    engine: DecisionEngine,
    notifier: Arc<dyn Notifier>,
    dispatcher: Dispatcher,
    notify_timeout: Duration,
}

impl ReviewWorkflow {
    /// Fails when a score binding names an unregistered analyzer or an
    /// undeclared score key.
    pub fn new(
        registry: AnalyzerRegistry,
        engine: DecisionEngine,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, WorkflowError> {
        engine.bindings().validate(&registry)?;

        Ok(Self {
            registry,
            engine,
            notifier,
            dispatcher: Dispatcher::default(),
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
        })
    }

    pub fn with_dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatcher = Dispatcher::new(config);
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AnalyzerRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Fetch a change set and review it. A fetch failure ends the review
    /// in `Errored` with `INVALID_INPUT`.
    pub async fn review_change(
        &self,
        provider: &dyn ChangeSetProvider,
        repo: &RepoId,
        change: &ChangeId,
    ) -> Result<ReviewState, WorkflowError> {
        match provider.fetch_change_set(repo, change).await {
            Ok(unit) => self.run(unit).await,
            Err(e) => {
                let placeholder = WorkUnit::new(repo.clone(), change.clone(), Vec::new());
                let state = ReviewState::new(Arc::new(placeholder));
                self.fail(
                    state,
                    ReviewErrorKind::InvalidInput,
                    vec![format!("could not acquire change set: {}", e)],
                    None,
                )
                .await
            }
        }
    }

    /// Review one work unit and return its terminal state.
    ///
    /// Review failures (invalid input, every analyzer failing) end in an
    /// `Errored` state, not an `Err`; `Err` means the driver itself broke
    /// a stage rule.
    pub async fn run(&self, unit: WorkUnit) -> Result<ReviewState, WorkflowError> {
        let unit = Arc::new(unit);
        let mut state = ReviewState::new(Arc::clone(&unit));
        info!(
            "Review {} started for {} change {} ({} files)",
            state.id(),
            unit.repo,
            unit.change,
            unit.files.len()
        );

        if let Err(e) = unit.validate() {
            return self
                .fail(
                    state,
                    ReviewErrorKind::InvalidInput,
                    vec![format!("invalid work unit: {}", e)],
                    None,
                )
                .await;
        }

        state.advance(Stage::Dispatched)?;
        let pending = self.dispatcher.launch(Arc::clone(&unit), &self.registry);
        self.notify(&mut state, NotificationKind::Started).await?;

        state.advance(Stage::Aggregating)?;
        let snapshot = Arc::new(pending.join().await);
        state.set_snapshot(Arc::clone(&snapshot))?;

        for entry in snapshot.entries() {
            if let AnalyzerResult::Failure { kind, message } = &entry.result {
                warn!("Analyzer {} failed: {} ({})", entry.analyzer, kind, message);
                state.record_issue(
                    ReviewErrorKind::AnalyzerFailure,
                    format!("{}: {} ({})", entry.analyzer, kind, message),
                )?;
            }
        }

        if snapshot.all_failed() {
            let reasons = failure_reasons(&snapshot);
            return self
                .fail(
                    state,
                    ReviewErrorKind::TotalDispatchFailure,
                    reasons,
                    Some(snapshot),
                )
                .await;
        }

        self.notify(&mut state, NotificationKind::AnalysisComplete)
            .await?;
        let ai_analyzer = &self.engine.bindings().ai_review.analyzer;
        if snapshot
            .get(ai_analyzer)
            .is_some_and(AnalyzerResult::is_success)
        {
            self.notify(&mut state, NotificationKind::AiComplete).await?;
        }

        let decision = self.engine.decide(&snapshot);
        state.set_decision(decision)?;
        state.advance(Stage::Decided)?;

        self.notify(&mut state, NotificationKind::Final).await?;
        state.advance(Stage::Notified)?;

        info!(
            "Review {} finished: {}",
            state.id(),
            state
                .decision()
                .map(|d| d.outcome.to_string())
                .unwrap_or_default()
        );
        Ok(state)
    }

    /// Attach an `ERROR` decision, send the final notification, then close
    /// the state as `Errored`.
    async fn fail(
        &self,
        mut state: ReviewState,
        kind: ReviewErrorKind,
        reasons: Vec<String>,
        snapshot: Option<Arc<ReviewSnapshot>>,
    ) -> Result<ReviewState, WorkflowError> {
        error!("Review {} failed ({}): {}", state.id(), kind, reasons.join("; "));

        state.record_issue(kind, reasons.join("; "))?;
        state.set_decision(Decision::error(reasons, snapshot))?;
        self.notify(&mut state, NotificationKind::Final).await?;
        state.advance(Stage::Errored)?;
        Ok(state)
    }

    /// Deliver within the notify timeout and log the attempt. Delivery
    /// problems are recorded, never returned.
    async fn notify(
        &self,
        state: &mut ReviewState,
        kind: NotificationKind,
    ) -> Result<(), WorkflowError> {
        let delivery = tokio::time::timeout(
            self.notify_timeout,
            self.notifier.deliver(kind, &*state),
        )
        .await;

        let outcome = match delivery {
            Ok(Ok(())) => DeliveryOutcome::Delivered,
            Ok(Err(e)) => DeliveryOutcome::Failed {
                reason: e.to_string(),
            },
            Err(_) => DeliveryOutcome::Failed {
                reason: NotifyError::Timeout(self.notify_timeout.as_secs()).to_string(),
            },
        };

        if let DeliveryOutcome::Failed { reason } = &outcome {
            warn!("{} notification for {} failed: {}", kind, state.id(), reason);
            state.record_issue(
                ReviewErrorKind::NotificationFailure,
                format!("{} notification: {}", kind, reason),
            )?;
        }

        state.record_notification(kind, outcome)
    }
}

fn failure_reasons(snapshot: &ReviewSnapshot) -> Vec<String> {
    let mut reasons = vec!["every analyzer failed".to_string()];
    reasons.extend(snapshot.entries().iter().filter_map(|entry| {
        match &entry.result {
            AnalyzerResult::Failure { kind, message } => {
                Some(format!("{}: {} ({})", entry.analyzer, kind, message))
            }
            AnalyzerResult::Success { .. } => None,
        }
    }));
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::StaticAnalyzer;
    use crate::decision::Thresholds;
    use crate::error::SourceError;
    use crate::models::{FailureKind, Outcome, SourceFile};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the kind and the stage seen at each delivery.
    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(NotificationKind, Stage)>>,
    }

    impl RecordingNotifier {
        fn seen(&self) -> Vec<(NotificationKind, Stage)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, kind: NotificationKind, state: &ReviewState) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push((kind, state.stage()));
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn deliver(&self, _kind: NotificationKind, _state: &ReviewState) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".to_string()))
        }
    }

    struct HangingNotifier;

    #[async_trait]
    impl Notifier for HangingNotifier {
        async fn deliver(&self, _kind: NotificationKind, _state: &ReviewState) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct FixedProvider(Result<Vec<SourceFile>, String>);

    #[async_trait]
    impl ChangeSetProvider for FixedProvider {
        async fn fetch_change_set(&self, repo: &RepoId, change: &ChangeId) -> Result<WorkUnit, SourceError> {
            match &self.0 {
                Ok(files) => Ok(WorkUnit::new(repo.clone(), change.clone(), files.clone())),
                Err(e) => Err(SourceError::NotFound(e.clone())),
            }
        }
    }

    fn registry(scores: [f64; 5]) -> AnalyzerRegistry {
        let [security, quality, coverage, ai, docs] = scores;
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, security))
            .unwrap()
            .register(StaticAnalyzer::scored("quality", "score", 10.0, quality))
            .unwrap()
            .register(StaticAnalyzer::scored("coverage", "coverage_pct", 100.0, coverage))
            .unwrap()
            .register(StaticAnalyzer::scored("ai_review", "confidence", 1.0, ai))
            .unwrap()
            .register(StaticAnalyzer::scored(
                "documentation",
                "documentation_pct",
                100.0,
                docs,
            ))
            .unwrap();
        registry
    }

    fn workflow(registry: AnalyzerRegistry, notifier: Arc<dyn Notifier>) -> ReviewWorkflow {
        ReviewWorkflow::new(
            registry,
            DecisionEngine::new(Thresholds::default()).unwrap(),
            notifier,
        )
        .unwrap()
    }

    fn unit() -> WorkUnit {
        WorkUnit::new(
            RepoId::new("acme", "shop"),
            "42".into(),
            vec![SourceFile::new("orders.py", "def total():\n    return 1\n")],
        )
    }

    #[tokio::test]
    async fn test_approved_review_walks_every_stage() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = workflow(registry([9.0, 8.5, 85.0, 0.9, 75.0]), notifier.clone())
            .run(unit())
            .await
            .unwrap();

        assert_eq!(state.stage(), Stage::Notified);
        assert_eq!(state.decision().unwrap().outcome, Outcome::Approve);
        assert_eq!(state.snapshot().unwrap().len(), 5);
        assert!(state.issues().is_empty());

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

        assert_eq!(
            notifier.seen(),
            vec![
                (NotificationKind::Started, Stage::Dispatched),
                (NotificationKind::AnalysisComplete, Stage::Aggregating),
                (NotificationKind::AiComplete, Stage::Aggregating),
                (NotificationKind::Final, Stage::Decided),
            ]
        );
        assert!(state.notifications().iter().all(|n| n.outcome.is_delivered()));
    }

    #[tokio::test]
    async fn test_low_quality_routes_to_human_review() {
        let state = workflow(
            registry([9.0, 6.0, 85.0, 0.9, 75.0]),
            Arc::new(RecordingNotifier::default()),
        )
        .run(unit())
        .await
        .unwrap();

        let decision = state.decision().unwrap();
        assert_eq!(decision.outcome, Outcome::HumanReview);
        assert!(decision.reasons[0].contains("6.0 < 7.0"));
    }

    #[tokio::test]
    async fn test_empty_work_unit_is_invalid_input() {
        let notifier = Arc::new(RecordingNotifier::default());
        let empty = WorkUnit::new(RepoId::new("acme", "shop"), "42".into(), vec![]);
        let state = workflow(registry([9.0; 5]), notifier.clone())
            .run(empty)
            .await
            .unwrap();

        assert_eq!(state.stage(), Stage::Errored);
        assert_eq!(state.error().unwrap().kind, ReviewErrorKind::InvalidInput);
        assert!(state.snapshot().is_none());

        let decision = state.decision().unwrap();
        assert_eq!(decision.outcome, Outcome::Error);
        assert!(decision.snapshot.is_none());
        assert!(decision.reasons[0].contains("no files"));

        assert_eq!(notifier.seen(), vec![(NotificationKind::Final, Stage::Created)]);
    }

    #[tokio::test]
    async fn test_total_dispatch_failure_errors() {
        let mut registry = AnalyzerRegistry::new();
        for (name, key, max) in [
            ("security", "score", 10.0),
            ("quality", "score", 10.0),
            ("coverage", "coverage_pct", 100.0),
            ("ai_review", "confidence", 1.0),
            ("documentation", "documentation_pct", 100.0),
        ] {
            registry
                .register(
                    StaticAnalyzer::scored(name, key, max, 1.0).with_result(
                        AnalyzerResult::failure(FailureKind::Unavailable, "offline"),
                    ),
                )
                .unwrap();
        }

        let notifier = Arc::new(RecordingNotifier::default());
        let state = workflow(registry, notifier.clone()).run(unit()).await.unwrap();

        assert_eq!(state.stage(), Stage::Errored);
        assert_eq!(
            state.error().unwrap().kind,
            ReviewErrorKind::TotalDispatchFailure
        );
        let decision = state.decision().unwrap();
        assert_eq!(decision.outcome, Outcome::Error);
        assert_eq!(decision.reasons.len(), 6);
        assert!(decision.snapshot.is_some());
        assert_eq!(
            state
                .issues()
                .iter()
                .filter(|i| i.kind == ReviewErrorKind::AnalyzerFailure)
                .count(),
            5
        );
        assert_eq!(
            notifier.seen(),
            vec![
                (NotificationKind::Started, Stage::Dispatched),
                (NotificationKind::Final, Stage::Aggregating),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_ai_review_skips_ai_notification() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, 9.0))
            .unwrap()
            .register(StaticAnalyzer::scored("quality", "score", 10.0, 9.0))
            .unwrap()
            .register(StaticAnalyzer::scored("coverage", "coverage_pct", 100.0, 90.0))
            .unwrap()
            .register(
                StaticAnalyzer::scored("ai_review", "confidence", 1.0, 0.9).with_result(
                    AnalyzerResult::failure(FailureKind::Timeout, "model too slow"),
                ),
            )
            .unwrap()
            .register(StaticAnalyzer::scored(
                "documentation",
                "documentation_pct",
                100.0,
                90.0,
            ))
            .unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let state = workflow(registry, notifier.clone()).run(unit()).await.unwrap();

        assert_eq!(state.stage(), Stage::Notified);
        assert_eq!(state.decision().unwrap().outcome, Outcome::HumanReview);
        assert!(!notifier
            .seen()
            .iter()
            .any(|(kind, _)| *kind == NotificationKind::AiComplete));
        assert_eq!(state.issues().len(), 1);
        assert_eq!(state.issues()[0].kind, ReviewErrorKind::AnalyzerFailure);
    }

    #[tokio::test]
    async fn test_notification_failures_never_abort() {
        let state = workflow(registry([9.0, 8.5, 85.0, 0.9, 75.0]), Arc::new(FailingNotifier))
            .run(unit())
            .await
            .unwrap();

        assert_eq!(state.stage(), Stage::Notified);
        assert_eq!(state.decision().unwrap().outcome, Outcome::Approve);
        assert_eq!(state.notifications().len(), 4);
        assert!(state
            .notifications()
            .iter()
            .all(|n| !n.outcome.is_delivered()));
        assert!(state
            .issues()
            .iter()
            .all(|i| i.kind == ReviewErrorKind::NotificationFailure));
        assert!(state.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_notifier_times_out() {
        let state = workflow(registry([9.0, 8.5, 85.0, 0.9, 75.0]), Arc::new(HangingNotifier))
            .with_notify_timeout(Duration::from_secs(2))
            .run(unit())
            .await
            .unwrap();

        assert_eq!(state.stage(), Stage::Notified);
        match &state.notifications()[0].outcome {
            DeliveryOutcome::Failed { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected a failed delivery, got {:?}", other),
        }
    }

    #[test]
    fn test_unbound_analyzer_rejected_at_construction() {
        let mut registry = AnalyzerRegistry::new();
        registry
            .register(StaticAnalyzer::scored("security", "score", 10.0, 9.0))
            .unwrap();

        let result = ReviewWorkflow::new(
            registry,
            DecisionEngine::new(Thresholds::default()).unwrap(),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(matches!(
            result.err(),
            Some(WorkflowError::UnboundAnalyzer { .. })
        ));
    }

    #[tokio::test]
    async fn test_review_change_fetches_work_unit() {
        let provider = FixedProvider(Ok(vec![SourceFile::new("app.py", "x = 1\n")]));
        let state = workflow(
            registry([9.0, 8.5, 85.0, 0.9, 75.0]),
            Arc::new(RecordingNotifier::default()),
        )
        .review_change(&provider, &RepoId::new("acme", "shop"), &"7".into())
        .await
        .unwrap();

        assert_eq!(state.stage(), Stage::Notified);
        assert_eq!(state.unit().change, ChangeId::from("7"));
    }

    #[tokio::test]
    async fn test_unreachable_change_set_is_invalid_input() {
        let provider = FixedProvider(Err("/nope".to_string()));
        let state = workflow(
            registry([9.0, 8.5, 85.0, 0.9, 75.0]),
            Arc::new(RecordingNotifier::default()),
        )
        .review_change(&provider, &RepoId::new("acme", "shop"), &"7".into())
        .await
        .unwrap();

        assert_eq!(state.stage(), Stage::Errored);
        assert_eq!(state.error().unwrap().kind, ReviewErrorKind::InvalidInput);
        assert!(state.decision().unwrap().reasons[0].contains("could not acquire change set"));
    }
}
