//! Concurrent fan-out of one work unit to every registered analyzer.
//!
//! [`Dispatcher::launch`] spawns one task per analyzer on a [`JoinSet`];
//! [`PendingDispatch::join`] is the single synchronization point that
//! collects them into a [`ReviewSnapshot`]. Every registered analyzer gets
//! exactly one entry, whatever happened to it: timeouts, panics and schema
//! violations all become `Failure` results.
//!
//! While the join runs, each collected result is published on a
//! `watch` channel so context-aware analyzers still running can read
//! their siblings' results without waiting on them.

use crate::analyzer::{AnalysisContext, AnalyzerRegistry, PartialResults};
use crate::models::{AnalyzerResult, FailureKind, ReviewSnapshot, WorkUnit};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Time budget for analyzers registered without their own timeout.
    pub default_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
        }
    }
}

/// Launches analyzers against a work unit.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Spawn one task per registered analyzer, all at once.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// handle without joining aborts every task.
    pub fn launch(&self, unit: Arc<WorkUnit>, registry: &AnalyzerRegistry) -> PendingDispatch {
        let (published, siblings) = watch::channel(PartialResults::new());
        let mut tasks = JoinSet::new();
        let mut slots = Vec::with_capacity(registry.len());

        info!(
            "Dispatching {} analyzers for {} ({} files)",
            registry.len(),
            unit.change,
            unit.files.len()
        );

        for (idx, entry) in registry.iter().enumerate() {
            let analyzer = Arc::clone(entry.analyzer());
            let schema = entry.schema().clone();
            let unit = Arc::clone(&unit);
            let name = entry.name().to_string();
            let timeout = entry.timeout().unwrap_or(self.config.default_timeout);
            let context = if analyzer.wants_context() {
                AnalysisContext::new(unit.prior_results.clone(), Some(siblings.clone()))
            } else {
                AnalysisContext::empty()
            };

            slots.push(Slot {
                name: name.clone(),
                blocking: entry.is_blocking(),
            });

            tasks.spawn(async move {
                let started = Instant::now();
                let run = AssertUnwindSafe(analyzer.analyze(&unit, &context)).catch_unwind();

                let result = match tokio::time::timeout(timeout, run).await {
                    Err(_) => AnalyzerResult::failure(
                        FailureKind::Timeout,
                        format!("no result within {}s", timeout.as_secs_f64()),
                    ),
                    Ok(Err(panic)) => AnalyzerResult::failure(
                        FailureKind::Internal,
                        format!("analyzer panicked: {}", panic_message(panic.as_ref())),
                    ),
                    Ok(Ok(result)) => match schema.check(&result) {
                        Ok(()) => result,
                        Err(violation) => {
                            AnalyzerResult::failure(FailureKind::InvalidOutput, violation)
                        }
                    },
                };

                debug!(
                    "Analyzer {} finished in {:?}: {}",
                    name,
                    started.elapsed(),
                    describe(&result)
                );
                (idx, result)
            });
        }

        PendingDispatch {
            slots,
            tasks,
            published,
        }
    }

    /// Launch and join in one step.
    pub async fn dispatch(&self, unit: Arc<WorkUnit>, registry: &AnalyzerRegistry) -> ReviewSnapshot {
        self.launch(unit, registry).join().await
    }
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    blocking: bool,
}

/// Analyzer tasks in flight for one work unit.
pub struct PendingDispatch {
    slots: Vec<Slot>,
    tasks: JoinSet<(usize, AnalyzerResult)>,
    published: watch::Sender<PartialResults>,
}

impl PendingDispatch {
    fn publish(&self, idx: usize, result: &AnalyzerResult) {
        let name = &self.slots[idx].name;
        self.published.send_modify(|published| {
            published.insert(name.clone(), result.clone());
        });
    }

    /// Number of launched analyzers.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wait for every blocking analyzer and assemble the snapshot.
    ///
    /// Non-blocking analyzers that have already finished when the last
    /// blocking one is collected keep their results; those still running
    /// are aborted and recorded as `Cancelled`. With no blocking analyzers
    /// at all, every task is awaited.
    pub async fn join(mut self) -> ReviewSnapshot {
        let mut results: Vec<Option<AnalyzerResult>> = vec![None; self.slots.len()];
        let mut blocking_left = self.slots.iter().filter(|s| s.blocking).count();
        let wait_for_all = blocking_left == 0;

        while wait_for_all || blocking_left > 0 {
            match self.tasks.join_next().await {
                Some(Ok((idx, result))) => {
                    if self.slots[idx].blocking {
                        blocking_left -= 1;
                    }
                    self.publish(idx, &result);
                    results[idx] = Some(result);
                }
                Some(Err(e)) => warn!("Analyzer task ended abnormally: {}", e),
                None => break,
            }
        }

        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok((idx, result)) => {
                    self.publish(idx, &result);
                    results[idx] = Some(result);
                }
                Err(e) => warn!("Analyzer task ended abnormally: {}", e),
            }
        }

        if !self.tasks.is_empty() {
            debug!("Cancelling {} non-blocking analyzers", self.tasks.len());
            self.tasks.shutdown().await;
        }

        let snapshot: ReviewSnapshot = self
            .slots
            .iter()
            .zip(results)
            .map(|(slot, result)| {
                let result = result.unwrap_or_else(|| {
                    if slot.blocking {
                        AnalyzerResult::failure(
                            FailureKind::Internal,
                            "analyzer task ended without a result",
                        )
                    } else {
                        AnalyzerResult::failure(
                            FailureKind::Cancelled,
                            "still running when blocking analyzers finished",
                        )
                    }
                });
                (slot.name.clone(), result)
            })
            .collect();

        info!(
            "Dispatch complete: {} succeeded, {} failed",
            snapshot.success_count(),
            snapshot.failure_count()
        );
        snapshot
    }
}

fn describe(result: &AnalyzerResult) -> String {
    match result {
        AnalyzerResult::Success { findings, .. } => format!("{} findings", findings.len()),
        AnalyzerResult::Failure { kind, message } => format!("{} ({})", kind, message),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
