//! The analyzer contract and the built-in analyzers.
//!
//! An analyzer takes a [`WorkUnit`] and returns exactly one
//! [`AnalyzerResult`]. Analyzers run concurrently against the same unit,
//! never mutate it, and report problems as `Failure` results rather than
//! panicking; the dispatcher converts panics and timeouts on their behalf.

pub mod coverage;
pub mod documentation;
pub mod ollama;
pub mod outline;
pub mod pylint;
pub mod registry;
pub mod security;
pub mod stub;
mod workspace;

pub use coverage::CoverageAnalyzer;
pub use documentation::DocumentationAnalyzer;
pub use ollama::{OllamaConfig, OllamaReviewAnalyzer};
pub use pylint::PylintAnalyzer;
pub use registry::{AnalyzerRegistry, RegisteredAnalyzer, RegistrationOptions};
pub use security::PatternSecurityAnalyzer;
pub use stub::{ContextProbe, StaticAnalyzer};

use crate::models::{AnalyzerResult, ScoreSchema, WorkUnit};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::watch;

/// Results keyed by analyzer name.
pub type PartialResults = BTreeMap<String, AnalyzerResult>;

/// A pluggable unit of analysis.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Unique name; the snapshot key for this analyzer's result.
    fn name(&self) -> &str;

    /// The score keys (and their ranges) this analyzer reports.
    fn schema(&self) -> ScoreSchema;

    /// Whether the analyzer wants other analyzers' results as advisory input.
    fn wants_context(&self) -> bool {
        false
    }

    async fn analyze(&self, unit: &WorkUnit, context: &AnalysisContext) -> AnalyzerResult;
}

/// Best-effort view of results from earlier stages and sibling analyzers.
///
/// Reading never blocks: `results()` returns whatever has been published
/// so far, which may be nothing.
#[derive(Clone, Default)]
pub struct AnalysisContext {
    prior: PartialResults,
    siblings: Option<watch::Receiver<PartialResults>>,
}

impl AnalysisContext {
    /// A context with nothing in it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(prior: PartialResults, siblings: Option<watch::Receiver<PartialResults>>) -> Self {
        Self { prior, siblings }
    }

    /// Prior-stage results overlaid with sibling results published so far.
    pub fn results(&self) -> PartialResults {
        let mut merged = self.prior.clone();
        if let Some(siblings) = &self.siblings {
            for (name, result) in siblings.borrow().iter() {
                merged.insert(name.clone(), result.clone());
            }
        }
        merged
    }

    pub fn get(&self, analyzer: &str) -> Option<AnalyzerResult> {
        if let Some(siblings) = &self.siblings {
            if let Some(result) = siblings.borrow().get(analyzer) {
                return Some(result.clone());
            }
        }
        self.prior.get(analyzer).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
            && self
                .siblings
                .as_ref()
                .map_or(true, |siblings| siblings.borrow().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FailureKind;

    #[test]
    fn test_empty_context() {
        let context = AnalysisContext::empty();
        assert!(context.is_empty());
        assert!(context.results().is_empty());
        assert!(context.get("security").is_none());
    }

    #[test]
    fn test_siblings_override_prior_results() {
        let mut prior = PartialResults::new();
        prior.insert(
            "security".to_string(),
            AnalyzerResult::failure(FailureKind::Timeout, "old run"),
        );
        prior.insert(
            "quality".to_string(),
            AnalyzerResult::success([("score", 7.0)], vec![]),
        );

        let (tx, rx) = watch::channel(PartialResults::new());
        let context = AnalysisContext::new(prior, Some(rx));
        assert_eq!(context.results().len(), 2);

        tx.send_modify(|published| {
            published.insert(
                "security".to_string(),
                AnalyzerResult::success([("score", 9.0)], vec![]),
            );
        });

        assert_eq!(
            context.get("security").and_then(|r| r.score("score")),
            Some(9.0)
        );
        assert_eq!(context.results().len(), 2);
        assert!(!context.is_empty());
    }
}
