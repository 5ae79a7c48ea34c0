//! Canned analyzers for tests and demos.

use super::{AnalysisContext, Analyzer};
use crate::models::{AnalyzerResult, FailureKind, ScoreSchema, WorkUnit};
use async_trait::async_trait;
use std::time::Duration;

/// Returns a fixed result, optionally after a delay, or panics on demand.
#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    name: String,
    schema: ScoreSchema,
    result: AnalyzerResult,
    delay: Option<Duration>,
    panic_message: Option<String>,
}

impl StaticAnalyzer {
    pub fn new(name: impl Into<String>, schema: ScoreSchema, result: AnalyzerResult) -> Self {
        Self {
            name: name.into(),
            schema,
            result,
            delay: None,
            panic_message: None,
        }
    }

    /// One score key with range `[0, max]`, reporting `value`.
    pub fn scored(name: impl Into<String>, key: &str, max: f64, value: f64) -> Self {
        Self::new(
            name,
            ScoreSchema::new().with(key, 0.0, max),
            AnalyzerResult::success([(key, value)], vec![]),
        )
    }

    pub fn failing(name: impl Into<String>, kind: FailureKind, message: &str) -> Self {
        Self::new(
            name,
            ScoreSchema::new(),
            AnalyzerResult::failure(kind, message),
        )
    }

    /// An analyzer that panics when invoked.
    pub fn panicking(name: impl Into<String>, message: &str) -> Self {
        let mut analyzer = Self::failing(name, FailureKind::Internal, "unreachable");
        analyzer.panic_message = Some(message.to_string());
        analyzer
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the returned result; the schema is left as is.
    pub fn with_result(mut self, result: AnalyzerResult) -> Self {
        self.result = result;
        self
    }
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        self.schema.clone()
    }

    async fn analyze(&self, _unit: &WorkUnit, _context: &AnalysisContext) -> AnalyzerResult {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.panic_message {
            panic!("{}", message);
        }
        self.result.clone()
    }
}

/// Context-aware analyzer that reports how many other results it could see.
///
/// Reads the context once after `delay`, reporting the count under
/// `visible_results`.
#[derive(Debug, Clone)]
pub struct ContextProbe {
    name: String,
    delay: Duration,
}

impl ContextProbe {
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }
}

#[async_trait]
impl Analyzer for ContextProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new().with("visible_results", 0.0, 10_000.0)
    }

    fn wants_context(&self) -> bool {
        true
    }

    async fn analyze(&self, _unit: &WorkUnit, context: &AnalysisContext) -> AnalyzerResult {
        tokio::time::sleep(self.delay).await;
        let visible = context.results().len() as f64;
        AnalyzerResult::success([("visible_results", visible)], vec![])
    }
}
