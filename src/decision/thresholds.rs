//! Decision thresholds and the analyzer scores that feed them.

use crate::analyzer::AnalyzerRegistry;
use crate::error::{ConfigError, WorkflowError};
use serde::{Deserialize, Serialize};

/// Minimum scores a change must reach to be approved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum quality score (pylint scale, 0-10).
    #[serde(default = "default_pylint_min")]
    pub pylint_min: f64,

    /// Minimum test coverage percentage.
    #[serde(default = "default_coverage_min_pct")]
    pub coverage_min_pct: f64,

    /// Minimum AI reviewer confidence (0-1).
    #[serde(default = "default_ai_confidence_min")]
    pub ai_confidence_min: f64,

    /// Minimum security score (0-10).
    #[serde(default = "default_security_min")]
    pub security_min: f64,

    /// Minimum documentation coverage percentage.
    #[serde(default = "default_documentation_min_pct")]
    pub documentation_min_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pylint_min: default_pylint_min(),
            coverage_min_pct: default_coverage_min_pct(),
            ai_confidence_min: default_ai_confidence_min(),
            security_min: default_security_min(),
            documentation_min_pct: default_documentation_min_pct(),
        }
    }
}

fn default_pylint_min() -> f64 {
    7.0
}

fn default_coverage_min_pct() -> f64 {
    80.0
}

fn default_ai_confidence_min() -> f64 {
    0.8
}

fn default_security_min() -> f64 {
    7.0
}

fn default_documentation_min_pct() -> f64 {
    70.0
}

impl Thresholds {
    /// Check every threshold against the range of the score it is compared with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("pylint_min", self.pylint_min, 0.0, 10.0)?;
        check_range("coverage_min_pct", self.coverage_min_pct, 0.0, 100.0)?;
        check_range("ai_confidence_min", self.ai_confidence_min, 0.0, 1.0)?;
        check_range("security_min", self.security_min, 0.0, 10.0)?;
        check_range("documentation_min_pct", self.documentation_min_pct, 0.0, 100.0)?;
        Ok(())
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

/// Which analyzer score a threshold reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBinding {
    pub analyzer: String,
    pub score: String,
}

impl ScoreBinding {
    pub fn new(analyzer: impl Into<String>, score: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            score: score.into(),
        }
    }
}

/// One binding per threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBindings {
    pub security: ScoreBinding,
    pub quality: ScoreBinding,
    pub coverage: ScoreBinding,
    pub ai_review: ScoreBinding,
    pub documentation: ScoreBinding,
}

impl Default for ScoreBindings {
    fn default() -> Self {
        Self {
            security: ScoreBinding::new("security", "score"),
            quality: ScoreBinding::new("quality", "score"),
            coverage: ScoreBinding::new("coverage", "coverage_pct"),
            ai_review: ScoreBinding::new("ai_review", "confidence"),
            documentation: ScoreBinding::new("documentation", "documentation_pct"),
        }
    }
}

impl ScoreBindings {
    /// Bindings paired with the threshold they feed.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ScoreBinding)> {
        [
            ("security_min", &self.security),
            ("pylint_min", &self.quality),
            ("coverage_min_pct", &self.coverage),
            ("ai_confidence_min", &self.ai_review),
            ("documentation_min_pct", &self.documentation),
        ]
        .into_iter()
    }

    /// Every binding must name a registered analyzer and a score key it declares.
    pub fn validate(&self, registry: &AnalyzerRegistry) -> Result<(), WorkflowError> {
        for (threshold, binding) in self.iter() {
            let entry = registry.get(&binding.analyzer).ok_or_else(|| {
                WorkflowError::UnboundAnalyzer {
                    threshold,
                    analyzer: binding.analyzer.clone(),
                }
            })?;

            if entry.schema().get(&binding.score).is_none() {
                return Err(WorkflowError::UndeclaredScore {
                    threshold,
                    analyzer: binding.analyzer.clone(),
                    key: binding.score.clone(),
                });
            }
        }
        Ok(())
    }
}
