//! Maps an aggregated snapshot onto a routing outcome.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. security failed, is missing, scores below `security_min`, or any
//!    analyzer reported a HIGH finding in a critical category:
//!    `CRITICAL_ESCALATION`
//! 2. quality, coverage or AI confidence below threshold: `HUMAN_REVIEW`
//! 3. documentation below threshold: `DOCUMENTATION_REVIEW`
//! 4. otherwise `APPROVE`
//!
//! A score that cannot be read (failed analyzer, missing entry, missing
//! key) counts as below every threshold it feeds.

use super::thresholds::{ScoreBinding, ScoreBindings, Thresholds};
use crate::error::ConfigError;
use crate::models::{AnalyzerResult, Decision, Finding, Outcome, ReviewSnapshot, Severity};
use std::sync::Arc;
use tracing::info;

/// HIGH findings in these categories escalate regardless of scores.
pub const CRITICAL_CATEGORIES: &[&str] = &["eval", "exec", "shell-injection", "unsafe-deserialization"];

/// How a threshold is named and printed in reasons.
struct Check {
    label: &'static str,
    unit: &'static str,
    precision: usize,
}

const SECURITY: Check = Check {
    label: "security score",
    unit: "",
    precision: 1,
};
const QUALITY: Check = Check {
    label: "quality score",
    unit: "",
    precision: 1,
};
const COVERAGE: Check = Check {
    label: "coverage",
    unit: "%",
    precision: 1,
};
const AI_CONFIDENCE: Check = Check {
    label: "AI confidence",
    unit: "",
    precision: 2,
};
const DOCUMENTATION: Check = Check {
    label: "documentation coverage",
    unit: "%",
    precision: 1,
};

impl Check {
    fn fmt(&self, value: f64) -> String {
        format!("{:.*}{}", self.precision, value, self.unit)
    }

    /// `Ok(passing reason)` or `Err(failing reason)`.
    fn evaluate(&self, score: &Result<f64, String>, min: f64) -> Result<String, String> {
        match score {
            Ok(value) if *value >= min => Ok(format!(
                "{} {} >= {}",
                self.label,
                self.fmt(*value),
                self.fmt(min)
            )),
            Ok(value) => Err(format!(
                "{} {} < {} required",
                self.label,
                self.fmt(*value),
                self.fmt(min)
            )),
            Err(why) => Err(format!(
                "{} unavailable ({}); {} required",
                self.label,
                why,
                self.fmt(min)
            )),
        }
    }
}

/// Pure decision function over a snapshot, configured once.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEngine {
    thresholds: Thresholds,
    bindings: ScoreBindings,
}

impl DecisionEngine {
    /// Engine with the default score bindings; the thresholds are range-checked.
    pub fn new(thresholds: Thresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        Ok(Self {
            thresholds,
            bindings: ScoreBindings::default(),
        })
    }

    pub fn with_bindings(mut self, bindings: ScoreBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn bindings(&self) -> &ScoreBindings {
        &self.bindings
    }

    pub fn decide(&self, snapshot: &Arc<ReviewSnapshot>) -> Decision {
        let (outcome, reasons) = self.evaluate(snapshot);
        info!("Decision: {} ({} reasons)", outcome, reasons.len());
        Decision::new(outcome, reasons, Arc::clone(snapshot))
    }

    fn evaluate(&self, snapshot: &ReviewSnapshot) -> (Outcome, Vec<String>) {
        let t = &self.thresholds;
        let b = &self.bindings;
        let mut passed = Vec::new();

        // Rule 1: security
        let security = read_score(snapshot, &b.security);
        let security_check = SECURITY.evaluate(&security, t.security_min);
        let mut critical = Vec::new();
        let security_below = match (&security_check, &security) {
            (Ok(line), _) => {
                passed.push(line.clone());
                false
            }
            (Err(_), Ok(value)) => {
                critical.push(format!(
                    "security score {:.1} < {:.1} required (gap {:.1})",
                    value,
                    t.security_min,
                    t.security_min - value
                ));
                true
            }
            (Err(line), Err(_)) => {
                critical.push(line.clone());
                false
            }
        };

        for (analyzer, finding) in snapshot.findings() {
            let from_security = security_below && analyzer == b.security.analyzer;
            if from_security || is_critical(finding) {
                critical.push(format!(
                    "{} {} [{}] at {} ({}): {}",
                    finding.severity.emoji(),
                    finding.severity,
                    finding.category,
                    finding.location,
                    analyzer,
                    finding.description
                ));
            }
        }

        if !critical.is_empty() {
            return (Outcome::CriticalEscalation, critical);
        }

        // Rule 2: quality, coverage, AI confidence
        let mut failed = Vec::new();
        for (check, binding, min) in [
            (&QUALITY, &b.quality, t.pylint_min),
            (&COVERAGE, &b.coverage, t.coverage_min_pct),
            (&AI_CONFIDENCE, &b.ai_review, t.ai_confidence_min),
        ] {
            match check.evaluate(&read_score(snapshot, binding), min) {
                Ok(line) => passed.push(line),
                Err(line) => failed.push(line),
            }
        }
        if !failed.is_empty() {
            return (Outcome::HumanReview, failed);
        }

        // Rule 3: documentation
        let documentation = read_score(snapshot, &b.documentation);
        match DOCUMENTATION.evaluate(&documentation, t.documentation_min_pct) {
            Ok(line) => passed.push(line),
            Err(line) => return (Outcome::DocumentationReview, vec![line]),
        }

        let mut reasons = vec!["all checks passed".to_string()];
        reasons.extend(passed);
        (Outcome::Approve, reasons)
    }
}

/// Decide with the default bindings.
pub fn decide(snapshot: &Arc<ReviewSnapshot>, thresholds: &Thresholds) -> Decision {
    DecisionEngine {
        thresholds: *thresholds,
        bindings: ScoreBindings::default(),
    }
    .decide(snapshot)
}

fn is_critical(finding: &Finding) -> bool {
    finding.severity == Severity::High && CRITICAL_CATEGORIES.contains(&finding.category.as_str())
}

/// The bound score, or why it cannot be read.
fn read_score(snapshot: &ReviewSnapshot, binding: &ScoreBinding) -> Result<f64, String> {
    match snapshot.get(&binding.analyzer) {
        None => Err(format!("no result from '{}'", binding.analyzer)),
        Some(AnalyzerResult::Failure { kind, message }) => {
            Err(format!("'{}' failed with {}: {}", binding.analyzer, kind, message))
        }
        Some(result) => result.score(&binding.score).ok_or_else(|| {
            format!(
                "'{}' reported no '{}' score",
                binding.analyzer, binding.score
            )
        }),
    }
}
