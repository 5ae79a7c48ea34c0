//! Pattern-based security scanner.
//!
//! Each rule is a case-insensitive regular expression. Every match becomes
//! a finding and costs the file 2.0 / 1.0 / 0.5 points for HIGH / MEDIUM /
//! LOW. The analyzer reports the worst file's score.

use super::{AnalysisContext, Analyzer};
use crate::models::{AnalyzerResult, Finding, Location, ScoreSchema, Severity, SourceFile, WorkUnit};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Perfect score for a file without findings.
pub const MAX_SECURITY_SCORE: f64 = 10.0;

const BUILTIN_RULES: &[(&str, Severity, &str, &str)] = &[
    (r"\beval\s*\(", Severity::High, "eval", "Use of eval() - code injection risk"),
    (r"\bexec\s*\(", Severity::High, "exec", "Use of exec() - code execution risk"),
    (
        r"subprocess.*shell\s*=\s*True",
        Severity::High,
        "shell-injection",
        "Shell injection vulnerability",
    ),
    (
        r"pickle\.loads?\s*\(",
        Severity::Medium,
        "unsafe-deserialization",
        "Unsafe deserialization with pickle",
    ),
    (r"\binput\s*\(.*\)", Severity::Low, "user-input", "Unvalidated user input"),
    (
        r#"open\s*\([^)]*['"]w['"]"#,
        Severity::Medium,
        "file-write",
        "File write operation",
    ),
    (
        r"requests\..*verify\s*=\s*False",
        Severity::Medium,
        "tls-verification",
        "SSL verification disabled",
    ),
    (
        r#"password\s*=\s*['"][^'"]+['"]"#,
        Severity::High,
        "hardcoded-secret",
        "Hardcoded password",
    ),
    (
        r#"api_key\s*=\s*['"][^'"]+['"]"#,
        Severity::High,
        "hardcoded-secret",
        "Hardcoded API key",
    ),
];

#[derive(Debug, Clone)]
struct SecurityRule {
    pattern: Regex,
    severity: Severity,
    category: String,
    description: String,
}

/// Regex-driven security analyzer, registered as `security` by default.
#[derive(Debug, Clone)]
pub struct PatternSecurityAnalyzer {
    name: String,
    rules: Vec<SecurityRule>,
}

impl Default for PatternSecurityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternSecurityAnalyzer {
    /// Analyzer with the built-in rule set.
    pub fn new() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(
                |(pattern, severity, category, description)| match compile(pattern) {
                    Ok(pattern) => Some(SecurityRule {
                        pattern,
                        severity: *severity,
                        category: category.to_string(),
                        description: description.to_string(),
                    }),
                    Err(e) => {
                        warn!("Skipping security rule {}: {}", category, e);
                        None
                    }
                },
            )
            .collect();

        Self {
            name: "security".to_string(),
            rules,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a custom rule.
    pub fn with_rule(
        mut self,
        pattern: &str,
        severity: Severity,
        category: &str,
        description: &str,
    ) -> Result<Self, regex::Error> {
        self.rules.push(SecurityRule {
            pattern: compile(pattern)?,
            severity,
            category: category.to_string(),
            description: description.to_string(),
        });
        Ok(self)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Scan one file, returning its score and findings in line order.
    pub fn scan_file(&self, file: &SourceFile) -> (f64, Vec<Finding>) {
        let mut findings = Vec::new();
        let mut score = MAX_SECURITY_SCORE;

        for rule in &self.rules {
            for m in rule.pattern.find_iter(&file.content) {
                let line = file.content[..m.start()].matches('\n').count() + 1;
                findings.push(Finding::new(
                    rule.severity,
                    rule.category.clone(),
                    Location::line(file.path.clone(), line),
                    format!("{} (`{}`)", rule.description, m.as_str().trim()),
                ));
                score -= penalty(rule.severity);
            }
        }

        findings.sort_by_key(|f| f.location.line);
        (score.max(0.0), findings)
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn penalty(severity: Severity) -> f64 {
    match severity {
        Severity::High => 2.0,
        Severity::Medium => 1.0,
        Severity::Low => 0.5,
    }
}

#[async_trait]
impl Analyzer for PatternSecurityAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new().with("score", 0.0, MAX_SECURITY_SCORE)
    }

    async fn analyze(&self, unit: &WorkUnit, _context: &AnalysisContext) -> AnalyzerResult {
        let mut worst = MAX_SECURITY_SCORE;
        let mut findings = Vec::new();

        for file in &unit.files {
            let (score, file_findings) = self.scan_file(file);
            debug!(
                "Security scan {}: score {:.1}, {} findings",
                file.path,
                score,
                file_findings.len()
            );
            worst = worst.min(score);
            findings.extend(file_findings);
        }

        AnalyzerResult::success([("score", worst)], findings)
    }
}
