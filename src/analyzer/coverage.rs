//! Test coverage via `pytest --cov`.

use super::outline::{definitions, is_test_file};
use super::workspace::{materialize, unit_path};
use super::{AnalysisContext, Analyzer};
use crate::models::{
    AnalyzerResult, FailureKind, Finding, Location, ScoreSchema, Severity, WorkUnit,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use tokio::process::Command;
use tracing::{debug, info};

const REPORT_FILE: &str = "coverage.json";

/// Files below this coverage get a finding of their own.
const LOW_FILE_COVERAGE_PCT: f64 = 50.0;

/// Source files below this coverage list the definitions still needing tests.
pub const NEEDS_TESTS_BELOW_PCT: f64 = 80.0;

/// Runs the change set's tests under coverage; registered as `coverage`.
#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    name: String,
    python: String,
}

impl Default for CoverageAnalyzer {
    fn default() -> Self {
        Self::new("python")
    }
}

impl CoverageAnalyzer {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            name: "coverage".to_string(),
            python: python.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Per-file and total coverage read from a coverage.py JSON report.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageReport {
    pub total_pct: f64,
    pub files: Vec<(String, f64)>,
}

/// Parse coverage.py's `--cov-report=json` output.
pub fn parse_report(json: &str) -> Result<CoverageReport, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| e.to_string())?;

    let total_pct = value["totals"]["percent_covered"]
        .as_f64()
        .ok_or_else(|| "report has no totals.percent_covered".to_string())?;

    let mut files: Vec<(String, f64)> = value["files"]
        .as_object()
        .map(|files| {
            files
                .iter()
                .filter_map(|(path, data)| {
                    data["summary"]["percent_covered"]
                        .as_f64()
                        .map(|pct| (path.clone(), pct))
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(CoverageReport { total_pct, files })
}

fn findings_for(unit: &WorkUnit, report: &CoverageReport) -> Vec<Finding> {
    report
        .files
        .iter()
        .filter(|(_, pct)| *pct < LOW_FILE_COVERAGE_PCT)
        .filter_map(|(path, pct)| {
            let path = unit_path(unit, path)?;
            Some(Finding::new(
                Severity::Medium,
                "low-coverage",
                Location::file(path),
                format!("Only {:.1}% of lines are covered by tests", pct),
            ))
        })
        .collect()
}

/// Public functions and classes of under-covered source files.
///
/// A file missing from the report counts as 0% covered. Test modules and
/// names starting with `_` are skipped.
fn missing_tests(unit: &WorkUnit, report: &CoverageReport) -> Vec<Finding> {
    let covered: HashMap<String, f64> = report
        .files
        .iter()
        .filter_map(|(path, pct)| Some((unit_path(unit, path)?, *pct)))
        .collect();

    unit.files
        .iter()
        .filter(|f| f.path.ends_with(".py") && !is_test_file(&f.path))
        .filter_map(|file| {
            let pct = covered.get(&file.path).copied().unwrap_or(0.0);
            if pct >= NEEDS_TESTS_BELOW_PCT {
                return None;
            }

            let names: Vec<String> = definitions(&file.content)
                .into_iter()
                .filter(|d| !d.name.starts_with('_'))
                .map(|d| d.name)
                .collect();
            if names.is_empty() {
                return None;
            }

            Some(Finding::new(
                Severity::Low,
                "missing-tests",
                Location::file(file.path.clone()),
                format!("{:.1}% covered; needs tests for {}", pct, names.join(", ")),
            ))
        })
        .collect()
}

#[async_trait]
impl Analyzer for CoverageAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new().with("coverage_pct", 0.0, 100.0)
    }

    async fn analyze(&self, unit: &WorkUnit, _context: &AnalysisContext) -> AnalyzerResult {
        let (dir, _) = match materialize(unit) {
            Ok(materialized) => materialized,
            Err(e) => {
                return AnalyzerResult::failure(
                    FailureKind::Internal,
                    format!("failed to prepare workspace: {}", e),
                )
            }
        };

        info!("Running pytest with coverage on {} files", unit.files.len());
        let output = Command::new(&self.python)
            .args(["-m", "pytest", "-q", "--cov=."])
            .arg(format!("--cov-report=json:{}", REPORT_FILE))
            .current_dir(dir.path())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return AnalyzerResult::failure(
                    FailureKind::Unavailable,
                    format!("{} is not installed", self.python),
                )
            }
            Err(e) => {
                return AnalyzerResult::failure(
                    FailureKind::Internal,
                    format!("failed to run pytest: {}", e),
                )
            }
        };

        // Failing tests still produce a report; only a missing report is fatal.
        let report_path = dir.path().join(REPORT_FILE);
        let json = match tokio::fs::read_to_string(&report_path).await {
            Ok(json) => json,
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return AnalyzerResult::failure(
                    FailureKind::Unavailable,
                    format!("pytest produced no coverage report: {}", stderr.trim()),
                );
            }
        };

        match parse_report(&json) {
            Ok(report) => {
                debug!("coverage {:.1}% over {} files", report.total_pct, report.files.len());
                let mut findings = findings_for(unit, &report);
                findings.extend(missing_tests(unit, &report));
                AnalyzerResult::success([("coverage_pct", report.total_pct)], findings)
            }
            Err(e) => AnalyzerResult::failure(
                FailureKind::InvalidOutput,
                format!("unreadable coverage report: {}", e),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoId, SourceFile};

    const REPORT: &str = r#"{
        "meta": {"version": "7.4.0"},
        "files": {
            "orders.py": {"summary": {"percent_covered": 92.5}},
            "legacy/util.py": {"summary": {"percent_covered": 12.0}},
            "test_orders.py": {"summary": {"percent_covered": 100.0}}
        },
        "totals": {"percent_covered": 81.25}
    }"#;

    #[test]
    fn test_parse_report() {
        let report = parse_report(REPORT).unwrap();
        assert_eq!(report.total_pct, 81.25);
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.files[0], ("legacy/util.py".to_string(), 12.0));
    }

    #[test]
    fn test_parse_report_requires_totals() {
        assert!(parse_report(r#"{"files": {}}"#).is_err());
        assert!(parse_report("not json").is_err());
    }

    #[test]
    fn test_low_coverage_findings() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("orders.py", ""),
                SourceFile::new("legacy/util.py", ""),
            ],
        );
        let findings = findings_for(&unit, &parse_report(REPORT).unwrap());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location, Location::file("legacy/util.py"));
        assert_eq!(findings[0].category, "low-coverage");
    }

    #[test]
    fn test_missing_tests_lists_public_definitions() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("orders.py", "def total():\n    pass\n"),
                SourceFile::new(
                    "legacy/util.py",
                    "class Cache:\n    def get(self):\n        pass\n    def _evict(self):\n        pass\n\ndef _private():\n    pass\n",
                ),
                SourceFile::new("new_module.py", "def fresh():\n    pass\n"),
                SourceFile::new("test_orders.py", "def test_total():\n    pass\n"),
                SourceFile::new("constants.py", "LIMIT = 3\n"),
            ],
        );
        let findings = missing_tests(&unit, &parse_report(REPORT).unwrap());

        let described: Vec<_> = findings
            .iter()
            .map(|f| (f.location.path.as_str(), f.description.as_str()))
            .collect();
        assert_eq!(
            described,
            vec![
                ("legacy/util.py", "12.0% covered; needs tests for Cache, get"),
                ("new_module.py", "0.0% covered; needs tests for fresh"),
            ]
        );
        assert!(findings.iter().all(|f| f.category == "missing-tests"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_unavailable() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![SourceFile::new("app.py", "x = 1\n")],
        );
        let result = CoverageAnalyzer::new("reviewgate-no-such-python")
            .analyze(&unit, &AnalysisContext::empty())
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Unavailable));
    }
}
