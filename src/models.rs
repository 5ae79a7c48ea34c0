//! Data models for the review gate.
//!
//! This module contains the core data structures that flow through a
//! review: the work unit under review, analyzer results and findings,
//! the aggregated snapshot and the final decision.

use crate::error::{InputError, SchemaError, SourceError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Style issues, minor suggestions
    Low,
    /// Code quality issues, potential bugs
    Medium,
    /// Bugs, security concerns
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

impl Severity {
    /// Returns an emoji representation of the severity.
    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Low => "🟢",
            Severity::Medium => "🟡",
            Severity::High => "🔴",
        }
    }
}

impl From<&str> for Severity {
    /// Lenient parse used for tool and model output; unknown levels map to `Low`.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "high" | "critical" | "error" | "fatal" => Severity::High,
            "medium" | "warning" | "moderate" => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Where a finding was reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Path relative to the change set root.
    pub path: String,
    /// 1-indexed line, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Location {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line: None,
        }
    }

    pub fn line(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.path, line),
            None => write!(f, "{}", self.path),
        }
    }
}

/// A single issue reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Free-form tag such as `eval` or `missing-docstring`.
    pub category: String,
    pub location: Location,
    pub description: String,
}

impl Finding {
    pub fn new(
        severity: Severity,
        category: impl Into<String>,
        location: Location,
        description: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category: category.into(),
            location,
            description: description.into(),
        }
    }
}

/// Identity of the repository a change belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `https://github.com/owner/repo(.git)` or plain `owner/repo`.
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let trimmed = input.trim().trim_end_matches('/');
        let path = match trimmed.find("://") {
            Some(idx) => {
                let after_scheme = &trimmed[idx + 3..];
                match after_scheme.find('/') {
                    Some(slash) => &after_scheme[slash + 1..],
                    None => return Err(SourceError::InvalidRepoId(input.to_string())),
                }
            }
            None => trimmed,
        };

        let mut parts = path.split('/').filter(|p| !p.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) => {
                let name = name.strip_suffix(".git").unwrap_or(name);
                if name.is_empty() {
                    return Err(SourceError::InvalidRepoId(input.to_string()));
                }
                Ok(Self::new(owner, name))
            }
            _ => Err(SourceError::InvalidRepoId(input.to_string())),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Newtype for a change identifier (PR number, commit SHA, local label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(pub String);

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChangeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One file of the change set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// The path with `.`, `..` and root components dropped, `/`-separated.
    /// This is where the file lands in an analyzer's scratch directory.
    pub fn normalized_path(&self) -> String {
        Path::new(&self.path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Why a file in the change set was left out of the review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    TooLarge { size: u64, limit: u64 },
    OverFileLimit { limit: usize },
    Unreadable { error: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, limit } => {
                write!(f, "too large ({} bytes, limit {})", size, limit)
            }
            Self::OverFileLimit { limit } => write!(f, "over the {}-file limit", limit),
            Self::Unreadable { error } => write!(f, "unreadable: {}", error),
        }
    }
}

/// A file the source saw but did not hand to the analyzers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedFile {
    pub fn new(path: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            path: path.into(),
            reason,
        }
    }
}

/// Immutable description of what is being reviewed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkUnit {
    pub repo: RepoId,
    pub change: ChangeId,
    pub files: Vec<SourceFile>,
    /// Files left out by the source, so the report can say what was not reviewed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
    /// Results from an earlier stage, offered to context-aware analyzers.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub prior_results: BTreeMap<String, AnalyzerResult>,
}

impl WorkUnit {
    pub fn new(repo: RepoId, change: ChangeId, files: Vec<SourceFile>) -> Self {
        Self {
            repo,
            change,
            files,
            skipped: Vec::new(),
            prior_results: BTreeMap::new(),
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedFile>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn with_prior_results(mut self, prior: BTreeMap<String, AnalyzerResult>) -> Self {
        self.prior_results = prior;
        self
    }

    /// Check that the unit can be reviewed: at least one file, and
    /// non-empty paths that stay unique once normalized.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.files.is_empty() {
            return Err(InputError::EmptyFileSet);
        }

        let mut seen = HashSet::new();
        for (index, file) in self.files.iter().enumerate() {
            let normalized = file.normalized_path();
            if file.path.trim().is_empty() || normalized.is_empty() {
                return Err(InputError::EmptyPath { index });
            }
            if !seen.insert(normalized) {
                return Err(InputError::DuplicatePath {
                    path: file.path.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn total_lines(&self) -> usize {
        self.files.iter().map(SourceFile::line_count).sum()
    }
}

/// Why an analyzer did not produce scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Panic or unexpected fault caught at the dispatch boundary.
    Internal,
    /// No result within the analyzer's time budget.
    Timeout,
    /// A collaborator (tool, service) could not be reached.
    Unavailable,
    /// The result did not match the analyzer's declared schema.
    InvalidOutput,
    /// Non-blocking analyzer still running when the join completed.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Internal => write!(f, "INTERNAL"),
            FailureKind::Timeout => write!(f, "TIMEOUT"),
            FailureKind::Unavailable => write!(f, "UNAVAILABLE"),
            FailureKind::InvalidOutput => write!(f, "INVALID_OUTPUT"),
            FailureKind::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// The single terminal result of one analyzer for one work unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyzerResult {
    Success {
        scores: BTreeMap<String, f64>,
        findings: Vec<Finding>,
    },
    Failure {
        kind: FailureKind,
        message: String,
    },
}

impl AnalyzerResult {
    pub fn success<K, I>(scores: I, findings: Vec<Finding>) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, f64)>,
    {
        AnalyzerResult::Success {
            scores: scores.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            findings,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        AnalyzerResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalyzerResult::Success { .. })
    }

    pub fn score(&self, key: &str) -> Option<f64> {
        match self {
            AnalyzerResult::Success { scores, .. } => scores.get(key).copied(),
            AnalyzerResult::Failure { .. } => None,
        }
    }

    /// Findings of a successful result; empty for failures.
    pub fn findings(&self) -> &[Finding] {
        match self {
            AnalyzerResult::Success { findings, .. } => findings,
            AnalyzerResult::Failure { .. } => &[],
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AnalyzerResult::Failure { kind, .. } => Some(*kind),
            AnalyzerResult::Success { .. } => None,
        }
    }
}

/// A declared score key and its inclusive valid range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSpec {
    pub key: String,
    pub min: f64,
    pub max: f64,
}

impl ScoreSpec {
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }
}

/// The score keys an analyzer promises to report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSchema {
    specs: Vec<ScoreSpec>,
}

impl ScoreSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a score key with an inclusive range.
    pub fn with(mut self, key: impl Into<String>, min: f64, max: f64) -> Self {
        self.specs.push(ScoreSpec {
            key: key.into(),
            min,
            max,
        });
        self
    }

    pub fn get(&self, key: &str) -> Option<&ScoreSpec> {
        self.specs.iter().find(|s| s.key == key)
    }

    pub fn specs(&self) -> &[ScoreSpec] {
        &self.specs
    }

    /// Validate the declaration itself. Run once, at registration.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for spec in &self.specs {
            if spec.key.trim().is_empty() {
                return Err(SchemaError::EmptyKey);
            }
            if !seen.insert(spec.key.as_str()) {
                return Err(SchemaError::DuplicateKey {
                    key: spec.key.clone(),
                });
            }
            if !spec.min.is_finite() || !spec.max.is_finite() || spec.min > spec.max {
                return Err(SchemaError::InvalidRange {
                    key: spec.key.clone(),
                    min: spec.min,
                    max: spec.max,
                });
            }
        }
        Ok(())
    }

    /// Check a result against the declaration: every declared key present,
    /// nothing undeclared, values in range. Failures pass through untouched.
    pub fn check(&self, result: &AnalyzerResult) -> Result<(), String> {
        let AnalyzerResult::Success { scores, .. } = result else {
            return Ok(());
        };

        for (key, value) in scores {
            match self.get(key) {
                None => return Err(format!("undeclared score '{}'", key)),
                Some(spec) if !spec.contains(*value) => {
                    return Err(format!(
                        "score '{}' = {} outside [{}, {}]",
                        key, value, spec.min, spec.max
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(spec) = self.specs.iter().find(|spec| !scores.contains_key(&spec.key)) {
            return Err(format!("missing declared score '{}'", spec.key));
        }

        Ok(())
    }
}

/// One analyzer's entry in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub analyzer: String,
    pub result: AnalyzerResult,
}

/// All analyzer results of one review, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewSnapshot {
    entries: Vec<SnapshotEntry>,
}

impl ReviewSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `analyzer`, keeping first-insertion order.
    pub fn insert(&mut self, analyzer: impl Into<String>, result: AnalyzerResult) {
        let analyzer = analyzer.into();
        match self.entries.iter_mut().find(|e| e.analyzer == analyzer) {
            Some(entry) => entry.result = result,
            None => self.entries.push(SnapshotEntry { analyzer, result }),
        }
    }

    pub fn get(&self, analyzer: &str) -> Option<&AnalyzerResult> {
        self.entries
            .iter()
            .find(|e| e.analyzer == analyzer)
            .map(|e| &e.result)
    }

    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.analyzer.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    /// True when there is at least one entry and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        !self.is_empty() && self.success_count() == 0
    }

    /// Every finding, paired with the analyzer that reported it.
    pub fn findings(&self) -> impl Iterator<Item = (&str, &Finding)> {
        self.entries.iter().flat_map(|e| {
            e.result
                .findings()
                .iter()
                .map(move |f| (e.analyzer.as_str(), f))
        })
    }
}

impl<K: Into<String>> FromIterator<(K, AnalyzerResult)> for ReviewSnapshot {
    fn from_iter<T: IntoIterator<Item = (K, AnalyzerResult)>>(iter: T) -> Self {
        let mut snapshot = ReviewSnapshot::new();
        for (name, result) in iter {
            snapshot.insert(name, result);
        }
        snapshot
    }
}

/// Routing outcome of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approve,
    DocumentationReview,
    HumanReview,
    CriticalEscalation,
    Error,
}

impl Outcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Outcome::Approve)
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Outcome::Approve => "✅",
            Outcome::DocumentationReview => "📚",
            Outcome::HumanReview => "👀",
            Outcome::CriticalEscalation => "🚨",
            Outcome::Error => "❌",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Approve => write!(f, "APPROVE"),
            Outcome::DocumentationReview => write!(f, "DOCUMENTATION_REVIEW"),
            Outcome::HumanReview => write!(f, "HUMAN_REVIEW"),
            Outcome::CriticalEscalation => write!(f, "CRITICAL_ESCALATION"),
            Outcome::Error => write!(f, "ERROR"),
        }
    }
}

/// The terminal artifact of a review run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub outcome: Outcome,
    /// Human-readable rationale, most important first. Never empty.
    pub reasons: Vec<String>,
    /// The snapshot the decision was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Arc<ReviewSnapshot>>,
}

impl Decision {
    pub fn new(outcome: Outcome, reasons: Vec<String>, snapshot: Arc<ReviewSnapshot>) -> Self {
        Self {
            outcome,
            reasons,
            snapshot: Some(snapshot),
        }
    }

    /// An `ERROR` decision; the snapshot is absent when the run failed before dispatch.
    pub fn error(reasons: Vec<String>, snapshot: Option<Arc<ReviewSnapshot>>) -> Self {
        let reasons = if reasons.is_empty() {
            vec!["review could not complete".to_string()]
        } else {
            reasons
        };
        Self {
            outcome: Outcome::Error,
            reasons,
            snapshot,
        }
    }
}
