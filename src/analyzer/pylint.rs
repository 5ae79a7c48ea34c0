//! Code quality via the `pylint` command-line tool.

use super::outline::definitions;
use super::workspace::{materialize, unit_path};
use super::{AnalysisContext, Analyzer};
use crate::models::{
    AnalyzerResult, FailureKind, Finding, Location, ScoreSchema, Severity, SourceFile, WorkUnit,
};
use async_trait::async_trait;
use std::io;
use tokio::process::Command;
use tracing::{debug, info};

const MSG_TEMPLATE: &str = "--msg-template={path}:{line}:{column}: {msg_id}: {msg} ({symbol})";

/// Functions spanning more lines than this past their `def` are too long.
pub const MAX_FUNCTION_LINES: usize = 50;
/// Functions taking more positional parameters than this have too many.
pub const MAX_POSITIONAL_PARAMS: usize = 7;

const LONG_FUNCTION_PENALTY: f64 = 1.0;
const PARAMS_PENALTY: f64 = 0.5;

/// One message line from pylint's text output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PylintMessage {
    pub path: String,
    pub line: usize,
    pub code: String,
    pub symbol: Option<String>,
    pub text: String,
}

impl PylintMessage {
    /// E/F are errors, W warnings, C/R conventions and refactors.
    pub fn severity(&self) -> Severity {
        match self.code.chars().next() {
            Some('E') | Some('F') => Severity::High,
            Some('W') => Severity::Medium,
            _ => Severity::Low,
        }
    }
}

/// Runs pylint over the change set; registered as `quality` by default.
#[derive(Debug, Clone)]
pub struct PylintAnalyzer {
    name: String,
    program: String,
    extra_args: Vec<String>,
}

impl Default for PylintAnalyzer {
    fn default() -> Self {
        Self::new("pylint")
    }
}

impl PylintAnalyzer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            name: "quality".to_string(),
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

/// Extract `X` from "Your code has been rated at X/10".
pub fn parse_score(output: &str) -> Option<f64> {
    const MARKER: &str = "rated at ";
    let start = output.find(MARKER)? + MARKER.len();
    output[start..].split('/').next()?.trim().parse().ok()
}

/// Parse `path:line:col: CODE: text (symbol)` lines, skipping anything else.
pub fn parse_messages(output: &str) -> Vec<PylintMessage> {
    output.lines().filter_map(parse_message).collect()
}

fn parse_message(line: &str) -> Option<PylintMessage> {
    let mut parts = line.splitn(4, ':');
    let path = parts.next()?.trim();
    let line_no: usize = parts.next()?.trim().parse().ok()?;
    let _column = parts.next()?;
    let (code, text) = parts.next()?.trim().split_once(": ")?;

    let valid_code = code.len() == 5
        && code.starts_with(['C', 'R', 'W', 'E', 'F', 'I'])
        && code[1..].chars().all(|c| c.is_ascii_digit());
    if path.is_empty() || !valid_code {
        return None;
    }

    let (text, symbol) = match (text.rfind(" ("), text.ends_with(')')) {
        (Some(idx), true) => (
            text[..idx].to_string(),
            Some(text[idx + 2..text.len() - 1].to_string()),
        ),
        _ => (text.to_string(), None),
    };

    Some(PylintMessage {
        path: path.to_string(),
        line: line_no,
        code: code.to_string(),
        symbol,
        text,
    })
}

/// Complexity score for one file, starting at 10 and floored at 0, with a
/// finding per code smell.
pub fn complexity(file: &SourceFile) -> (f64, Vec<Finding>) {
    let mut score = 10.0;
    let mut findings = Vec::new();

    for def in definitions(&file.content).iter().filter(|d| d.is_function()) {
        if def.length() > MAX_FUNCTION_LINES {
            score -= LONG_FUNCTION_PENALTY;
            findings.push(Finding::new(
                Severity::Medium,
                "long-function",
                Location::line(file.path.clone(), def.line),
                format!("Function '{}' is too long ({} lines)", def.name, def.length()),
            ));
        }
        if def.params > MAX_POSITIONAL_PARAMS {
            score -= PARAMS_PENALTY;
            findings.push(Finding::new(
                Severity::Low,
                "too-many-parameters",
                Location::line(file.path.clone(), def.line),
                format!("Function '{}' has too many parameters ({})", def.name, def.params),
            ));
        }
    }

    (f64::max(score, 0.0), findings)
}

/// Mean complexity over the unit's Python files.
fn unit_complexity(unit: &WorkUnit) -> (f64, Vec<Finding>) {
    let python: Vec<_> = unit.files.iter().filter(|f| f.path.ends_with(".py")).collect();
    if python.is_empty() {
        return (10.0, Vec::new());
    }

    let mut total = 0.0;
    let mut findings = Vec::new();
    for file in &python {
        let (score, smells) = complexity(file);
        total += score;
        findings.extend(smells);
    }
    (total / python.len() as f64, findings)
}

#[async_trait]
impl Analyzer for PylintAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new()
            .with("score", 0.0, 10.0)
            .with("complexity_score", 0.0, 10.0)
    }

    async fn analyze(&self, unit: &WorkUnit, _context: &AnalysisContext) -> AnalyzerResult {
        let (dir, written) = match materialize(unit) {
            Ok(materialized) => materialized,
            Err(e) => {
                return AnalyzerResult::failure(
                    FailureKind::Internal,
                    format!("failed to prepare workspace: {}", e),
                )
            }
        };

        let targets: Vec<_> = written
            .iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "py"))
            .collect();
        if targets.is_empty() {
            return AnalyzerResult::failure(FailureKind::Unavailable, "no Python files to lint");
        }

        info!("Running {} on {} files", self.program, targets.len());
        let output = Command::new(&self.program)
            .arg("--score=y")
            .arg(MSG_TEMPLATE)
            .args(&self.extra_args)
            .args(&targets)
            .current_dir(dir.path())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return AnalyzerResult::failure(
                    FailureKind::Unavailable,
                    format!("{} is not installed", self.program),
                )
            }
            Err(e) => {
                return AnalyzerResult::failure(
                    FailureKind::Internal,
                    format!("failed to run {}: {}", self.program, e),
                )
            }
        };

        // pylint encodes message categories in its exit status, so only
        // the presence of a score tells us the run worked.
        let stdout = String::from_utf8_lossy(&output.stdout);
        let Some(score) = parse_score(&stdout) else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return AnalyzerResult::failure(
                FailureKind::InvalidOutput,
                format!("{} produced no score: {}", self.program, stderr.trim()),
            );
        };

        let mut findings: Vec<Finding> = parse_messages(&stdout)
            .into_iter()
            .map(|msg| {
                let path = unit_path(unit, &msg.path).unwrap_or_else(|| msg.path.clone());
                Finding::new(
                    msg.severity(),
                    msg.symbol.clone().unwrap_or_else(|| msg.code.clone()),
                    Location::line(path, msg.line),
                    format!("{}: {}", msg.code, msg.text),
                )
            })
            .collect();

        debug!("pylint score {:.2} with {} messages", score, findings.len());

        let (complexity_score, smells) = unit_complexity(unit);
        findings.extend(smells);

        AnalyzerResult::success(
            [
                ("score", score.clamp(0.0, 10.0)),
                ("complexity_score", complexity_score),
            ],
            findings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RepoId, SourceFile};

    const OUTPUT: &str = "\
************* Module app
pkg/app.py:1:0: C0114: Missing module docstring (missing-module-docstring)
pkg/app.py:7:4: W0612: Unused variable 'x' (unused-variable)
pkg/app.py:9:11: E1101: Module 'os' has no 'nope' member (no-member)

------------------------------------------------------------------
Your code has been rated at 6.25/10 (previous run: 5.00/10, +1.25)
";

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(OUTPUT), Some(6.25));
        assert_eq!(parse_score("Your code has been rated at -3.00/10"), Some(-3.0));
        assert_eq!(parse_score("no score here"), None);
    }

    #[test]
    fn test_parse_messages() {
        let messages = parse_messages(OUTPUT);
        assert_eq!(messages.len(), 3);

        assert_eq!(messages[0].path, "pkg/app.py");
        assert_eq!(messages[0].line, 1);
        assert_eq!(messages[0].code, "C0114");
        assert_eq!(messages[0].symbol.as_deref(), Some("missing-module-docstring"));
        assert_eq!(messages[0].text, "Missing module docstring");

        let severities: Vec<_> = messages.iter().map(PylintMessage::severity).collect();
        assert_eq!(severities, vec![Severity::Low, Severity::Medium, Severity::High]);
    }

    #[test]
    fn test_parse_message_rejects_noise() {
        assert!(parse_message("************* Module app").is_none());
        assert!(parse_message("http://example.com:80: nope").is_none());
    }

    fn long_function(name: &str, body_lines: usize) -> String {
        let mut source = format!("def {}():\n", name);
        for i in 0..body_lines {
            source.push_str(&format!("    x{} = {}\n", i, i));
        }
        source
    }

    #[test]
    fn test_complexity_penalties() {
        let source = format!(
            "{}\n{}\ndef wide(a, b, c, d, e, f, g, h):\n    pass\n\ndef ok(a, b, c, d, e, f, g, *rest):\n    pass\n",
            long_function("short", 50),
            long_function("long", 51),
        );
        let (score, findings) = complexity(&SourceFile::new("pkg/app.py", source));

        assert_eq!(score, 8.5);
        let categories: Vec<_> = findings.iter().map(|f| f.category.as_str()).collect();
        assert_eq!(categories, vec!["long-function", "too-many-parameters"]);
        assert_eq!(findings[0].description, "Function 'long' is too long (51 lines)");
        assert_eq!(findings[0].location.line, Some(53));
        assert_eq!(findings[1].description, "Function 'wide' has too many parameters (8)");
    }

    #[test]
    fn test_complexity_floors_at_zero() {
        let source: String = (0..12).map(|i| long_function(&format!("f{}", i), 60)).collect();
        let (score, findings) = complexity(&SourceFile::new("big.py", source));
        assert_eq!(score, 0.0);
        assert_eq!(findings.len(), 12);
    }

    #[test]
    fn test_unit_complexity_averages_python_files() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("a.py", long_function("long", 51)),
                SourceFile::new("b.py", "x = 1\n"),
                SourceFile::new("notes.md", long_function("ignored", 80)),
            ],
        );
        let (score, findings) = unit_complexity(&unit);
        assert_eq!(score, 9.5);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].location.path, "a.py");
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![SourceFile::new("app.py", "x = 1\n")],
        );
        let analyzer = PylintAnalyzer::new("reviewgate-no-such-pylint-binary");

        let result = analyzer.analyze(&unit, &AnalysisContext::empty()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Unavailable));
    }

    #[tokio::test]
    async fn test_no_python_files_is_unavailable() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![SourceFile::new("README.md", "# hi\n")],
        );

        let result = PylintAnalyzer::default()
            .analyze(&unit, &AnalysisContext::empty())
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Unavailable));
    }
}
