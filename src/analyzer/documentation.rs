//! Docstring coverage for Python sources.

use super::outline::{definitions, Definition};
use super::{AnalysisContext, Analyzer};
use crate::models::{AnalyzerResult, Finding, Location, ScoreSchema, Severity, SourceFile, WorkUnit};
use async_trait::async_trait;

/// Reports the share of functions and classes that carry a docstring.
#[derive(Debug, Clone)]
pub struct DocumentationAnalyzer {
    name: String,
}

impl Default for DocumentationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentationAnalyzer {
    pub fn new() -> Self {
        Self {
            name: "documentation".to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Percentage of documented definitions; 100 when there are none.
pub fn coverage_pct(definitions: &[Definition]) -> f64 {
    if definitions.is_empty() {
        return 100.0;
    }
    let documented = definitions.iter().filter(|d| d.documented).count();
    documented as f64 / definitions.len() as f64 * 100.0
}

fn file_findings(file: &SourceFile, definitions: &[Definition]) -> Vec<Finding> {
    definitions
        .iter()
        .filter(|d| !d.documented)
        .map(|d| {
            Finding::new(
                Severity::Low,
                "missing-docstring",
                Location::line(file.path.clone(), d.line),
                format!("{} '{}' missing docstring", d.kind, d.name),
            )
        })
        .collect()
}

#[async_trait]
impl Analyzer for DocumentationAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new().with("documentation_pct", 0.0, 100.0)
    }

    async fn analyze(&self, unit: &WorkUnit, _context: &AnalysisContext) -> AnalyzerResult {
        let mut findings = Vec::new();
        let mut total = 0.0;

        for file in &unit.files {
            let defs = definitions(&file.content);
            total += coverage_pct(&defs);
            findings.extend(file_findings(file, &defs));
        }

        let average = if unit.files.is_empty() {
            100.0
        } else {
            total / unit.files.len() as f64
        };

        AnalyzerResult::success([("documentation_pct", average)], findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepoId;

    const SAMPLE: &str = r#"
class Order:
    """An order."""

    def total(self,
              tax):
        """Sum of line items."""
        return 0

    def ship(self):  # no doc
        return None


async def fetch(url):
    r'''Fetch a url.'''
    pass

def helper():

    return 1
"#;

    #[test]
    fn test_coverage_pct() {
        assert_eq!(coverage_pct(&definitions(SAMPLE)), 60.0);
        assert_eq!(coverage_pct(&definitions("x = 1\n")), 100.0);
    }

    #[tokio::test]
    async fn test_analyzer_averages_files() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("a.py", SAMPLE),
                SourceFile::new("b.py", "CONSTANT = 3\n"),
            ],
        );

        let result = DocumentationAnalyzer::new()
            .analyze(&unit, &AnalysisContext::empty())
            .await;

        assert_eq!(result.score("documentation_pct"), Some(80.0));
        let findings = result.findings();
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.category == "missing-docstring"));
        assert_eq!(findings[0].description, "Function 'ship' missing docstring");
    }

    #[tokio::test]
    async fn test_each_definition_judged_on_its_own_body() {
        let unit = WorkUnit::new(
            RepoId::new("o", "r"),
            "1".into(),
            vec![
                SourceFile::new("one_line.py", "def f(): return 1\ndef g():\n    \"\"\"Doc.\"\"\"\n"),
                SourceFile::new("plain.py", "def f():\n    \"Doc.\"\n"),
                SourceFile::new(
                    "example.py",
                    "def run():\n    \"\"\"Usage:\n\n    class Job:\n        pass\n    \"\"\"\n",
                ),
            ],
        );

        let result = DocumentationAnalyzer::new()
            .analyze(&unit, &AnalysisContext::empty())
            .await;

        assert_eq!(result.score("documentation_pct"), Some(250.0 / 3.0));
        let findings = result.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].description, "Function 'f' missing docstring");
        assert_eq!(findings[0].location.path, "one_line.py");
    }
}
