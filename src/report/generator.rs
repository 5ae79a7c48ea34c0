//! Markdown and JSON review reports.
//!
//! Renders a finished [`ReviewState`]: metadata, decision and reasons,
//! per-analyzer results, findings grouped by file, the stage history and
//! the notification audit log.

use crate::models::{AnalyzerResult, Finding, ReviewSnapshot, Severity};
use crate::workflow::{DeliveryOutcome, ReviewState};
use anyhow::Result;
use std::collections::BTreeMap;

/// Finding counts for the summary table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindingSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub by_category: BTreeMap<String, usize>,
}

impl FindingSummary {
    pub fn from_snapshot(snapshot: &ReviewSnapshot) -> Self {
        let mut summary = Self::default();
        for (_, finding) in snapshot.findings() {
            summary.total += 1;
            match finding.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            *summary
                .by_category
                .entry(finding.category.clone())
                .or_insert(0) += 1;
        }
        summary
    }
}

/// Findings grouped by file path, most severe first, then by line.
pub fn group_by_file(snapshot: &ReviewSnapshot) -> BTreeMap<&str, Vec<(&str, &Finding)>> {
    let mut grouped: BTreeMap<&str, Vec<(&str, &Finding)>> = BTreeMap::new();

    for (analyzer, finding) in snapshot.findings() {
        grouped
            .entry(finding.location.path.as_str())
            .or_default()
            .push((analyzer, finding));
    }

    for findings in grouped.values_mut() {
        findings.sort_by(|(_, a), (_, b)| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.location.line.cmp(&b.location.line))
        });
    }

    grouped
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(state: &ReviewState) -> String {
    let mut output = String::new();

    output.push_str("# ReviewGate Report\n\n");
    output.push_str(&generate_metadata_section(state));
    output.push_str(&generate_decision_section(state));
    output.push_str(&generate_skipped_section(state));

    if let Some(snapshot) = state.snapshot() {
        output.push_str(&generate_analyzer_section(snapshot));
        output.push_str(&generate_summary_section(snapshot));
        output.push_str(&generate_findings_section(snapshot));
    }

    output.push_str(&generate_history_section(state));
    output.push_str(&generate_notifications_section(state));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(state: &ReviewState) -> String {
    let unit = state.unit();
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Review ID:** `{}`\n", state.id()));
    section.push_str(&format!("- **Repository:** {}\n", unit.repo));
    section.push_str(&format!("- **Change:** {}\n", unit.change));
    section.push_str(&format!(
        "- **Started:** {}\n",
        state.created_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Stage:** {}\n", state.stage()));
    section.push_str(&format!(
        "- **Files Reviewed:** {} ({} lines)\n",
        unit.files.len(),
        unit.total_lines()
    ));
    if let Some(last) = state.history().last() {
        let elapsed = last.at - state.created_at();
        section.push_str(&format!(
            "- **Duration:** {:.1}s\n",
            elapsed.num_milliseconds() as f64 / 1000.0
        ));
    }
    section.push('\n');

    section
}

fn generate_skipped_section(state: &ReviewState) -> String {
    let skipped = &state.unit().skipped;
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Skipped Files

");
    section.push_str("These files were not reviewed.\n\n");
    section.push_str("| File | Reason |\n");
    section.push_str("|:---|:---|\n");
    for file in skipped {
        section.push_str(&format!(
            "| `{}` | {} |\n",
            file.path,
            escape_cell(&file.reason.to_string())
        ));
    }
    section.push('\n');

    section
}

fn generate_decision_section(state: &ReviewState) -> String {
    let mut section = String::new();
    section.push_str("## Decision\n\n");

    let Some(decision) = state.decision() else {
        section.push_str("No decision was reached.\n\n");
        return section;
    };

    section.push_str(&format!(
        "{} **{}**\n\n",
        decision.outcome.emoji(),
        decision.outcome
    ));
    for reason in &decision.reasons {
        section.push_str(&format!("- {}\n", reason));
    }
    section.push('\n');

    if let Some(error) = state.error() {
        section.push_str(&format!("> **{}:** {}\n\n", error.kind, error.message));
    }

    section
}

fn generate_analyzer_section(snapshot: &ReviewSnapshot) -> String {
    let mut section = String::new();

    section.push_str("## Analyzer Results\n\n");
    section.push_str("| Analyzer | Status | Scores | Findings |\n");
    section.push_str("|:---|:---:|:---|:---:|\n");

    for entry in snapshot.entries() {
        let (status, detail, findings) = match &entry.result {
            AnalyzerResult::Success { scores, findings } => {
                let scores: Vec<String> = scores
                    .iter()
                    .map(|(key, value)| format!("{} = {:.2}", key, value))
                    .collect();
                ("✅ success".to_string(), scores.join(", "), findings.len())
            }
            AnalyzerResult::Failure { kind, message } => {
                (format!("❌ {}", kind), escape_cell(message), 0)
            }
        };
        section.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            entry.analyzer, status, detail, findings
        ));
    }
    section.push('\n');

    section
}

fn generate_summary_section(snapshot: &ReviewSnapshot) -> String {
    let summary = FindingSummary::from_snapshot(snapshot);
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "| {} High | {} Medium | {} Low | **Total** |\n",
        Severity::High.emoji(),
        Severity::Medium.emoji(),
        Severity::Low.emoji(),
    ));
    section.push_str("|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} | **{}** |\n\n",
        summary.high, summary.medium, summary.low, summary.total
    ));

    if !summary.by_category.is_empty() {
        section.push_str("### Findings by Category\n\n");
        section.push_str("| Category | Count |\n");
        section.push_str("|:---|:---:|\n");

        let mut categories: Vec<_> = summary.by_category.iter().collect();
        categories.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

        for (category, count) in categories {
            section.push_str(&format!("| {} | {} |\n", category, count));
        }
        section.push('\n');
    }

    section
}

fn generate_findings_section(snapshot: &ReviewSnapshot) -> String {
    let mut section = String::new();
    section.push_str("## Findings by File\n\n");

    let grouped = group_by_file(snapshot);
    if grouped.is_empty() {
        section.push_str("No findings were reported. 🎉\n\n");
        return section;
    }

    for (path, findings) in grouped {
        section.push_str(&format!("### `{}`\n\n", path));
        for (analyzer, finding) in findings {
            let line = finding
                .location
                .line
                .map(|l| format!("line {}", l))
                .unwrap_or_else(|| "file".to_string());
            section.push_str(&format!(
                "- {} **{}** `{}` ({}, {}): {}\n",
                finding.severity.emoji(),
                finding.severity,
                finding.category,
                line,
                analyzer,
                finding.description
            ));
        }
        section.push('\n');
    }

    section
}

fn generate_history_section(state: &ReviewState) -> String {
    let mut section = String::new();

    section.push_str("## Stage History\n\n");
    section.push_str("| Stage | Entered |\n");
    section.push_str("|:---|:---|\n");
    for change in state.history() {
        section.push_str(&format!(
            "| {} | {} |\n",
            change.stage,
            change.at.format("%H:%M:%S%.3f")
        ));
    }
    section.push('\n');

    section
}

fn generate_notifications_section(state: &ReviewState) -> String {
    if state.notifications().is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Notifications\n\n");
    section.push_str("| Kind | Sent | Outcome |\n");
    section.push_str("|:---|:---|:---|\n");
    for record in state.notifications() {
        let outcome = match &record.outcome {
            DeliveryOutcome::Delivered => "delivered".to_string(),
            DeliveryOutcome::Failed { reason } => format!("failed: {}", escape_cell(reason)),
        };
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            record.kind,
            record.at.format("%H:%M:%S%.3f"),
            outcome
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by ReviewGate v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Generate a JSON report.
pub fn generate_json_report(state: &ReviewState) -> Result<String> {
    serde_json::to_string_pretty(state).map_err(Into::into)
}
