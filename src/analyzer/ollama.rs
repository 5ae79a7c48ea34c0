//! AI review through a local Ollama model.
//!
//! All files go out in one chat request. Results already published by
//! sibling analyzers are added to the prompt as advisory context; when
//! none are available yet the review proceeds without them.

use super::{AnalysisContext, Analyzer, PartialResults};
use crate::models::{
    AnalyzerResult, FailureKind, Finding, Location, ScoreSchema, Severity, WorkUnit,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Findings listed per sibling analyzer in the context section.
const MAX_CONTEXT_FINDINGS: usize = 5;

/// Connection settings for the Ollama API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            temperature: 0.1,
            timeout_seconds: 600,
        }
    }
}

/// Message in the chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Parsed model answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReview {
    pub confidence: Option<f64>,
    pub findings: Vec<Finding>,
}

/// LLM reviewer; registered as `ai_review` by default.
#[derive(Debug, Clone)]
pub struct OllamaReviewAnalyzer {
    name: String,
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaReviewAnalyzer {
    pub fn new(config: OllamaConfig) -> Result<Self, reqwest::Error> {
        info!("Initializing AI reviewer with model {}", config.model);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            name: "ai_review".to_string(),
            config,
            http_client,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Send a prompt (no tools) and return the model's reply.
    async fn send_prompt(&self, prompt: &str) -> Result<String, AnalyzerResult> {
        let url = format!("{}/api/chat", self.config.url.trim_end_matches('/'));

        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalyzerResult::failure(
                        FailureKind::Timeout,
                        format!("request timed out after {}s", self.config.timeout_seconds),
                    )
                } else if e.is_connect() {
                    AnalyzerResult::failure(
                        FailureKind::Unavailable,
                        format!("cannot connect to Ollama at {}", self.config.url),
                    )
                } else {
                    AnalyzerResult::failure(
                        FailureKind::Unavailable,
                        format!("failed to send request: {}", e),
                    )
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerResult::failure(
                FailureKind::Unavailable,
                format!("Ollama API error {}: {}", status, body),
            ));
        }

        let chat_response: OllamaChatResponse = response.json().await.map_err(|e| {
            AnalyzerResult::failure(
                FailureKind::InvalidOutput,
                format!("failed to parse Ollama response: {}", e),
            )
        })?;

        Ok(chat_response.message.content)
    }
}

/// Build the user prompt: advisory context first, then every file.
pub fn build_prompt(unit: &WorkUnit, context: &PartialResults) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Review change {} of {}.\n\n",
        unit.change, unit.repo
    ));

    prompt.push_str("=== CONTEXT FROM OTHER ANALYZERS ===\n");
    if context.is_empty() {
        prompt.push_str("No results from other analyzers yet.\n");
    }
    for (name, result) in context {
        match result {
            AnalyzerResult::Success { scores, findings } => {
                let scores: Vec<String> = scores
                    .iter()
                    .map(|(k, v)| format!("{}={:.2}", k, v))
                    .collect();
                prompt.push_str(&format!(
                    "- {}: {} ({} findings)\n",
                    name,
                    scores.join(", "),
                    findings.len()
                ));
                let mut worst: Vec<&Finding> = findings.iter().collect();
                worst.sort_by(|a, b| b.severity.cmp(&a.severity));
                for finding in worst.into_iter().take(MAX_CONTEXT_FINDINGS) {
                    prompt.push_str(&format!(
                        "    - [{}] {} at {}: {}\n",
                        finding.severity, finding.category, finding.location, finding.description
                    ));
                }
            }
            AnalyzerResult::Failure { kind, .. } => {
                prompt.push_str(&format!("- {}: unavailable ({})\n", name, kind));
            }
        }
    }
    prompt.push('\n');

    prompt.push_str("=== FILES TO REVIEW ===\n\n");
    for file in &unit.files {
        prompt.push_str(&format!("### FILE: {}\n```\n{}\n```\n\n", file.path, file.content));
    }
    prompt.push_str("=== END OF FILES ===\n\n");
    prompt.push_str("Now output issues as JSON (one per line), then the confidence line:");

    prompt
}

/// Parse JSON-lines issues and the `{"confidence": x}` line.
pub fn parse_response(response: &str) -> ModelReview {
    let mut review = ModelReview {
        confidence: None,
        findings: Vec::new(),
    };

    for line in response.lines() {
        let line = line.trim().trim_end_matches(',');
        if !line.starts_with('{') {
            continue;
        }
        let Ok(json) = serde_json::from_str::<Value>(line) else {
            continue;
        };

        if let Some(confidence) = json["confidence"].as_f64() {
            review.confidence = Some(normalize_confidence(confidence));
        } else if let Some(finding) = json_to_finding(&json) {
            review.findings.push(finding);
        }
    }

    review
}

/// Models sometimes answer in percent; fold 1–100 into 0–1.
fn normalize_confidence(value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    }
}

fn json_to_finding(json: &Value) -> Option<Finding> {
    let path = json["file_path"].as_str()?;
    let location = match json["line_number"].as_u64() {
        Some(line) if line > 0 => Location::line(path, line as usize),
        _ => Location::file(path),
    };
    let title = json["title"].as_str().unwrap_or("Issue");
    let description = json["description"].as_str().unwrap_or("");

    Some(Finding::new(
        Severity::from(json["severity"].as_str().unwrap_or("medium")),
        json["category"].as_str().unwrap_or("general").to_lowercase(),
        location,
        if description.is_empty() {
            title.to_string()
        } else {
            format!("{}: {}", title, description)
        },
    ))
}

#[async_trait]
impl Analyzer for OllamaReviewAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> ScoreSchema {
        ScoreSchema::new().with("confidence", 0.0, 1.0)
    }

    fn wants_context(&self) -> bool {
        true
    }

    async fn analyze(&self, unit: &WorkUnit, context: &AnalysisContext) -> AnalyzerResult {
        let visible = context.results();
        debug!(
            "AI review prompt built with {} context results",
            visible.len()
        );
        let prompt = build_prompt(unit, &visible);

        let response = match self.send_prompt(&prompt).await {
            Ok(response) => response,
            Err(failure) => return failure,
        };

        let review = parse_response(&response);
        info!("AI review returned {} findings", review.findings.len());

        match review.confidence {
            Some(confidence) => {
                AnalyzerResult::success([("confidence", confidence)], review.findings)
            }
            None => AnalyzerResult::failure(
                FailureKind::InvalidOutput,
                "model reply did not include a confidence line",
            ),
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You are an expert code reviewer for Python changes.

Report bugs, security vulnerabilities, performance problems and maintainability
issues. Results from other analyzers may be provided as context; use them as
hints, not as ground truth.

For each issue output one JSON object per line, exactly in this format:
{"file_path": "path/to/file.py", "line_number": 42, "severity": "high", "category": "security", "title": "Issue Title", "description": "Description"}

Severity must be one of: high, medium, low.

Finish with one line stating how confident you are that the change is safe to
merge, as a number between 0 and 1:
{"confidence": 0.85}

Only output JSON, no other text."#;
