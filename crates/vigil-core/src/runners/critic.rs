//! AI critic runner: prompt construction, provider calls, and response
//! normalisation.
//!
//! The core owns the prompt contract: the validator's system prompt, the
//! merged rule context ("Patterns to Enforce", "Anti-Patterns to Flag",
//! "Conventions", "Architecture Context"), the changes under review (diff
//! and/or truncated content per the validator's [`ContextConfig`]), an
//! optional git diff block, and a strict-JSON response format block.
//! Providers are only asked to complete text.

use crate::context::ValidationContext;
use crate::error::ProviderError;
use crate::result::{ResultDetails, Severity, ValidatorResult, ValidatorStatus};
use crate::validator::{AiCriticConfig, ContextConfig, ValidatorDefinition};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::LazyLock;

/// File content included in prompts is truncated at this many characters.
const MAX_PROMPT_FILE_CHARS: usize = 10_000;
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Fixed reviewer persona sent as the provider-level system prompt; the
/// validator's own system prompt heads the user message.
const REVIEWER_SYSTEM_PROMPT: &str = "You are a rigorous code reviewer embedded in an automated \
validation pipeline. Judge only the changes you are shown, follow the project rules provided, \
and respond in the exact JSON format requested. Do not invent issues outside the shown changes.";

static JSON_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```json\s*(.*?)```").expect("json fence regex is valid")
});

/// A completion request handed to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Seam to an LLM provider. Implementations must be cheap to call
/// concurrently; the pipeline enforces timeouts around the whole runner.
#[async_trait]
pub trait CriticProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
    /// Short name for logs.
    fn name(&self) -> &str;
}

/// HTTP provider posting a generic chat-completion body. The response text
/// is read from `content[0].text`, `choices[0].message.content`, or `text`,
/// whichever is present, so Anthropic- and OpenAI-shaped endpoints both
/// work without vendor SDKs.
pub struct HttpCriticProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCriticProvider {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

fn extract_completion_text(value: &Value) -> Option<String> {
    value["content"][0]["text"]
        .as_str()
        .or_else(|| value["choices"][0]["message"]["content"].as_str())
        .or_else(|| value["text"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl CriticProvider for HttpCriticProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": request.model,
            "system": request.system,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key).header("x-api-key", key);
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(format!(
                "HTTP {} from {}",
                response.status(),
                self.endpoint
            )));
        }
        let value: Value = response.json().await?;
        extract_completion_text(&value).ok_or_else(|| {
            ProviderError::InvalidResponse("no completion text in response body".to_string())
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// CLI fallback provider: pipes the prompt to a command's stdin and reads
/// the completion from stdout.
pub struct CliCriticProvider {
    command: String,
}

impl CliCriticProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl CriticProvider for CliCriticProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        use tokio::io::AsyncWriteExt;

        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Unavailable(format!("spawn failed: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = format!("{}\n\n{}", request.system, request.prompt);
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| ProviderError::Unavailable(format!("stdin write failed: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("wait failed: {e}")))?;
        if !output.status.success() {
            return Err(ProviderError::Unavailable(format!(
                "provider command exited with status {:?}",
                output.status.code()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "provider command produced no output".to_string(),
            ));
        }
        Ok(text)
    }

    fn name(&self) -> &str {
        "cli"
    }
}

/// Runs AI critic validators against an ordered provider list (HTTP first,
/// CLI fallback in the default wiring). An unreachable provider chain maps
/// to a `Skipped`/`Warning` result, never an error.
#[derive(Default, Clone)]
pub struct CriticRunner {
    providers: Vec<Arc<dyn CriticProvider>>,
}

impl std::fmt::Debug for CriticRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("CriticRunner").field("providers", &names).finish()
    }
}

impl CriticRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn CriticProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn has_providers(&self) -> bool {
        !self.providers.is_empty()
    }

    pub async fn run(
        &self,
        def: &ValidatorDefinition,
        config: &AiCriticConfig,
        ctx: &ValidationContext,
    ) -> ValidatorResult {
        let context_config = def.context_config.unwrap_or_default();
        let prompt = build_review_prompt(config, context_config, ctx);
        let request = CompletionRequest {
            model: config.model.clone(),
            system: REVIEWER_SYSTEM_PROMPT.to_string(),
            prompt,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        let mut last_error: Option<ProviderError> = None;
        for provider in &self.providers {
            match provider.complete(&request).await {
                Ok(text) => {
                    let verdict = parse_review_response(&text);
                    return verdict.into_result(&def.id);
                }
                Err(e) => {
                    tracing::warn!(
                        validator = %def.id,
                        provider = provider.name(),
                        error = %e,
                        "critic provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no critic provider configured".to_string());
        ValidatorResult::skipped(&def.id, format!("AI critic unavailable: {reason}"))
    }
}

/// Build the review prompt per the critic prompt contract.
pub(crate) fn build_review_prompt(
    config: &AiCriticConfig,
    context_config: ContextConfig,
    ctx: &ValidationContext,
) -> String {
    let mut sections: Vec<String> = vec![config.system_prompt.clone()];

    // Union of resolved rules across candidate files, deduplicated by id.
    let mut seen = HashSet::new();
    let mut patterns = Vec::new();
    let mut anti_patterns = Vec::new();
    let mut conventions = Vec::new();
    let mut notes = Vec::new();
    for file in &ctx.files {
        let Some(rules) = &file.resolved_rules else {
            continue;
        };
        for p in &rules.patterns {
            if seen.insert(p.id.clone()) {
                patterns.push(format!("- {}", p.description));
            }
        }
        for a in &rules.anti_patterns {
            if seen.insert(a.id.clone()) {
                anti_patterns.push(format!(
                    "- DO NOT USE: {} — Instead: {}",
                    a.forbidden, a.alternative
                ));
            }
        }
        for c in &rules.conventions {
            if seen.insert(c.id.clone()) {
                conventions.push(format!("- {}", c.description));
            }
        }
        let trimmed = rules.architecture_notes.trim();
        if !trimmed.is_empty() && !notes.iter().any(|n| n == trimmed) {
            notes.push(trimmed.to_string());
        }
    }
    if !patterns.is_empty() {
        sections.push(format!("## Patterns to Enforce\n{}", patterns.join("\n")));
    }
    if !anti_patterns.is_empty() {
        sections.push(format!(
            "## Anti-Patterns to Flag\n{}",
            anti_patterns.join("\n")
        ));
    }
    if !conventions.is_empty() {
        sections.push(format!("## Conventions\n{}", conventions.join("\n")));
    }
    if !notes.is_empty() {
        sections.push(format!("## Architecture Context\n{}", notes.join("\n\n")));
    }

    let mut changes = String::from("## Changes to Review");
    for file in &ctx.files {
        changes.push_str(&format!("\n\n### File: {}", file.path));
        if context_config.include_diff {
            if let Some(diff) = &file.diff {
                changes.push_str(&format!("\n\nDiff:\n```diff\n{diff}\n```"));
            }
        }
        if context_config.include_full_file {
            let content = truncate_for_prompt(&file.content);
            changes.push_str(&format!("\n\nContent:\n```\n{content}\n```"));
        }
    }
    sections.push(changes);

    if context_config.include_git_diff {
        if let Some(git_diff) = &ctx.git_diff {
            sections.push(format!("## Git Diff\n```diff\n{git_diff}\n```"));
        }
    }

    sections.push(
        "## Response Format\nRespond with strict JSON only, no prose outside the JSON object:\n\
         {\"status\": \"approved\" | \"rejected\" | \"needs-revision\", \
         \"severity\": \"error\" | \"warning\" | \"info\" | \"suggestion\", \
         \"message\": \"<one-line verdict>\", \
         \"reasoning\": \"<why>\", \
         \"suggested_fix\": \"<optional fix>\", \
         \"confidence\": <0.0-1.0>}"
            .to_string(),
    );

    sections.join("\n\n")
}

fn truncate_for_prompt(content: &str) -> String {
    if content.chars().count() <= MAX_PROMPT_FILE_CHARS {
        content.to_string()
    } else {
        let mut out: String = content.chars().take(MAX_PROMPT_FILE_CHARS).collect();
        out.push_str(&format!(
            "\n... [truncated at {MAX_PROMPT_FILE_CHARS} characters]"
        ));
        out
    }
}

/// Normalised critic verdict, before conversion to a [`ValidatorResult`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReviewVerdict {
    pub status: ValidatorStatus,
    pub severity: Severity,
    pub message: String,
    pub reasoning: Option<String>,
    pub suggested_fix: Option<String>,
    pub approved: bool,
    pub confidence: Option<f64>,
}

impl ReviewVerdict {
    fn into_result(self, validator_id: &str) -> ValidatorResult {
        let mut result =
            ValidatorResult::new(validator_id, self.status, self.severity, self.message)
                .with_metadata("approved", self.approved.into());
        if let Some(confidence) = self.confidence {
            result = result.with_metadata("confidence", json!(confidence));
        }
        if self.reasoning.is_some() || self.suggested_fix.is_some() {
            result = result.with_details(ResultDetails {
                reasoning: self.reasoning,
                suggested_fix: self.suggested_fix,
                ..ResultDetails::default()
            });
        }
        result
    }
}

/// Parse a critic response: first a fenced ```json block, then the whole
/// body as JSON, then keyword heuristics over the raw text.
pub(crate) fn parse_review_response(text: &str) -> ReviewVerdict {
    let candidate = JSON_FENCE_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string());

    let value: Option<Value> = candidate
        .as_deref()
        .and_then(|c| serde_json::from_str(c).ok())
        .or_else(|| serde_json::from_str(text.trim()).ok())
        .filter(Value::is_object);

    match value {
        Some(value) => normalise_verdict(&value),
        None => heuristic_verdict(text),
    }
}

fn normalise_verdict(value: &Value) -> ReviewVerdict {
    let status = match value["status"]
        .as_str()
        .unwrap_or("needs-revision")
        .to_lowercase()
        .as_str()
    {
        "approved" => ValidatorStatus::Approved,
        "rejected" => ValidatorStatus::Rejected,
        _ => ValidatorStatus::NeedsRevision,
    };
    let severity = match value["severity"]
        .as_str()
        .unwrap_or("warning")
        .to_lowercase()
        .as_str()
    {
        "error" => Severity::Error,
        "info" => Severity::Info,
        "suggestion" => Severity::Suggestion,
        _ => Severity::Warning,
    };
    let approved = value["approved"]
        .as_bool()
        .unwrap_or(status == ValidatorStatus::Approved);
    let message = value["message"]
        .as_str()
        .or_else(|| value["summary"].as_str())
        .unwrap_or("AI critic review completed")
        .to_string();
    let confidence = value["confidence"].as_f64().map(|c| c.clamp(0.0, 1.0));

    ReviewVerdict {
        status,
        severity,
        message,
        reasoning: value["reasoning"].as_str().map(str::to_string),
        suggested_fix: value["suggested_fix"].as_str().map(str::to_string),
        approved,
        confidence,
    }
}

const APPROVE_NEGATIONS: &[&str] = &[
    "not approve",
    "cannot approve",
    "can't approve",
    "do not approve",
    "don't approve",
    "disapprove",
];

fn heuristic_verdict(text: &str) -> ReviewVerdict {
    let lower = text.to_lowercase();
    let excerpt: String = text.trim().chars().take(200).collect();

    let approve_mentioned = lower.contains("approve");
    let approve_negated = APPROVE_NEGATIONS.iter().any(|n| lower.contains(n));

    let (status, severity) = if approve_mentioned && !approve_negated {
        (ValidatorStatus::Approved, Severity::Info)
    } else if lower.contains("reject") || lower.contains("error") || lower.contains("critical") {
        (ValidatorStatus::Rejected, Severity::Warning)
    } else {
        (ValidatorStatus::NeedsRevision, Severity::Warning)
    };

    ReviewVerdict {
        status,
        severity,
        message: excerpt,
        reasoning: None,
        suggested_fix: None,
        approved: status == ValidatorStatus::Approved,
        confidence: None,
    }
}
