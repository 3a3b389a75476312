//! Validator definitions: what to run, when, and how failures behave.

use crate::context::{TriggerKind, ValidationContext};
use crate::result::ValidatorResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Severity policy when a validator fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    Warning,
    Error,
}

/// What a timeout turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutAction {
    /// Drop the validator from the run (status `Skipped`).
    Skip,
    /// Record a timed-out result with warning severity.
    Warning,
    /// Record a timed-out result with error severity.
    Error,
}

/// Failure and scheduling behavior shared by all validator kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
    /// Severity of a failed (rejected) result.
    pub on_failure: FailureMode,
    /// Stop the turn-based pipeline when this validator rejects.
    pub block_on_failure: bool,
    /// This validator must approve; anything else blocks the run.
    pub required: bool,
    /// Per-validator timeout; `None` uses the pipeline default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u32>,
    pub on_timeout: TimeoutAction,
    /// Whether results may be memoized by content hash.
    pub cacheable: bool,
    /// Vote weight for weighted consensus; missing weight counts as 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            on_failure: FailureMode::Warning,
            block_on_failure: false,
            required: false,
            timeout_ms: None,
            on_timeout: TimeoutAction::Warning,
            cacheable: true,
            weight: None,
        }
    }
}

/// How much of the validation context an AI critic prompt includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Include each file's diff in the prompt.
    pub include_diff: bool,
    /// Include each file's (truncated) full content in the prompt.
    pub include_full_file: bool,
    /// Include the session-level git diff block.
    pub include_git_diff: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            include_diff: true,
            include_full_file: true,
            include_git_diff: false,
        }
    }
}

/// A user-supplied validator function.
#[async_trait]
pub trait CustomValidator: Send + Sync {
    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorResult>;
}

/// Generation settings for an AI critic validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiCriticConfig {
    /// Provider identifier, e.g. `"anthropic"`.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// The kind-specific payload of a validator definition.
///
/// A sum type rather than optional fields so that illegal combinations
/// (a static validator without a command, a critic without a prompt)
/// cannot be constructed past registration.
#[derive(Clone)]
pub enum ValidatorKind {
    /// Run a shell command and parse its output.
    Static { command: String },
    /// Ask an LLM to review the changes.
    AiCritic(AiCriticConfig),
    /// Invoke a user-provided function.
    Custom(Arc<dyn CustomValidator>),
    /// Aggregate a named list of child validators.
    Composite { children: Vec<String> },
}

impl std::fmt::Debug for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static { command } => f.debug_struct("Static").field("command", command).finish(),
            Self::AiCritic(cfg) => f.debug_tuple("AiCritic").field(cfg).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Composite { children } => {
                f.debug_struct("Composite").field("children", children).finish()
            }
        }
    }
}

impl ValidatorKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Static { .. } => "static",
            Self::AiCritic(_) => "ai-critic",
            Self::Custom(_) => "custom",
            Self::Composite { .. } => "composite",
        }
    }
}

/// A single quality check: kind, behavior, and the triggers it runs on.
#[derive(Debug, Clone)]
pub struct ValidatorDefinition {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    /// Ascending execution order; must be non-negative.
    pub priority: i32,
    pub triggers: HashSet<TriggerKind>,
    /// Glob patterns; empty means the validator applies to every file set.
    pub file_patterns: Vec<String>,
    pub context_config: Option<ContextConfig>,
    pub behavior: Behavior,
    pub kind: ValidatorKind,
}

impl ValidatorDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ValidatorKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            priority: 100,
            triggers: HashSet::new(),
            file_patterns: Vec::new(),
            context_config: None,
            behavior: Behavior::default(),
            kind,
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerKind) -> Self {
        self.triggers.insert(trigger);
        self
    }

    pub fn with_triggers(mut self, triggers: impl IntoIterator<Item = TriggerKind>) -> Self {
        self.triggers.extend(triggers);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_patterns.push(pattern.into());
        self
    }

    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_context_config(mut self, config: ContextConfig) -> Self {
        self.context_config = Some(config);
        self
    }

    /// Check the definition-level invariants. Composite child resolution is
    /// the registry's job, since it needs the full table.
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".to_string());
        }
        if self.priority < 0 {
            return Err(format!("priority must be >= 0, got {}", self.priority));
        }
        if let Some(timeout_ms) = self.behavior.timeout_ms {
            if timeout_ms == 0 {
                return Err("timeout_ms must be > 0".to_string());
            }
        }
        match &self.kind {
            ValidatorKind::Static { command } => {
                if command.trim().is_empty() {
                    return Err("static validator requires a command".to_string());
                }
            }
            ValidatorKind::AiCritic(cfg) => {
                if cfg.provider.trim().is_empty() {
                    return Err("ai-critic validator requires a provider".to_string());
                }
                if cfg.system_prompt.trim().is_empty() {
                    return Err("ai-critic validator requires a system prompt".to_string());
                }
            }
            ValidatorKind::Composite { children } => {
                if children.is_empty() {
                    return Err("composite validator requires at least one child".to_string());
                }
            }
            ValidatorKind::Custom(_) => {}
        }
        Ok(())
    }
}
