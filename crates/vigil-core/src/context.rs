//! Validation input bundle: what is being validated and why.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use vigil_context::MergedRules;

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// A named event at which the pipeline is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PreTool,
    OnChange,
    PreWrite,
    PostTool,
    PreCommit,
    Periodic,
    OnDemand,
}

/// One candidate file change under validation.
///
/// `resolved_rules` is attached by the orchestrator before validators run;
/// validators read it and never write it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateFile {
    pub path: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<String>,
    /// Merged rule context for this file's path, shared with the resolver
    /// cache. Not serialized: it is derived state.
    #[serde(skip)]
    pub resolved_rules: Option<Arc<MergedRules>>,
}

impl CandidateFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_diff(mut self, diff: impl Into<String>) -> Self {
        self.diff = Some(diff.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Snapshot of the working tree's git state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default)]
    pub staged: Vec<String>,
    #[serde(default)]
    pub unstaged: Vec<String>,
    #[serde(default)]
    pub untracked: Vec<String>,
}

/// A recent session action, for validators that care about history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    pub description: String,
    pub timestamp: i64,
}

/// The tool invocation that triggered a pre/post-tool validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// The result of the tool invocation, for post-tool triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    #[serde(default)]
    pub output: serde_json::Value,
}

/// Everything a validator may inspect for one `validate` call.
///
/// Owned by the caller for the duration of the call; the orchestrator
/// mutates it only to attach `resolved_rules` to each file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationContext {
    pub trigger: TriggerKind,
    pub timestamp: i64,
    pub files: Vec<CandidateFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_status: Option<GitStatus>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_actions: Vec<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResult>,
}

impl ValidationContext {
    pub fn new(trigger: TriggerKind, session_id: impl Into<String>) -> Self {
        Self {
            trigger,
            timestamp: now_millis(),
            files: Vec::new(),
            git_diff: None,
            git_status: None,
            session_id: session_id.into(),
            recent_actions: Vec::new(),
            tool_call: None,
            tool_result: None,
        }
    }

    pub fn with_file(mut self, file: CandidateFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_files(mut self, files: impl IntoIterator<Item = CandidateFile>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn with_git_diff(mut self, diff: impl Into<String>) -> Self {
        self.git_diff = Some(diff.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let ctx = ValidationContext::new(TriggerKind::PreWrite, "session-1")
            .with_file(CandidateFile::new("a.ts", "let x = 1;").with_language("typescript"))
            .with_git_diff("+let x = 1;");

        assert_eq!(ctx.trigger, TriggerKind::PreWrite);
        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].language.as_deref(), Some("typescript"));
        assert_eq!(ctx.git_diff.as_deref(), Some("+let x = 1;"));
        assert!(ctx.timestamp > 0);
    }

    #[test]
    fn test_trigger_kind_serialization() {
        let json = serde_json::to_string(&TriggerKind::PreCommit).unwrap();
        assert_eq!(json, "\"pre_commit\"");
        let back: TriggerKind = serde_json::from_str("\"on_demand\"").unwrap();
        assert_eq!(back, TriggerKind::OnDemand);
    }

    #[test]
    fn test_resolved_rules_not_serialized() {
        let mut file = CandidateFile::new("a.ts", "x");
        file.resolved_rules = Some(Arc::new(MergedRules::default()));
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("resolved_rules"));
    }
}
