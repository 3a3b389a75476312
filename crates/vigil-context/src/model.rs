//! Typed in-memory representation of rule-file content.
//!
//! A rule file contributes patterns (things to follow), anti-patterns
//! (things to avoid, with an alternative), conventions (stylistic rules),
//! free-form architecture notes, and override directives that modify items
//! inherited from a coarser scope.

use serde::{Deserialize, Serialize};

/// A requirement to follow, e.g. "Use dependency injection for services".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub description: String,
    /// Rule file this pattern came from.
    pub source_file: String,
    /// Code examples attached to this pattern.
    #[serde(default)]
    pub examples: Vec<String>,
}

/// A thing to avoid and what to use instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiPattern {
    pub id: String,
    pub forbidden: String,
    pub alternative: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub source_file: String,
}

/// A stylistic rule, e.g. "camelCase for function names".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convention {
    pub id: String,
    pub description: String,
    pub source_file: String,
}

/// How an override directive modifies items from a coarser scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// Append extra text to a matching pattern's description.
    Extend,
    /// Replace the primary string of matching items.
    Override,
    /// Remove matching items entirely.
    Disable,
}

/// A directive of the form `@disable: "console.log"` found in a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideDirective {
    pub kind: OverrideKind,
    /// Substring matched against item ids and primary strings.
    pub target_id: String,
    /// Replacement or suffix text for `Override` / `Extend`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    pub source_file: String,
}

/// The parsed content of a single rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedContext {
    pub patterns: Vec<Pattern>,
    pub anti_patterns: Vec<AntiPattern>,
    pub conventions: Vec<Convention>,
    pub architecture_notes: String,
    pub overrides: Vec<OverrideDirective>,
    pub source_file: String,
}

impl ParsedContext {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.anti_patterns.is_empty()
            && self.conventions.is_empty()
            && self.overrides.is_empty()
            && self.architecture_notes.trim().is_empty()
    }
}

/// The hierarchical combination of all rule files that apply to one source
/// path, coarsest first. Same shape as [`ParsedContext`] but not tied to a
/// single file; each item still records its own `source_file`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRules {
    pub patterns: Vec<Pattern>,
    pub anti_patterns: Vec<AntiPattern>,
    pub conventions: Vec<Convention>,
    pub architecture_notes: String,
    /// Override directives that were applied during the merge.
    pub overrides: Vec<OverrideDirective>,
}

impl MergedRules {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.anti_patterns.is_empty()
            && self.conventions.is_empty()
            && self.architecture_notes.trim().is_empty()
    }

    /// Total number of enforceable items (patterns, anti-patterns,
    /// conventions).
    pub fn rule_count(&self) -> usize {
        self.patterns.len() + self.anti_patterns.len() + self.conventions.len()
    }
}
