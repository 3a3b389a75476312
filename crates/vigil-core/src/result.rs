//! Validator result and summary types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one validator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorStatus {
    Approved,
    Rejected,
    NeedsRevision,
    Skipped,
    TimedOut,
}

/// Severity attached to a validator result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Suggestion,
}

/// Location and fix details for the primary issue a validator found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ResultDetails {
    pub fn is_empty(&self) -> bool {
        self.file.is_none()
            && self.line.is_none()
            && self.column.is_none()
            && self.suggested_fix.is_none()
            && self.reasoning.is_none()
    }
}

/// The verdict of a single validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorResult {
    pub validator_id: String,
    pub status: ValidatorStatus,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ResultDetails>,
    pub duration_ms: u64,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl ValidatorResult {
    pub fn new(
        validator_id: impl Into<String>,
        status: ValidatorStatus,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            validator_id: validator_id.into(),
            status,
            severity,
            message: message.into(),
            details: None,
            duration_ms: 0,
            cached: false,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn approved(validator_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator_id, ValidatorStatus::Approved, Severity::Info, message)
    }

    pub fn rejected(
        validator_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self::new(validator_id, ValidatorStatus::Rejected, severity, message)
    }

    pub fn needs_revision(
        validator_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self::new(validator_id, ValidatorStatus::NeedsRevision, severity, message)
    }

    pub fn skipped(validator_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(validator_id, ValidatorStatus::Skipped, Severity::Warning, message)
    }

    pub fn with_details(mut self, details: ResultDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_approved(&self) -> bool {
        self.status == ValidatorStatus::Approved
    }
}

/// The aggregated verdict of one `validate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Approved,
    Rejected,
    NeedsRevision,
    Blocked,
}

/// The aggregated outcome of one `validate` call.
///
/// Invariants upheld by the aggregator: `blocked_by` is non-empty iff
/// `overall == Blocked`; `errors` and `warnings` are exactly the results
/// with the matching severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub overall: OverallStatus,
    pub results: Vec<ValidatorResult>,
    pub requires_human_decision: bool,
    pub consensus_reached: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<ValidatorResult>,
    #[serde(default)]
    pub errors: Vec<ValidatorResult>,
}

impl ValidationSummary {
    /// A summary for a run in which no validator was applicable.
    pub fn empty() -> Self {
        Self {
            overall: OverallStatus::Approved,
            results: Vec::new(),
            requires_human_decision: false,
            consensus_reached: true,
            blocked_by: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.overall == OverallStatus::Blocked
    }
}
