//! Error types for the validation pipeline.
//!
//! Most failure modes in this crate are deliberately *not* errors: a
//! validator that crashes, times out, or cannot reach its provider becomes
//! a [`ValidatorResult`](crate::result::ValidatorResult) inside the summary
//! so one bad check never aborts a validation run. The enums here cover the
//! remaining cases: rejecting an invalid definition at registration time,
//! runner-internal faults that the orchestrator maps to results, and
//! orchestrator invariants that genuinely must propagate.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by [`Pipeline`](crate::pipeline::Pipeline) entry points.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An orchestrator-internal invariant broke (poisoned lock, impossible
    /// state). Recoverable validator-level conditions never take this path.
    #[error("Pipeline execution failed: {0}")]
    Internal(String),
}

/// Errors raised when registering a validator definition.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid validator definition '{id}': {reason}")]
    InvalidDefinition { id: String, reason: String },

    #[error("Composite validator '{id}' references unknown child '{child}'")]
    UnknownChild { id: String, child: String },
}

/// Errors from the static command runner.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to collect command output: {0}")]
    Io(#[source] std::io::Error),
}

/// Errors from an AI critic provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),
}
