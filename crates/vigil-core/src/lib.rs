//! # vigil-core
//!
//! Validation middleware for code-editing sessions: on a trigger (before a
//! write, before a commit, on demand, ...) run the configured validators
//! against a set of candidate file changes and produce one aggregated
//! verdict used to allow, block, or escalate the change.
//!
//! ```ignore
//! let pipeline = Pipeline::new(PipelineConfig {
//!     context_dir: Some(".vigil/context".into()),
//!     ..PipelineConfig::default()
//! });
//! pipeline.register_validator(
//!     ValidatorDefinition::new("tsc", "TypeScript", ValidatorKind::Static {
//!         command: "tsc --noEmit".into(),
//!     })
//!     .with_trigger(TriggerKind::PreWrite)
//!     .with_file_pattern("**/*.ts"),
//! )?;
//!
//! let mut ctx = ValidationContext::new(TriggerKind::PreWrite, session_id)
//!     .with_file(CandidateFile::new("src/a.ts", content));
//! let summary = pipeline.validate(TriggerKind::PreWrite, &mut ctx).await?;
//! ```
//!
//! Consumers should treat `Approved` as a green light, `Rejected` as a red
//! light, `NeedsRevision` as "surface to the user but do not auto-apply",
//! and `Blocked` as "must route through the human handler".

/// Content-hash-keyed result memoization.
pub mod cache;
/// Consensus strategies over validator results.
pub mod consensus;
/// Validation input bundle (trigger, candidate files, session state).
pub mod context;
/// Error types.
pub mod error;
/// Awaitable human decisions.
pub mod human;
mod patterns;
/// The orchestrator.
pub mod pipeline;
/// Validator definition table.
pub mod registry;
/// Result and summary types.
pub mod result;
/// Static, AI-critic, and provider runners.
pub mod runners;
/// Aggregation of results into a summary.
pub mod summary;
/// Validator definitions and behavior.
pub mod validator;

pub use cache::{CacheStats, ResultCache, ResultCacheConfig};
pub use consensus::{ConsensusConfig, ConsensusOutcome, ConsensusStrategy};
pub use context::{
    Action, CandidateFile, GitStatus, ToolCall, ToolResult, TriggerKind, ValidationContext,
};
pub use error::{PipelineError, PipelineResult, ProviderError, RegistryError, RunnerError};
pub use human::{
    Decision, DecisionKind, DecisionOptions, DecisionRequest, DecisionResponse, DecisionSubscriber,
    DecisionTicket, FeedEntry, FeedEntryKind, HandlerConfig, HumanDecisionHandler,
};
pub use pipeline::{ExecutionModel, Pipeline, PipelineConfig};
pub use registry::ValidatorRegistry;
pub use result::{
    OverallStatus, ResultDetails, Severity, ValidationSummary, ValidatorResult, ValidatorStatus,
};
pub use runners::{
    CliCriticProvider, CommandRunner, CriticProvider, CriticRunner, HttpCriticProvider,
    OutputFormat, StaticRunner,
};
pub use validator::{
    AiCriticConfig, Behavior, ContextConfig, CustomValidator, FailureMode, TimeoutAction,
    ValidatorDefinition, ValidatorKind,
};
