//! Pipeline orchestrator: applicability, ordering, execution, timeouts,
//! short-circuiting, aggregation, and human escalation.
//!
//! Validator-level failures (crashes, timeouts, unreachable providers)
//! always become results inside the summary; `validate` only errors on
//! orchestrator-internal faults. The summary is never partially built.

use crate::cache::{CacheStats, ResultCache, ResultCacheConfig};
use crate::consensus::ConsensusConfig;
use crate::context::{TriggerKind, ValidationContext};
use crate::error::{PipelineError, PipelineResult, RegistryError};
use crate::human::{
    DecisionKind, DecisionOptions, DecisionResponse, HumanDecisionHandler,
};
use crate::registry::ValidatorRegistry;
use crate::result::{
    OverallStatus, Severity, ValidationSummary, ValidatorResult, ValidatorStatus,
};
use crate::runners::critic::{CriticProvider, CriticRunner};
use crate::runners::static_cmd::{CommandRunner, StaticRunner};
use crate::summary;
use crate::validator::{FailureMode, TimeoutAction, ValidatorDefinition, ValidatorKind};
use futures::future::{BoxFuture, join_all};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use vigil_context::{ContextResolver, MergedRules, RealFileSystem};

/// How applicable validators are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionModel {
    /// Run in priority order, stopping at the first blocking failure.
    #[default]
    TurnBased,
    /// Launch all validators concurrently and wait for every one to settle.
    Parallel,
}

/// Pipeline-level configuration. Validators cannot override the execution
/// model; it is a property of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub execution_model: ExecutionModel,
    /// Timeout for validators that do not set their own.
    pub default_timeout_ms: u32,
    pub cache_enabled: bool,
    pub cache: ResultCacheConfig,
    pub consensus: ConsensusConfig,
    /// Root of the hierarchical rule-file directory; `None` disables
    /// context resolution.
    pub context_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            execution_model: ExecutionModel::TurnBased,
            default_timeout_ms: 30_000,
            cache_enabled: true,
            cache: ResultCacheConfig::default(),
            consensus: ConsensusConfig::default(),
            context_dir: None,
        }
    }
}

/// The validation pipeline. All components are owned; disposal releases
/// them (no process-wide singletons).
pub struct Pipeline {
    config: PipelineConfig,
    registry: RwLock<ValidatorRegistry>,
    cache: ResultCache,
    resolver: Option<Arc<ContextResolver>>,
    static_runner: Arc<dyn StaticRunner>,
    critic: CriticRunner,
    handler: RwLock<Option<HumanDecisionHandler>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("cached_results", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Whether turn-based iteration stops after this validator's result.
fn stop_requested(def: &ValidatorDefinition, result: &ValidatorResult) -> bool {
    if def.behavior.required && result.status != ValidatorStatus::Approved {
        return true;
    }
    result.status == ValidatorStatus::Rejected && def.behavior.block_on_failure
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let resolver = config
            .context_dir
            .as_ref()
            .map(|dir| Arc::new(ContextResolver::new(dir.clone(), Arc::new(RealFileSystem))));
        let cache = ResultCache::new(config.cache.clone());
        Self {
            config,
            registry: RwLock::new(ValidatorRegistry::new()),
            cache,
            resolver,
            static_runner: Arc::new(CommandRunner::new()),
            critic: CriticRunner::new(),
            handler: RwLock::new(None),
        }
    }

    /// Replace the static runner (e.g. with a fake in tests).
    pub fn with_static_runner(mut self, runner: Arc<dyn StaticRunner>) -> Self {
        self.static_runner = runner;
        self
    }

    /// Append an AI critic provider; providers are tried in order.
    pub fn with_critic_provider(mut self, provider: Arc<dyn CriticProvider>) -> Self {
        self.critic = self.critic.with_provider(provider);
        self
    }

    /// Use a pre-built resolver instead of the one derived from
    /// `context_dir` (shared resolvers, mock filesystems).
    pub fn with_context_resolver(mut self, resolver: Arc<ContextResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    // ===== Registry surface =====

    pub fn register_validator(&self, def: ValidatorDefinition) -> Result<(), RegistryError> {
        self.registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(def)
    }

    pub fn unregister_validator(&self, id: &str) -> bool {
        self.registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .unregister(id)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        self.registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_enabled(id, enabled)
    }

    pub fn get(&self, id: &str) -> Option<ValidatorDefinition> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn list(&self) -> Vec<ValidatorDefinition> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .list()
            .to_vec()
    }

    // ===== Cache surface =====

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn invalidate_cache_for_file(&self, path: &str) {
        self.cache.invalidate_by_file(path);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ===== Collaborators =====

    pub fn context_resolver(&self) -> Option<Arc<ContextResolver>> {
        self.resolver.clone()
    }

    pub fn set_human_handler(&self, handler: HumanDecisionHandler) {
        *self.handler.write().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    pub fn has_pending_human_decision(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(HumanDecisionHandler::has_pending)
    }

    // ===== Validation =====

    /// Run all applicable validators for this trigger and aggregate their
    /// results. The context is mutated only to attach resolved rules.
    pub async fn validate(
        &self,
        trigger: TriggerKind,
        ctx: &mut ValidationContext,
    ) -> PipelineResult<ValidationSummary> {
        let applicable = self
            .registry
            .read()
            .map_err(|_| PipelineError::Internal("validator registry lock poisoned".to_string()))?
            .applicable(trigger, ctx);

        if applicable.is_empty() {
            tracing::debug!(?trigger, "no applicable validators");
            return Ok(ValidationSummary::empty());
        }
        tracing::debug!(
            ?trigger,
            count = applicable.len(),
            files = ctx.files.len(),
            "starting validation"
        );

        self.attach_resolved_rules(ctx);
        let ctx: &ValidationContext = ctx;

        let mut results = Vec::with_capacity(applicable.len());
        match self.config.execution_model {
            ExecutionModel::TurnBased => {
                for def in &applicable {
                    let result = self.run_validator(def, ctx).await;
                    let stop = stop_requested(def, &result);
                    results.push(result);
                    if stop {
                        tracing::debug!(validator = %def.id, "short-circuiting pipeline");
                        break;
                    }
                }
            }
            ExecutionModel::Parallel => {
                let futures: Vec<_> = applicable
                    .iter()
                    .map(|def| self.run_validator(def, ctx))
                    .collect();
                results = join_all(futures).await;
            }
        }

        Ok(summary::aggregate(results, &applicable, &self.config.consensus))
    }

    /// Run `validate`, then route a blocked or unresolved verdict through
    /// the human handler when one is set. An approval (or override)
    /// adjusts the summary to `Approved`, a rejection to `Rejected`;
    /// `Deferred` leaves it unchanged.
    pub async fn validate_with_human_approval(
        &self,
        trigger: TriggerKind,
        ctx: &mut ValidationContext,
    ) -> PipelineResult<(ValidationSummary, Option<DecisionResponse>)> {
        let mut summary = self.validate(trigger, ctx).await?;
        if !summary.requires_human_decision {
            return Ok((summary, None));
        }
        let handler = self
            .handler
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(handler) = handler else {
            return Ok((summary, None));
        };

        let title = if summary.is_blocked() {
            "Validation blocked"
        } else {
            "Validation unresolved"
        };
        let description = if summary.blocked_by.is_empty() {
            "Consensus was not reached; review the results.".to_string()
        } else {
            format!("Blocked by: {}", summary.blocked_by.join(", "))
        };
        let relevant: Vec<ValidatorResult> = summary
            .results
            .iter()
            .filter(|r| {
                summary.blocked_by.contains(&r.validator_id) || r.severity == Severity::Error
            })
            .cloned()
            .collect();

        let ticket = handler.request_decision(
            DecisionKind::ApproveReject,
            title,
            description,
            summary.clone(),
            DecisionOptions {
                timeout_ms: self.config.consensus.timeout_ms,
                relevant,
                ..DecisionOptions::default()
            },
        );
        let response = ticket.wait().await;

        use crate::human::Decision;
        match response.decision {
            Decision::Approved | Decision::Overridden => {
                summary.overall = OverallStatus::Approved;
                summary.requires_human_decision = false;
            }
            Decision::Rejected => {
                summary.overall = OverallStatus::Rejected;
                summary.requires_human_decision = false;
            }
            Decision::Deferred | Decision::Cancelled => {}
        }
        Ok((summary, Some(response)))
    }

    fn attach_resolved_rules(&self, ctx: &mut ValidationContext) {
        let Some(resolver) = &self.resolver else {
            return;
        };
        for file in &mut ctx.files {
            file.resolved_rules = Some(match resolver.resolve(Path::new(&file.path)) {
                Ok(rules) => rules,
                Err(e) => {
                    tracing::warn!(file = %file.path, error = %e, "context resolution failed, continuing with empty rules");
                    Arc::new(MergedRules::default())
                }
            });
        }
    }

    /// Execute one validator with cache consultation and timeout
    /// enforcement.
    async fn run_validator(
        &self,
        def: &ValidatorDefinition,
        ctx: &ValidationContext,
    ) -> ValidatorResult {
        let cacheable = self.config.cache_enabled && def.behavior.cacheable;
        if cacheable {
            if let Some(mut hit) = self.cache.get(&def.id, ctx) {
                hit.cached = true;
                tracing::debug!(validator = %def.id, "serving cached result");
                return hit;
            }
        }

        let timeout_ms = u64::from(
            def.behavior
                .timeout_ms
                .unwrap_or(self.config.default_timeout_ms),
        );
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.execute_kind(def, ctx),
        )
        .await;

        let result = match outcome {
            Ok(mut result) => {
                result.validator_id = def.id.clone();
                result.duration_ms = started.elapsed().as_millis() as u64;
                result
            }
            Err(_) => {
                let status = if def.behavior.on_timeout == TimeoutAction::Skip {
                    ValidatorStatus::Skipped
                } else {
                    ValidatorStatus::TimedOut
                };
                let severity = if def.behavior.on_timeout == TimeoutAction::Error {
                    Severity::Error
                } else {
                    Severity::Warning
                };
                tracing::warn!(validator = %def.id, timeout_ms, "validator timed out");
                ValidatorResult::new(
                    &def.id,
                    status,
                    severity,
                    format!("Validator '{}' timed out after {timeout_ms} ms", def.name),
                )
                .with_duration(started.elapsed().as_millis() as u64)
            }
        };

        if cacheable
            && !matches!(
                result.status,
                ValidatorStatus::TimedOut | ValidatorStatus::Skipped
            )
        {
            self.cache.set(&def.id, ctx, &result);
        }
        result
    }

    async fn execute_kind(
        &self,
        def: &ValidatorDefinition,
        ctx: &ValidationContext,
    ) -> ValidatorResult {
        match &def.kind {
            ValidatorKind::Static { command } => {
                match self.static_runner.run(def, command, ctx).await {
                    Ok(result) => result,
                    Err(e) => ValidatorResult::rejected(
                        &def.id,
                        Severity::Error,
                        format!("Static validator execution failed: {e}"),
                    ),
                }
            }
            ValidatorKind::AiCritic(config) => self.critic.run(def, config, ctx).await,
            ValidatorKind::Custom(validator) => match validator.validate(ctx).await {
                Ok(result) => result,
                Err(e) => ValidatorResult::rejected(
                    &def.id,
                    Severity::Error,
                    format!("Validator execution failed: {e}"),
                ),
            },
            ValidatorKind::Composite { children } => {
                self.execute_composite(def, children, ctx).await
            }
        }
    }

    async fn run_composite_child(
        &self,
        composite_id: &str,
        entry: &Result<ValidatorDefinition, String>,
        ctx: &ValidationContext,
    ) -> ValidatorResult {
        match entry {
            Ok(child) => self.run_validator(child, ctx).await,
            Err(missing) => {
                tracing::warn!(composite = %composite_id, child = %missing, "composite child not found");
                ValidatorResult::skipped(
                    missing,
                    format!("Validator '{missing}' not found in registry"),
                )
            }
        }
    }

    /// Composite execution recurses through `run_validator`; the boxed
    /// future breaks the otherwise-infinite future type.
    fn execute_composite<'a>(
        &'a self,
        def: &'a ValidatorDefinition,
        children: &'a [String],
        ctx: &'a ValidationContext,
    ) -> BoxFuture<'a, ValidatorResult> {
        Box::pin(async move {
            let resolved: Vec<Result<ValidatorDefinition, String>> = {
                let registry = self.registry.read().unwrap_or_else(|e| e.into_inner());
                children
                    .iter()
                    .map(|id| registry.get(id).cloned().ok_or_else(|| id.clone()))
                    .collect()
            };

            let child_results: Vec<ValidatorResult> = match self.config.execution_model {
                ExecutionModel::TurnBased => {
                    let mut out = Vec::with_capacity(resolved.len());
                    for entry in &resolved {
                        out.push(self.run_composite_child(&def.id, entry, ctx).await);
                    }
                    out
                }
                ExecutionModel::Parallel => {
                    join_all(
                        resolved
                            .iter()
                            .map(|entry| self.run_composite_child(&def.id, entry, ctx)),
                    )
                    .await
                }
            };

            let all_pass = child_results.iter().all(|r| {
                matches!(
                    r.status,
                    ValidatorStatus::Approved | ValidatorStatus::Skipped
                )
            });
            let status = if all_pass {
                ValidatorStatus::Approved
            } else if child_results
                .iter()
                .any(|r| r.status == ValidatorStatus::Rejected)
            {
                ValidatorStatus::Rejected
            } else if child_results
                .iter()
                .any(|r| r.status == ValidatorStatus::NeedsRevision)
            {
                ValidatorStatus::NeedsRevision
            } else {
                ValidatorStatus::Skipped
            };
            let severity = match status {
                ValidatorStatus::Approved => Severity::Info,
                ValidatorStatus::Rejected => match def.behavior.on_failure {
                    FailureMode::Error => Severity::Error,
                    FailureMode::Warning => Severity::Warning,
                },
                _ => Severity::Warning,
            };
            let approved_count = child_results.iter().filter(|r| r.is_approved()).count();
            let message = format!(
                "{approved_count}/{} child validators approved",
                child_results.len()
            );

            ValidatorResult::new(&def.id, status, severity, message).with_metadata(
                "child_results",
                serde_json::to_value(&child_results).unwrap_or_default(),
            )
        })
    }
}
