//! Aggregation of validator results into a [`ValidationSummary`].

use crate::consensus::{self, ConsensusConfig};
use crate::result::{
    OverallStatus, Severity, ValidationSummary, ValidatorResult, ValidatorStatus,
};
use crate::validator::ValidatorDefinition;

/// Whether this validator's result blocks the run.
fn blocks(def: &ValidatorDefinition, result: &ValidatorResult) -> bool {
    (def.behavior.required && result.status != ValidatorStatus::Approved)
        || (def.behavior.block_on_failure && result.status == ValidatorStatus::Rejected)
}

/// Build the summary for one run.
///
/// `defs` is the applicable validator list the results came from; results
/// from validators not present (composite children) simply cannot block.
pub fn aggregate(
    results: Vec<ValidatorResult>,
    defs: &[ValidatorDefinition],
    consensus_config: &ConsensusConfig,
) -> ValidationSummary {
    let def_of = |id: &str| defs.iter().find(|d| d.id == id);

    let blocked_by: Vec<String> = results
        .iter()
        .filter(|r| def_of(&r.validator_id).is_some_and(|d| blocks(d, r)))
        .map(|r| r.validator_id.clone())
        .collect();

    let errors: Vec<ValidatorResult> = results
        .iter()
        .filter(|r| r.severity == Severity::Error)
        .cloned()
        .collect();
    let warnings: Vec<ValidatorResult> = results
        .iter()
        .filter(|r| r.severity == Severity::Warning)
        .cloned()
        .collect();

    let overall = if !blocked_by.is_empty() {
        OverallStatus::Blocked
    } else if results
        .iter()
        .all(|r| matches!(r.status, ValidatorStatus::Approved | ValidatorStatus::Skipped))
    {
        OverallStatus::Approved
    } else if results.iter().any(|r| r.status == ValidatorStatus::Rejected) {
        OverallStatus::Rejected
    } else if results
        .iter()
        .any(|r| r.status == ValidatorStatus::NeedsRevision)
    {
        OverallStatus::NeedsRevision
    } else {
        // Only Skipped/TimedOut remain; vacuously approved.
        OverallStatus::Approved
    };

    let weight_of = |id: &str| {
        def_of(id)
            .and_then(|d| d.behavior.weight)
            .unwrap_or(1)
    };
    let outcome = consensus::evaluate(consensus_config, &results, weight_of);

    let requires_human_decision =
        (!blocked_by.is_empty() || !outcome.reached) && consensus_config.escalate_to_human;

    ValidationSummary {
        overall,
        results,
        requires_human_decision,
        consensus_reached: outcome.reached,
        blocked_by,
        warnings,
        errors,
    }
}
