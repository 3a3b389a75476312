//! Consensus evaluation over validator results.
//!
//! Skipped and timed-out validators drop out of the vote: a validator whose
//! timeout action is `Skip` contributes nothing, by design.

use crate::result::{ValidatorResult, ValidatorStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    /// Every valid result is approved.
    Unanimous,
    /// Strictly more than half of valid results are approved.
    Majority,
    /// At least one valid result is approved.
    AnyApprove,
    /// No valid result is rejected.
    NoRejections,
    /// Approval weight strictly exceeds half the total weight.
    Weighted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub strategy: ConsensusStrategy,
    /// Minimum number of valid (non-skipped, non-timed-out) results before
    /// consensus can be reached at all.
    pub minimum_responses: usize,
    /// Route unresolved or blocked verdicts to the human handler.
    pub escalate_to_human: bool,
    /// Advisory decision timeout surfaced to the human handler; the
    /// pipeline itself never blocks on it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            strategy: ConsensusStrategy::Majority,
            minimum_responses: 1,
            escalate_to_human: true,
            timeout_ms: None,
        }
    }
}

/// Outcome of a consensus evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusOutcome {
    pub reached: bool,
    pub approved: bool,
    /// Why consensus was not reached, when it wasn't.
    pub reason: Option<&'static str>,
}

/// Evaluate consensus over `results`. `weight_of` maps a validator id to
/// its vote weight; missing weights default to 1 at the call site.
pub fn evaluate(
    config: &ConsensusConfig,
    results: &[ValidatorResult],
    weight_of: impl Fn(&str) -> u32,
) -> ConsensusOutcome {
    let valid: Vec<&ValidatorResult> = results
        .iter()
        .filter(|r| !matches!(r.status, ValidatorStatus::Skipped | ValidatorStatus::TimedOut))
        .collect();

    if valid.len() < config.minimum_responses {
        return ConsensusOutcome {
            reached: false,
            approved: false,
            reason: Some("insufficient_responses"),
        };
    }

    let approved_count = valid
        .iter()
        .filter(|r| r.status == ValidatorStatus::Approved)
        .count();

    match config.strategy {
        ConsensusStrategy::Unanimous => {
            let approved = approved_count == valid.len();
            ConsensusOutcome {
                reached: approved,
                approved,
                reason: (!approved).then_some("not_unanimous"),
            }
        }
        ConsensusStrategy::Majority => ConsensusOutcome {
            reached: true,
            approved: approved_count * 2 > valid.len(),
            reason: None,
        },
        ConsensusStrategy::AnyApprove => ConsensusOutcome {
            reached: true,
            approved: approved_count > 0,
            reason: None,
        },
        ConsensusStrategy::NoRejections => ConsensusOutcome {
            reached: true,
            approved: !valid.iter().any(|r| r.status == ValidatorStatus::Rejected),
            reason: None,
        },
        ConsensusStrategy::Weighted => {
            let total: u64 = valid.iter().map(|r| u64::from(weight_of(&r.validator_id))).sum();
            let approved_weight: u64 = valid
                .iter()
                .filter(|r| r.status == ValidatorStatus::Approved)
                .map(|r| u64::from(weight_of(&r.validator_id)))
                .sum();
            ConsensusOutcome {
                reached: true,
                approved: approved_weight * 2 > total,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::Severity;

    fn result(id: &str, status: ValidatorStatus) -> ValidatorResult {
        ValidatorResult::new(id, status, Severity::Info, "")
    }

    fn config(strategy: ConsensusStrategy, minimum: usize) -> ConsensusConfig {
        ConsensusConfig {
            strategy,
            minimum_responses: minimum,
            ..ConsensusConfig::default()
        }
    }

    const UNIT: fn(&str) -> u32 = |_| 1;

    #[test]
    fn test_insufficient_responses() {
        let results = vec![result("a", ValidatorStatus::Approved)];
        let outcome = evaluate(&config(ConsensusStrategy::Majority, 2), &results, UNIT);
        assert!(!outcome.reached);
        assert!(!outcome.approved);
        assert_eq!(outcome.reason, Some("insufficient_responses"));
    }

    #[test]
    fn test_skipped_and_timed_out_excluded() {
        // Two skipped plus one approved: only one valid response.
        let results = vec![
            result("a", ValidatorStatus::Skipped),
            result("b", ValidatorStatus::TimedOut),
            result("c", ValidatorStatus::Approved),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Majority, 2), &results, UNIT);
        assert_eq!(outcome.reason, Some("insufficient_responses"));

        let outcome = evaluate(&config(ConsensusStrategy::Majority, 1), &results, UNIT);
        assert!(outcome.reached);
        assert!(outcome.approved);
    }

    #[test]
    fn test_unanimous() {
        let all_approved = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::Approved),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Unanimous, 1), &all_approved, UNIT);
        assert!(outcome.reached);
        assert!(outcome.approved);

        let mixed = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::NeedsRevision),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Unanimous, 1), &mixed, UNIT);
        assert!(!outcome.reached);
        assert!(!outcome.approved);
        assert_eq!(outcome.reason, Some("not_unanimous"));
    }

    #[test]
    fn test_majority_strict() {
        // 2 of 3 approve: majority.
        let results = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::Approved),
            result("c", ValidatorStatus::Rejected),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Majority, 1), &results, UNIT);
        assert!(outcome.reached);
        assert!(outcome.approved);

        // 2 of 4 approve: a tie is not a majority.
        let results = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::Approved),
            result("c", ValidatorStatus::Rejected),
            result("d", ValidatorStatus::NeedsRevision),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Majority, 1), &results, UNIT);
        assert!(outcome.reached);
        assert!(!outcome.approved);
    }

    #[test]
    fn test_any_approve() {
        let results = vec![
            result("a", ValidatorStatus::Rejected),
            result("b", ValidatorStatus::Approved),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::AnyApprove, 1), &results, UNIT);
        assert!(outcome.approved);

        let results = vec![result("a", ValidatorStatus::Rejected)];
        let outcome = evaluate(&config(ConsensusStrategy::AnyApprove, 1), &results, UNIT);
        assert!(outcome.reached);
        assert!(!outcome.approved);
    }

    #[test]
    fn test_no_rejections() {
        let results = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::NeedsRevision),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::NoRejections, 1), &results, UNIT);
        assert!(outcome.approved);

        let results = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::Rejected),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::NoRejections, 1), &results, UNIT);
        assert!(!outcome.approved);
    }

    #[test]
    fn test_weighted() {
        let results = vec![
            result("heavy", ValidatorStatus::Approved),
            result("light-1", ValidatorStatus::Rejected),
            result("light-2", ValidatorStatus::Rejected),
        ];
        let weight = |id: &str| if id == "heavy" { 5 } else { 1 };
        let outcome = evaluate(&config(ConsensusStrategy::Weighted, 1), &results, weight);
        assert!(outcome.approved, "5 of 7 weight approves");

        // Exactly half the weight does not pass.
        let results = vec![
            result("a", ValidatorStatus::Approved),
            result("b", ValidatorStatus::Rejected),
        ];
        let outcome = evaluate(&config(ConsensusStrategy::Weighted, 1), &results, UNIT);
        assert!(!outcome.approved);
    }

    #[test]
    fn test_empty_results_with_zero_minimum() {
        let outcome = evaluate(&config(ConsensusStrategy::Majority, 0), &[], UNIT);
        assert!(outcome.reached);
        assert!(!outcome.approved);
    }
}
