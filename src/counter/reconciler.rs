//! Turns raw cumulative counter readings into ledger totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::baseline::Baseline;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawReading {
    /// Steps since the last device reboot, as reported by the hardware counter.
    pub cumulative_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl RawReading {
    pub fn new(cumulative_count: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            cumulative_count,
            timestamp,
        }
    }
}

/// What to credit when the counter drops below the baseline (device reboot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ResetPolicy {
    /// The post-reset counter value counts as steps taken since the reset.
    #[default]
    CreditPostResetCount,
    /// Credit exactly one step for the reading that revealed the reset.
    CreditSingleStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First reading for this installation. Nothing may be appended for it.
    BaselineEstablished,
    Advanced { delta: u64 },
    CounterReset { credited: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub total: u64,
    pub baseline: Baseline,
    pub outcome: ReconcileOutcome,
}

impl Reconciliation {
    pub fn should_append(&self) -> bool {
        !matches!(self.outcome, ReconcileOutcome::BaselineEstablished)
    }
}

/// Computes the new running total for `raw`.
///
/// The returned baseline is always `raw.cumulative_count`, and `total` is never
/// below `prior_total`.
pub fn reconcile(
    raw: &RawReading,
    baseline: Option<Baseline>,
    prior_total: u64,
    policy: ResetPolicy,
) -> Reconciliation {
    let next_baseline = Baseline::new(raw.cumulative_count);

    let Some(baseline) = baseline else {
        return Reconciliation {
            total: prior_total,
            baseline: next_baseline,
            outcome: ReconcileOutcome::BaselineEstablished,
        };
    };

    let (total, outcome) = match raw.cumulative_count.checked_sub(baseline.last_cumulative_count) {
        Some(delta) => (
            prior_total.saturating_add(delta),
            ReconcileOutcome::Advanced { delta },
        ),
        None => {
            let credited = match policy {
                ResetPolicy::CreditPostResetCount => raw.cumulative_count,
                ResetPolicy::CreditSingleStep => 1,
            };
            (
                prior_total.saturating_add(credited),
                ReconcileOutcome::CounterReset { credited },
            )
        }
    };

    Reconciliation {
        total,
        baseline: next_baseline,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn reading(count: u64) -> RawReading {
        RawReading::new(count, Utc::now())
    }

    #[test]
    fn first_reading_only_sets_baseline() {
        let result = reconcile(&reading(100), None, 42, ResetPolicy::default());

        assert_eq!(result.outcome, ReconcileOutcome::BaselineEstablished);
        assert_eq!(result.total, 42);
        assert_eq!(result.baseline, Baseline::new(100));
        assert!(!result.should_append());
    }

    #[test]
    fn forward_reading_adds_delta() {
        let result = reconcile(
            &reading(105),
            Some(Baseline::new(100)),
            0,
            ResetPolicy::default(),
        );

        assert_eq!(result.outcome, ReconcileOutcome::Advanced { delta: 5 });
        assert_eq!(result.total, 5);
        assert_eq!(result.baseline, Baseline::new(105));
        assert!(result.should_append());
    }

    #[test]
    fn unchanged_counter_still_appends() {
        let result = reconcile(&reading(7), Some(Baseline::new(7)), 30, ResetPolicy::default());
        assert_eq!(result.outcome, ReconcileOutcome::Advanced { delta: 0 });
        assert_eq!(result.total, 30);
    }

    #[rstest]
    #[case(ResetPolicy::CreditPostResetCount, 3, 8)]
    #[case(ResetPolicy::CreditSingleStep, 1, 6)]
    fn reset_follows_policy(
        #[case] policy: ResetPolicy,
        #[case] credited: u64,
        #[case] total: u64,
    ) {
        let result = reconcile(&reading(3), Some(Baseline::new(105)), 5, policy);

        assert_eq!(result.outcome, ReconcileOutcome::CounterReset { credited });
        assert_eq!(result.total, total);
        assert_eq!(result.baseline, Baseline::new(3));
    }

    #[test]
    fn reset_to_zero_credits_nothing_under_default_policy() {
        let result = reconcile(&reading(0), Some(Baseline::new(50)), 9, ResetPolicy::default());
        assert_eq!(result.outcome, ReconcileOutcome::CounterReset { credited: 0 });
        assert_eq!(result.total, 9);
    }

    #[test]
    fn total_saturates_instead_of_wrapping() {
        let result = reconcile(
            &reading(u64::MAX),
            Some(Baseline::new(0)),
            10,
            ResetPolicy::default(),
        );
        assert_eq!(result.total, u64::MAX);
    }

    fn policy_strategy() -> impl Strategy<Value = ResetPolicy> {
        prop_oneof![
            Just(ResetPolicy::CreditPostResetCount),
            Just(ResetPolicy::CreditSingleStep),
        ]
    }

    proptest! {
        #[test]
        fn totals_never_decrease(
            counts in prop::collection::vec(0u64..1_000_000, 1..64),
            policy in policy_strategy(),
        ) {
            let mut baseline = None;
            let mut total = 0u64;
            for count in counts {
                let result = reconcile(&reading(count), baseline, total, policy);
                prop_assert!(result.total >= total);
                prop_assert_eq!(result.baseline.last_cumulative_count, count);
                baseline = Some(result.baseline);
                total = result.total;
            }
        }

        #[test]
        fn monotonic_counter_sums_deltas(
            start in 0u64..1_000_000,
            steps in prop::collection::vec(0u64..500, 0..64),
        ) {
            let mut baseline = None;
            let mut total = 0u64;
            let mut count = start;
            let first = reconcile(&reading(count), baseline, total, ResetPolicy::default());
            baseline = Some(first.baseline);
            total = first.total;

            for step in &steps {
                count += step;
                let result = reconcile(&reading(count), baseline, total, ResetPolicy::default());
                baseline = Some(result.baseline);
                total = result.total;
            }

            prop_assert_eq!(total, steps.iter().sum::<u64>());
        }
    }
}
