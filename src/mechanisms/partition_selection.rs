use log::{debug, warn};

use crate::budget::request::PrivacyBudget;

/// Upper bound on the number of precomputed keep probabilities. Past it, the
/// last computed value is reused and retention is underestimated.
const MAX_TABULATED_PRIVACY_IDS: usize = 1 << 20;

/// Trait for a private partition selection mechanism.
pub trait PartitionSelectionStrategy {
    /// Probability that a partition with `num_privacy_ids` contributing
    /// privacy ids is released. Non-decreasing in `num_privacy_ids`.
    fn probability_of_keep(&self, num_privacy_ids: u64) -> f64;

    /// Smallest number of privacy ids after which the keep probability no
    /// longer changes.
    fn saturation_point(&self) -> u64;

    /// Expected keep probability when `certain` privacy ids always
    /// contribute and the others contribute independently. `uncertain`
    /// holds `(probability, number of privacy ids)` groups, so the number of
    /// contributors is Poisson-binomial.
    fn expected_probability_of_keep(
        &self,
        certain: u64,
        uncertain: &[(f64, u64)],
    ) -> f64 {
        let saturation = self.saturation_point();
        let num_uncertain: u64 = uncertain.iter().map(|(_, n)| n).sum();
        if certain >= saturation || num_uncertain == 0 {
            return self.probability_of_keep(certain);
        }

        let max_count = (saturation - certain).min(num_uncertain) as usize;
        poisson_binomial_pmf(uncertain, max_count)
            .iter()
            .enumerate()
            .map(|(k, pk)| pk * self.probability_of_keep(certain + k as u64))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }
}

/// `pmf[k]` is the probability that `k` of the privacy ids in `groups`
/// contribute, for `k < max_count`. `pmf[max_count]` holds every count at or
/// past `max_count`.
pub fn poisson_binomial_pmf(groups: &[(f64, u64)], max_count: usize) -> Vec<f64> {
    let m = max_count;
    let mut pmf = vec![0.0; m + 1];
    pmf[0] = 1.0;
    for &(p, n) in groups {
        for _ in 0..n {
            for k in (0..=m).rev() {
                let stay = match k == m {
                    true => pmf[k],
                    false => pmf[k] * (1.0 - p),
                };
                let moved_in = match k {
                    0 => 0.0,
                    _ => pmf[k - 1] * p,
                };
                pmf[k] = stay + moved_in;
            }
        }
    }
    pmf
}

/// Optimal partition selection for (epsilon, delta)-DP (Desfontaines, Voss,
/// Gipson and Mandayam, "Differentially private partition selection", 2022),
/// also known as truncated geometric thresholding.
///
/// The budget is split evenly across the partitions a privacy id may
/// contribute to, so each partition is selected with
/// `(epsilon / max_partitions, delta / max_partitions)`.
#[derive(Debug, Clone)]
pub struct TruncatedGeometricPartitionSelection {
    epsilon: f64,
    delta: f64,
    /// keep_probabilities[n] is the probability of keeping a partition with
    /// n privacy ids, up to saturation.
    keep_probabilities: Vec<f64>,
}

impl TruncatedGeometricPartitionSelection {
    pub fn new(budget: &PrivacyBudget, max_partitions_contributed: u64) -> Self {
        let epsilon = budget.epsilon / max_partitions_contributed as f64;
        let delta = budget.delta / max_partitions_contributed as f64;

        let mut keep_probabilities = vec![0.0];
        let mut previous = 0.0;
        while keep_probabilities.len() < MAX_TABULATED_PRIVACY_IDS {
            let next = Self::next_probability(previous, epsilon, delta);
            keep_probabilities.push(next);
            if next >= 1.0 || next == previous {
                break;
            }
            previous = next;
        }
        let last = keep_probabilities.last().copied().unwrap_or_default();
        if last < 1.0 && keep_probabilities.len() >= MAX_TABULATED_PRIVACY_IDS
        {
            warn!(
                "Partition selection with epsilon={epsilon}, delta={delta} does not saturate within {MAX_TABULATED_PRIVACY_IDS} privacy ids, keep probability stays at {last} past it"
            );
        } else {
            debug!(
                "Partition selection with epsilon={epsilon}, delta={delta} saturates at {} privacy ids",
                keep_probabilities.len() - 1
            );
        }

        Self {
            epsilon,
            delta,
            keep_probabilities,
        }
    }

    /// Whether the table stopped at `MAX_TABULATED_PRIVACY_IDS` before the
    /// keep probability reached 1.
    pub fn is_truncated(&self) -> bool {
        self.keep_probabilities.len() >= MAX_TABULATED_PRIVACY_IDS
            && self.keep_probabilities.last().is_some_and(|p| *p < 1.0)
    }

    /// Per-partition budget actually used by the mechanism.
    pub fn per_partition_budget(&self) -> (f64, f64) {
        (self.epsilon, self.delta)
    }

    fn next_probability(previous: f64, epsilon: f64, delta: f64) -> f64 {
        let grow = epsilon.exp() * previous + delta;
        let shrink = 1.0 - (-epsilon).exp() * (1.0 - delta - previous);
        grow.min(shrink).clamp(0.0, 1.0)
    }
}

impl PartitionSelectionStrategy for TruncatedGeometricPartitionSelection {
    fn probability_of_keep(&self, num_privacy_ids: u64) -> f64 {
        let last = self.keep_probabilities.len() - 1;
        let index = (num_privacy_ids as usize).min(last);
        self.keep_probabilities[index]
    }

    fn saturation_point(&self) -> u64 {
        (self.keep_probabilities.len() - 1) as u64
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn strategy(epsilon: f64, delta: f64) -> TruncatedGeometricPartitionSelection {
        let budget = PrivacyBudget { epsilon, delta };
        TruncatedGeometricPartitionSelection::new(&budget, 1)
    }

    #[test]
    fn test_keep_probability_is_monotone_and_saturates() {
        let s = strategy(1.0, 1e-5);
        assert_eq!(s.probability_of_keep(0), 0.0);
        assert_relative_eq!(s.probability_of_keep(1), 1e-5);

        let mut previous = 0.0;
        for n in 0..200 {
            let p = s.probability_of_keep(n);
            assert!(p >= previous, "not monotone at {n}");
            assert!((0.0..=1.0).contains(&p));
            previous = p;
        }
        assert_eq!(s.probability_of_keep(1_000_000), 1.0);
        assert_eq!(s.probability_of_keep(s.saturation_point()), 1.0);
    }

    #[test]
    fn test_first_regime_is_geometric() {
        let s = strategy(0.5, 1e-8);
        // pi(2) = e^eps * delta + delta
        let expected = 0.5_f64.exp() * 1e-8 + 1e-8;
        assert_relative_eq!(s.probability_of_keep(2), expected);
    }

    #[test]
    fn test_zero_delta_never_keeps() {
        let s = strategy(1.0, 0.0);
        assert_eq!(s.probability_of_keep(1_000), 0.0);
        assert_eq!(s.saturation_point(), 1);
    }

    #[test]
    fn test_budget_is_split_across_partitions() {
        let budget = PrivacyBudget {
            epsilon: 2.0,
            delta: 1e-6,
        };
        let s = TruncatedGeometricPartitionSelection::new(&budget, 4);
        assert_eq!(s.per_partition_budget(), (0.5, 2.5e-7));
    }

    #[test]
    fn test_expected_keep_probability() {
        let s = strategy(1.0, 1e-3);

        // Certain contributors only.
        assert_relative_eq!(
            s.expected_probability_of_keep(5, &[]),
            s.probability_of_keep(5)
        );

        // Probabilities of 1 behave like certain contributors.
        assert_relative_eq!(
            s.expected_probability_of_keep(2, &[(1.0, 3)]),
            s.probability_of_keep(5),
            max_relative = 1e-12
        );

        // One privacy id contributing half of the time.
        let expected =
            0.5 * s.probability_of_keep(3) + 0.5 * s.probability_of_keep(4);
        assert_relative_eq!(
            s.expected_probability_of_keep(3, &[(0.5, 1)]),
            expected,
            max_relative = 1e-12
        );

        // Past saturation nothing changes.
        let saturation = s.saturation_point();
        assert_eq!(s.expected_probability_of_keep(saturation, &[(0.1, 1)]), 1.0);
    }

    #[test]
    fn test_expected_keep_with_distant_saturation() {
        let s = strategy(1e-4, 1e-10);
        assert!(s.saturation_point() > 100_000);

        // Enumerate the 2^3 outcomes of three privacy ids kept with
        // probability 0.5 next to two certain ones.
        let expected: f64 = (0..8u32)
            .map(|outcome| {
                0.125 * s.probability_of_keep(2 + outcome.count_ones() as u64)
            })
            .sum();
        assert_relative_eq!(
            s.expected_probability_of_keep(2, &[(0.5, 3)]),
            expected,
            max_relative = 1e-12
        );

        // The pmf is sized by the number of uncertain privacy ids.
        let pmf = poisson_binomial_pmf(&[(0.5, 200)], 200);
        assert_eq!(pmf.len(), 201);
        assert_relative_eq!(pmf.iter().sum::<f64>(), 1.0, max_relative = 1e-9);
    }

    #[test]
    fn test_pmf_last_bucket_absorbs_overflow() {
        let pmf = poisson_binomial_pmf(&[(0.5, 2), (1.0, 1)], 2);
        // At least one contributor always, two or more 3/4 of the time.
        assert_eq!(pmf.len(), 3);
        assert_relative_eq!(pmf[0], 0.0);
        assert_relative_eq!(pmf[1], 0.25);
        assert_relative_eq!(pmf[2], 0.75);
    }

    #[test]
    fn test_truncated_table_is_reported() {
        assert!(!strategy(1.0, 1e-5).is_truncated());

        let s = strategy(1e-7, 1e-10);
        assert!(s.is_truncated());
        assert!(s.probability_of_keep(u64::MAX) < 1.0);
    }
}
