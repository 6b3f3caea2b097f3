//! Simulation of contribution bounding.
//!
//! Bounding is simulated per privacy id as a pure function of that privacy
//! id's raw per-partition counts, so it can run under any backend. The
//! results are then folded per partition into a
//! [`PartitionAggregationState`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::errors::UtilityAnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionBounds {
    pub max_partitions_contributed: u64,
    pub max_contributions_per_partition: u64,
}

impl ContributionBounds {
    pub fn new(
        max_partitions_contributed: u64,
        max_contributions_per_partition: u64,
    ) -> Result<Self, UtilityAnalysisError> {
        if max_partitions_contributed == 0
            || max_contributions_per_partition == 0
        {
            return Err(UtilityAnalysisError::InvalidParams(format!(
                "contribution bounds must be positive, got max_partitions_contributed={max_partitions_contributed}, max_contributions_per_partition={max_contributions_per_partition}"
            )));
        }
        Ok(Self {
            max_partitions_contributed,
            max_contributions_per_partition,
        })
    }
}

/// Contribution of one privacy id to one partition, after bounding.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivacyIdContribution {
    /// Number of records before any bounding.
    pub raw_count: u64,

    /// `raw_count` clipped to `max_contributions_per_partition`.
    pub capped_count: u64,

    /// Whether the deterministic simulation keeps this partition for the
    /// privacy id.
    pub retained: bool,

    /// Number of partitions the privacy id contributes to.
    pub num_partitions: u64,

    /// Probability that uniform sampling of `max_partitions_contributed`
    /// partitions keeps this one.
    pub keep_probability: f64,
}

/// Bounds the contributions of a single privacy id.
///
/// `contributions` holds the raw count per partition key. Keys appearing
/// more than once are merged and zero counts are ignored. When the privacy
/// id contributes to more than `max_partitions_contributed` partitions, the
/// smallest keys are retained.
pub fn bound_privacy_id_contributions<PK: Ord>(
    mut contributions: Vec<(PK, u64)>,
    bounds: &ContributionBounds,
) -> Vec<(PK, PrivacyIdContribution)> {
    contributions.retain(|(_, count)| *count > 0);
    contributions.sort_by(|a, b| a.0.cmp(&b.0));

    let mut merged: Vec<(PK, u64)> = Vec::with_capacity(contributions.len());
    for (key, count) in contributions {
        match merged.last_mut() {
            Some((last_key, last_count)) if *last_key == key => {
                *last_count += count
            }
            _ => merged.push((key, count)),
        }
    }

    let num_partitions = merged.len() as u64;
    let keep_probability = match num_partitions {
        0 => 1.0,
        n => (bounds.max_partitions_contributed as f64 / n as f64).min(1.0),
    };

    merged
        .into_iter()
        .enumerate()
        .map(|(rank, (key, raw_count))| {
            let contribution = PrivacyIdContribution {
                raw_count,
                capped_count: raw_count
                    .min(bounds.max_contributions_per_partition),
                retained: (rank as u64) < bounds.max_partitions_contributed,
                num_partitions,
                keep_probability,
            };
            (key, contribution)
        })
        .collect()
}

/// Per-partition totals after bounding.
///
/// `clipped_count` and `dropped` come from the deterministic simulation.
/// The `expected_*` and variance terms describe the same bounding in
/// expectation over the uniform partition sampling done by the DP engine,
/// and are what the error estimators use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionAggregationState {
    pub true_count: u64,
    pub clipped_count: u64,
    pub dropped: u64,

    /// Contributions removed by the per-partition cap alone.
    pub per_partition_dropped: u64,
    pub expected_cross_partition_dropped: f64,
    pub cross_partition_variance: f64,

    /// Distinct privacy ids contributing before cross-partition bounding.
    pub num_privacy_ids: u64,
    /// Distinct privacy ids retained by the deterministic simulation.
    pub num_retained_privacy_ids: u64,
    /// Privacy ids which are never affected by cross-partition bounding.
    pub num_certain_privacy_ids: u64,
    /// The other privacy ids, keyed by the number of partitions they
    /// contribute to: `(keep probability, number of privacy ids)`.
    pub uncertain_privacy_ids: IndexMap<u64, (f64, u64)>,
}

impl From<PrivacyIdContribution> for PartitionAggregationState {
    fn from(contribution: PrivacyIdContribution) -> Self {
        let mut state = Self::default();
        state.add_contribution(&contribution);
        state
    }
}

impl PartitionAggregationState {
    pub fn add_contribution(&mut self, contribution: &PrivacyIdContribution) {
        let capped = contribution.capped_count;
        let p = contribution.keep_probability;

        self.true_count += contribution.raw_count;
        if contribution.retained {
            self.clipped_count += capped;
            self.num_retained_privacy_ids += 1;
        }
        self.dropped = self.true_count - self.clipped_count;

        self.per_partition_dropped += contribution.raw_count - capped;
        self.expected_cross_partition_dropped += capped as f64 * (1.0 - p);
        self.cross_partition_variance +=
            (capped as f64).powi(2) * p * (1.0 - p);

        self.num_privacy_ids += 1;
        if p >= 1.0 {
            self.num_certain_privacy_ids += 1;
        } else {
            self.uncertain_privacy_ids
                .entry(contribution.num_partitions)
                .or_insert((p, 0))
                .1 += 1;
        }
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.true_count += other.true_count;
        self.clipped_count += other.clipped_count;
        self.dropped = self.true_count - self.clipped_count;
        self.per_partition_dropped += other.per_partition_dropped;
        self.expected_cross_partition_dropped +=
            other.expected_cross_partition_dropped;
        self.cross_partition_variance += other.cross_partition_variance;
        self.num_privacy_ids += other.num_privacy_ids;
        self.num_retained_privacy_ids += other.num_retained_privacy_ids;
        self.num_certain_privacy_ids += other.num_certain_privacy_ids;
        for (num_partitions, (p, count)) in other.uncertain_privacy_ids {
            self.uncertain_privacy_ids
                .entry(num_partitions)
                .or_insert((p, 0))
                .1 += count;
        }
        self
    }

    /// Expected count once bounding is applied.
    pub fn expected_bounded_count(&self) -> f64 {
        self.true_count as f64
            - self.per_partition_dropped as f64
            - self.expected_cross_partition_dropped
    }

    /// Expected number of privacy ids removed by cross-partition bounding.
    pub fn expected_privacy_ids_dropped(&self) -> f64 {
        self.uncertain_privacy_ids
            .values()
            .map(|(p, count)| *count as f64 * (1.0 - p))
            .sum()
    }

    /// Variance of the number of privacy ids kept by cross-partition
    /// bounding.
    pub fn privacy_ids_kept_variance(&self) -> f64 {
        self.uncertain_privacy_ids
            .values()
            .map(|(p, count)| *count as f64 * p * (1.0 - p))
            .sum()
    }

    /// `(keep probability, number of privacy ids)` of the privacy ids
    /// affected by cross-partition bounding.
    pub fn uncertain_keep_probabilities(&self) -> Vec<(f64, u64)> {
        self.uncertain_privacy_ids.values().copied().collect()
    }
}
