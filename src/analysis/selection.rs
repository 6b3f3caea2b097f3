use serde::{Deserialize, Serialize};

use super::{
    bounding::PartitionAggregationState,
    estimators::ErrorEstimator,
    metrics::{ErrorMetricKind, PartitionErrorMetrics},
};
use crate::{
    budget::request::PrivacyBudget,
    mechanisms::partition_selection::{
        PartitionSelectionStrategy, TruncatedGeometricPartitionSelection,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionSelectionEstimate {
    /// Privacy ids contributing after deterministic cross-partition
    /// bounding.
    pub num_contributing_privacy_ids: u64,
    /// Expected number of privacy ids contributing after the DP engine's
    /// random cross-partition bounding.
    pub expected_contributing_privacy_ids: f64,
    pub retention_probability: f64,
}

/// Estimates how likely private partition selection keeps each partition.
#[derive(Debug, Clone)]
pub struct PartitionSelectionEstimator {
    strategy: TruncatedGeometricPartitionSelection,
}

impl PartitionSelectionEstimator {
    pub fn new(budget: &PrivacyBudget, max_partitions_contributed: u64) -> Self {
        Self {
            strategy: TruncatedGeometricPartitionSelection::new(
                budget,
                max_partitions_contributed,
            ),
        }
    }

    pub fn estimate(
        &self,
        state: &PartitionAggregationState,
    ) -> PartitionSelectionEstimate {
        let retention_probability = self.strategy.expected_probability_of_keep(
            state.num_certain_privacy_ids,
            &state.uncertain_keep_probabilities(),
        );
        PartitionSelectionEstimate {
            num_contributing_privacy_ids: state.num_retained_privacy_ids,
            expected_contributing_privacy_ids: state.num_privacy_ids as f64
                - state.expected_privacy_ids_dropped(),
            retention_probability,
        }
    }
}

/// Error of the partition selection mechanism, measured on the indicator
/// "the partition is released": the true value is 1 for every partition
/// with data.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionSelectionErrorEstimator;

impl ErrorEstimator for PartitionSelectionErrorEstimator {
    fn kind(&self) -> ErrorMetricKind {
        ErrorMetricKind::PartitionSelection
    }

    fn estimate(
        &self,
        _state: &PartitionAggregationState,
        selection: Option<&PartitionSelectionEstimate>,
    ) -> PartitionErrorMetrics {
        let q = selection.map_or(1.0, |s| s.retention_probability);
        PartitionErrorMetrics::new(
            ErrorMetricKind::PartitionSelection,
            1.0,
            -(1.0 - q),
            q * (1.0 - q),
        )
    }
}
