use std::fmt::Debug;

use super::{
    bounding::{ContributionBounds, PartitionAggregationState},
    errors::UtilityAnalysisError,
    metrics::{ErrorMetricKind, PartitionErrorMetrics},
    params::Metric,
    selection::PartitionSelectionEstimate,
};
use crate::{
    budget::request::PrivacyBudget,
    mechanisms::noise::{NoiseKind, NoiseVariance, Sensitivities},
};

/// Trait for the per-partition error model of one mechanism.
///
/// `selection` is provided when the partition may be dropped by private
/// partition selection and that effect must be part of the error.
pub trait ErrorEstimator: Debug + Send + Sync {
    fn kind(&self) -> ErrorMetricKind;

    fn estimate(
        &self,
        state: &PartitionAggregationState,
        selection: Option<&PartitionSelectionEstimate>,
    ) -> PartitionErrorMetrics;
}

/// Builds the estimator of `metric` once its budget is known.
pub fn metric_error_estimator(
    metric: Metric,
    noise_kind: NoiseKind,
    bounds: &ContributionBounds,
    budget: &PrivacyBudget,
    noise_variance: &dyn NoiseVariance,
) -> Result<Box<dyn ErrorEstimator>, UtilityAnalysisError> {
    let l0 = bounds.max_partitions_contributed as f64;
    let estimator: Box<dyn ErrorEstimator> = match metric {
        Metric::Count => {
            let sensitivities = Sensitivities::new(
                l0,
                bounds.max_contributions_per_partition as f64,
            );
            Box::new(CountErrorEstimator {
                noise_variance: noise_variance.variance(
                    noise_kind,
                    &sensitivities,
                    budget,
                )?,
            })
        }
        Metric::PrivacyIdCount => {
            let sensitivities = Sensitivities::new(l0, 1.0);
            Box::new(PrivacyIdCountErrorEstimator {
                noise_variance: noise_variance.variance(
                    noise_kind,
                    &sensitivities,
                    budget,
                )?,
            })
        }
        other => return Err(UtilityAnalysisError::UnsupportedMetric(other)),
    };
    Ok(estimator)
}

fn apply_selection(
    error: PartitionErrorMetrics,
    selection: Option<&PartitionSelectionEstimate>,
) -> PartitionErrorMetrics {
    match selection {
        Some(s) => error.with_partition_selection(s.retention_probability),
        None => error,
    }
}

/// COUNT: bias comes from the contributions dropped by bounding, variance
/// from the noise and from the random choice of partitions kept per privacy
/// id.
#[derive(Debug, Clone)]
pub struct CountErrorEstimator {
    pub noise_variance: f64,
}

impl ErrorEstimator for CountErrorEstimator {
    fn kind(&self) -> ErrorMetricKind {
        ErrorMetricKind::Count
    }

    fn estimate(
        &self,
        state: &PartitionAggregationState,
        selection: Option<&PartitionSelectionEstimate>,
    ) -> PartitionErrorMetrics {
        let bias = -(state.per_partition_dropped as f64
            + state.expected_cross_partition_dropped);
        let variance = self.noise_variance + state.cross_partition_variance;
        let error = PartitionErrorMetrics::new(
            ErrorMetricKind::Count,
            state.true_count as f64,
            bias,
            variance,
        );
        apply_selection(error, selection)
    }
}

/// PRIVACY_ID_COUNT: only cross-partition bounding can remove a privacy id
/// from a partition.
#[derive(Debug, Clone)]
pub struct PrivacyIdCountErrorEstimator {
    pub noise_variance: f64,
}

impl ErrorEstimator for PrivacyIdCountErrorEstimator {
    fn kind(&self) -> ErrorMetricKind {
        ErrorMetricKind::PrivacyIdCount
    }

    fn estimate(
        &self,
        state: &PartitionAggregationState,
        selection: Option<&PartitionSelectionEstimate>,
    ) -> PartitionErrorMetrics {
        let error = PartitionErrorMetrics::new(
            ErrorMetricKind::PrivacyIdCount,
            state.num_privacy_ids as f64,
            -state.expected_privacy_ids_dropped(),
            self.noise_variance + state.privacy_ids_kept_variance(),
        );
        apply_selection(error, selection)
    }
}
