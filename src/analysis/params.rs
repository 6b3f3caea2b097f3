use std::{collections::HashSet, fmt::Debug, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{bounding::ContributionBounds, errors::UtilityAnalysisError};
use crate::mechanisms::noise::NoiseKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Count,
    PrivacyIdCount,
    Sum,
    Mean,
    Variance,
}

impl Metric {
    /// Whether utility analysis has a closed-form error model for the metric.
    pub fn is_supported_for_utility_analysis(&self) -> bool {
        matches!(self, Metric::Count | Metric::PrivacyIdCount)
    }
}

/// User-supplied aggregation. DP aggregations accept them, utility analysis
/// rejects them because their error has no closed form.
pub trait CustomCombiner: Debug + Send + Sync {
    fn name(&self) -> &str;
}

/// Parameters of a DP aggregation, as the caller would pass them to the DP
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateParams {
    pub noise_kind: NoiseKind,
    pub metrics: Vec<Metric>,
    pub max_partitions_contributed: u64,
    pub max_contributions_per_partition: u64,
    #[serde(skip)]
    pub custom_combiners: Option<Vec<Arc<dyn CustomCombiner>>>,
    #[serde(default)]
    pub contribution_bounds_already_enforced: bool,
}

impl AggregateParams {
    pub fn new(
        noise_kind: NoiseKind,
        metrics: Vec<Metric>,
        max_partitions_contributed: u64,
        max_contributions_per_partition: u64,
    ) -> Self {
        Self {
            noise_kind,
            metrics,
            max_partitions_contributed,
            max_contributions_per_partition,
            custom_combiners: None,
            contribution_bounds_already_enforced: false,
        }
    }

    pub fn with_custom_combiners(
        mut self,
        custom_combiners: Vec<Arc<dyn CustomCombiner>>,
    ) -> Self {
        self.custom_combiners = Some(custom_combiners);
        self
    }

    pub fn with_contribution_bounds_already_enforced(
        mut self,
        enforced: bool,
    ) -> Self {
        self.contribution_bounds_already_enforced = enforced;
        self
    }

    /// Checks that the parameters can be analyzed, without looking at any
    /// data.
    pub fn validate(&self) -> Result<ValidatedParams, UtilityAnalysisError> {
        if self.custom_combiners.is_some() {
            return Err(UtilityAnalysisError::CustomCombinersNotSupported);
        }
        if let Some(metric) = self
            .metrics
            .iter()
            .find(|m| !m.is_supported_for_utility_analysis())
        {
            return Err(UtilityAnalysisError::UnsupportedMetric(*metric));
        }
        if self.contribution_bounds_already_enforced {
            return Err(UtilityAnalysisError::ContributionBoundsAlreadyEnforced);
        }
        if self.metrics.is_empty() {
            return Err(UtilityAnalysisError::InvalidParams(
                "at least one metric must be requested".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(metric) = self.metrics.iter().find(|m| !seen.insert(**m)) {
            return Err(UtilityAnalysisError::InvalidParams(format!(
                "metric {metric:?} is requested more than once"
            )));
        }

        let bounds = ContributionBounds::new(
            self.max_partitions_contributed,
            self.max_contributions_per_partition,
        )?;

        Ok(ValidatedParams {
            noise_kind: self.noise_kind,
            metrics: self.metrics.clone(),
            bounds,
        })
    }
}

/// Parameters that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedParams {
    pub noise_kind: NoiseKind,
    /// In request order, without duplicates.
    pub metrics: Vec<Metric>,
    pub bounds: ContributionBounds,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct SumCombiner;

    impl CustomCombiner for SumCombiner {
        fn name(&self) -> &str {
            "sum"
        }
    }

    #[test]
    fn test_validate_default_params() -> Result<(), anyhow::Error> {
        let validated = AggregateParams::mock().validate()?;
        assert_eq!(validated.metrics, vec![Metric::Count]);
        assert_eq!(validated.bounds.max_partitions_contributed, 1);
        Ok(())
    }

    #[test]
    fn test_validation_errors() {
        let params = AggregateParams::mock()
            .with_custom_combiners(vec![Arc::new(SumCombiner)]);
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("custom combiners"));

        let mut params = AggregateParams::mock();
        params.metrics = vec![Metric::Count, Metric::Mean];
        let err = params.validate().unwrap_err();
        assert!(matches!(err, UtilityAnalysisError::UnsupportedMetric(Metric::Mean)));
        assert!(err.to_string().contains("unsupported metric"));

        let params =
            AggregateParams::mock().with_contribution_bounds_already_enforced(true);
        let err = params.validate().unwrap_err();
        assert!(err
            .to_string()
            .contains("contribution bounds are already enforced"));
    }

    #[test]
    fn test_invalid_params() {
        let mut params = AggregateParams::mock();
        params.metrics = vec![];
        assert!(matches!(
            params.validate(),
            Err(UtilityAnalysisError::InvalidParams(_))
        ));

        let mut params = AggregateParams::mock();
        params.metrics = vec![Metric::Count, Metric::Count];
        assert!(matches!(
            params.validate(),
            Err(UtilityAnalysisError::InvalidParams(_))
        ));

        let mut params = AggregateParams::mock();
        params.max_contributions_per_partition = 0;
        assert!(matches!(
            params.validate(),
            Err(UtilityAnalysisError::InvalidParams(_))
        ));
    }
}
