use thiserror::Error;

use super::params::Metric;
use crate::{budget::traits::BudgetError, mechanisms::MechanismError};

#[derive(Debug, Error)]
pub enum UtilityAnalysisError {
    #[error("custom combiners are not supported for utility analysis")]
    CustomCombinersNotSupported,

    #[error("unsupported metric in metrics: {0:?} has no closed-form error model")]
    UnsupportedMetric(Metric),

    #[error("contribution bounds are already enforced: utility analysis needs the raw contributions")]
    ContributionBoundsAlreadyEnforced,

    #[error("invalid aggregate params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error(transparent)]
    Mechanism(#[from] MechanismError),
}
