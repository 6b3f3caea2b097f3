use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::BudgetRequest;

/// Kind of mechanism a budget request is issued for. The accountant only
/// looks at it to decide whether the request consumes delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MechanismType {
    Laplace,
    Gaussian,
    /// Mechanisms such as private partition selection, which need both
    /// epsilon and delta but are not additive noise.
    Generic,
}

impl MechanismType {
    pub fn uses_delta(&self) -> bool {
        match self {
            MechanismType::Laplace => false,
            MechanismType::Gaussian | MechanismType::Generic => true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BudgetError {
    #[error("invalid total budget: epsilon must be > 0 and delta >= 0, got epsilon={epsilon}, delta={delta}")]
    InvalidTotalBudget { epsilon: f64, delta: f64 },

    #[error("invalid budget weight {0}: weights must be finite and > 0")]
    InvalidWeight(f64),

    #[error("unresolved budget: request {0} was read before compute_budgets() was called")]
    UnresolvedBudget(usize),

    #[error("budget was requested after compute_budgets() was called")]
    RequestAfterCompute,

    #[error("budget request {0} was already resolved")]
    AlreadyResolved(usize),
}

/// Trait for a budget accountant following the two-phase protocol:
/// mechanisms first declare what they need with `request_budget`, then the
/// caller splits the total budget once with `compute_budgets`.
pub trait BudgetAccountant: Debug {
    /// Declares a request with the default weight of 1.
    fn request_budget(
        &mut self,
        mechanism_type: MechanismType,
    ) -> Result<BudgetRequest, BudgetError> {
        self.request_budget_with_weight(mechanism_type, 1.0)
    }

    /// Declares a request whose share of the total budget is proportional
    /// to `weight`.
    fn request_budget_with_weight(
        &mut self,
        mechanism_type: MechanismType,
        weight: f64,
    ) -> Result<BudgetRequest, BudgetError>;

    /// Resolves every outstanding request. A second call without new
    /// requests is a no-op.
    fn compute_budgets(&mut self) -> Result<(), BudgetError>;
}
