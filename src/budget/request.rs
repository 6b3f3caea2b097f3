use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use super::traits::{BudgetError, MechanismType};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyBudget {
    pub epsilon: f64,
    pub delta: f64,
}

impl PrivacyBudget {
    pub fn new(epsilon: f64, delta: f64) -> Result<Self, BudgetError> {
        if !(epsilon > 0.0 && epsilon.is_finite()) || !(delta >= 0.0) {
            return Err(BudgetError::InvalidTotalBudget { epsilon, delta });
        }
        Ok(Self { epsilon, delta })
    }
}

/// Placeholder for a share of the total budget.
///
/// Cloning a request shares the underlying slot, so every clone observes the
/// resolution performed by the accountant. The slot is write-once.
#[derive(Debug, Clone)]
pub struct BudgetRequest {
    id: usize,
    mechanism_type: MechanismType,
    weight: f64,
    resolved: Arc<OnceLock<PrivacyBudget>>,
}

impl BudgetRequest {
    pub(crate) fn new(
        id: usize,
        mechanism_type: MechanismType,
        weight: f64,
    ) -> Self {
        Self {
            id,
            mechanism_type,
            weight,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn mechanism_type(&self) -> MechanismType {
        self.mechanism_type
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// Returns the resolved budget, or `UnresolvedBudget` if the accountant
    /// has not computed budgets yet.
    pub fn budget(&self) -> Result<PrivacyBudget, BudgetError> {
        self.resolved
            .get()
            .copied()
            .ok_or(BudgetError::UnresolvedBudget(self.id))
    }

    pub fn eps(&self) -> Result<f64, BudgetError> {
        Ok(self.budget()?.epsilon)
    }

    pub fn delta(&self) -> Result<f64, BudgetError> {
        Ok(self.budget()?.delta)
    }

    pub(crate) fn resolve(
        &self,
        budget: PrivacyBudget,
    ) -> Result<(), BudgetError> {
        self.resolved
            .set(budget)
            .map_err(|_| BudgetError::AlreadyResolved(self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_write_once() -> Result<(), anyhow::Error> {
        let request = BudgetRequest::new(0, MechanismType::Laplace, 1.0);
        let shared = request.clone();
        assert_eq!(request.budget(), Err(BudgetError::UnresolvedBudget(0)));

        request.resolve(PrivacyBudget::new(1.0, 0.0)?)?;
        assert!(shared.is_resolved());
        assert_eq!(shared.eps()?, 1.0);

        let second = request.resolve(PrivacyBudget::new(2.0, 0.0)?);
        assert_eq!(second, Err(BudgetError::AlreadyResolved(0)));
        assert_eq!(shared.eps()?, 1.0);
        Ok(())
    }

    #[test]
    fn test_privacy_budget_validation() {
        assert!(PrivacyBudget::new(0.0, 0.0).is_err());
        assert!(PrivacyBudget::new(1.0, -1e-9).is_err());
        assert!(PrivacyBudget::new(f64::NAN, 0.0).is_err());
        assert!(PrivacyBudget::new(1.0, 0.0).is_ok());
    }
}
