use log::debug;

use super::{
    request::{BudgetRequest, PrivacyBudget},
    traits::{BudgetAccountant, BudgetError, MechanismType},
};

/// Accountant splitting the total budget with basic composition.
///
/// Epsilon is split across all requests proportionally to their weights.
/// Delta is split the same way, but only across requests whose mechanism
/// consumes delta; the others receive a delta of zero.
#[derive(Debug)]
pub struct NaiveBudgetAccountant {
    total: PrivacyBudget,
    requests: Vec<BudgetRequest>,
    computed: bool,
}

impl NaiveBudgetAccountant {
    pub fn new(
        total_epsilon: f64,
        total_delta: f64,
    ) -> Result<Self, BudgetError> {
        let total = PrivacyBudget::new(total_epsilon, total_delta)?;
        Ok(Self {
            total,
            requests: vec![],
            computed: false,
        })
    }

    pub fn total_budget(&self) -> PrivacyBudget {
        self.total
    }

    /// Requests declared so far, in declaration order.
    pub fn requests(&self) -> &[BudgetRequest] {
        &self.requests
    }
}

impl BudgetAccountant for NaiveBudgetAccountant {
    fn request_budget_with_weight(
        &mut self,
        mechanism_type: MechanismType,
        weight: f64,
    ) -> Result<BudgetRequest, BudgetError> {
        if self.computed {
            return Err(BudgetError::RequestAfterCompute);
        }
        if !(weight > 0.0 && weight.is_finite()) {
            return Err(BudgetError::InvalidWeight(weight));
        }

        let request =
            BudgetRequest::new(self.requests.len(), mechanism_type, weight);
        debug!(
            "Budget request {} declared for {:?} with weight {}",
            request.id(),
            mechanism_type,
            weight
        );
        self.requests.push(request.clone());
        Ok(request)
    }

    fn compute_budgets(&mut self) -> Result<(), BudgetError> {
        if self.computed {
            debug!("Budgets already computed, nothing to do");
            return Ok(());
        }

        let total_weight: f64 = self.requests.iter().map(|r| r.weight()).sum();
        let delta_weight: f64 = self
            .requests
            .iter()
            .filter(|r| r.mechanism_type().uses_delta())
            .map(|r| r.weight())
            .sum();

        for request in &self.requests {
            let epsilon = self.total.epsilon * request.weight() / total_weight;
            let delta = match request.mechanism_type().uses_delta() {
                true => self.total.delta * request.weight() / delta_weight,
                false => 0.0,
            };
            debug!(
                "Resolving budget request {}: epsilon={epsilon}, delta={delta}",
                request.id()
            );
            request.resolve(PrivacyBudget { epsilon, delta })?;
        }

        self.computed = true;
        Ok(())
    }
}
