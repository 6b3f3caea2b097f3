use std::{f64::consts::SQRT_2, fmt::Debug};

use log::debug;
use serde::{Deserialize, Serialize};
use statrs::function::erf::erfc;

use super::MechanismError;
use crate::budget::{request::PrivacyBudget, traits::MechanismType};

/// Relative accuracy of the analytic Gaussian standard deviation search.
const GAUSSIAN_SIGMA_ACCURACY: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoiseKind {
    Laplace,
    Gaussian,
}

impl NoiseKind {
    pub fn mechanism_type(&self) -> MechanismType {
        match self {
            NoiseKind::Laplace => MechanismType::Laplace,
            NoiseKind::Gaussian => MechanismType::Gaussian,
        }
    }

    pub fn norm_type(&self) -> NormType {
        match self {
            NoiseKind::Laplace => NormType::L1,
            NoiseKind::Gaussian => NormType::L2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    L1,
    L2,
}

/// Sensitivity of a per-partition aggregate, described by how many
/// partitions one privacy id can influence (L0) and by how much it can move
/// each of them (Linf).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sensitivities {
    pub l0: f64,
    pub linf: f64,
}

impl Sensitivities {
    pub fn new(l0: f64, linf: f64) -> Self {
        Self { l0, linf }
    }

    pub fn l1(&self) -> f64 {
        self.l0 * self.linf
    }

    pub fn l2(&self) -> f64 {
        self.l0.sqrt() * self.linf
    }

    pub fn norm(&self, norm_type: NormType) -> f64 {
        match norm_type {
            NormType::L1 => self.l1(),
            NormType::L2 => self.l2(),
        }
    }
}

/// Variance of the noise a mechanism adds to one partition, as a pure
/// function of the noise kind, the sensitivities and the budget.
pub trait NoiseVariance: Debug + Send + Sync {
    fn variance(
        &self,
        noise_kind: NoiseKind,
        sensitivities: &Sensitivities,
        budget: &PrivacyBudget,
    ) -> Result<f64, MechanismError>;
}

/// Closed-form variances: `2 * (L1 / eps)^2` for Laplace and the squared
/// analytic Gaussian standard deviation for Gaussian noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosedFormNoise;

impl NoiseVariance for ClosedFormNoise {
    fn variance(
        &self,
        noise_kind: NoiseKind,
        sensitivities: &Sensitivities,
        budget: &PrivacyBudget,
    ) -> Result<f64, MechanismError> {
        let sensitivity = sensitivities.norm(noise_kind.norm_type());
        let variance = match noise_kind {
            NoiseKind::Laplace => laplace_variance(budget.epsilon, sensitivity),
            NoiseKind::Gaussian => {
                let sigma =
                    gaussian_sigma(budget.epsilon, budget.delta, sensitivity)?;
                sigma * sigma
            }
        };
        debug!(
            "{noise_kind:?} noise variance {variance} for sensitivity {sensitivity} and budget {budget:?}"
        );
        Ok(variance)
    }
}

pub fn laplace_variance(epsilon: f64, l1_sensitivity: f64) -> f64 {
    let b = l1_sensitivity / epsilon;
    2.0 * b * b
}

fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Smallest delta achieved by Gaussian noise of standard deviation `sigma`
/// at the given epsilon (Balle and Wang, 2018, Theorem 8).
fn gaussian_delta(sigma: f64, epsilon: f64, l2_sensitivity: f64) -> f64 {
    let a = l2_sensitivity / (2.0 * sigma);
    let b = epsilon * sigma / l2_sensitivity;
    standard_normal_cdf(a - b) - epsilon.exp() * standard_normal_cdf(-a - b)
}

/// Standard deviation of the analytic Gaussian mechanism.
///
/// Doubles an upper bound until it satisfies `delta`, then bisects until the
/// bracket is within `GAUSSIAN_SIGMA_ACCURACY` of its lower end. The upper
/// end is returned so the result always satisfies the privacy guarantee.
pub fn gaussian_sigma(
    epsilon: f64,
    delta: f64,
    l2_sensitivity: f64,
) -> Result<f64, MechanismError> {
    if delta <= 0.0 {
        return Err(MechanismError::GaussianWithoutDelta(delta));
    }
    if l2_sensitivity == 0.0 {
        return Ok(0.0);
    }

    let mut lower = 0.0;
    let mut upper = l2_sensitivity;
    while gaussian_delta(upper, epsilon, l2_sensitivity) > delta {
        lower = upper;
        upper *= 2.0;
    }
    while upper - lower > GAUSSIAN_SIGMA_ACCURACY * lower {
        let middle = lower * 0.5 + upper * 0.5;
        if gaussian_delta(middle, epsilon, l2_sensitivity) > delta {
            lower = middle;
        } else {
            upper = middle;
        }
    }
    Ok(upper)
}
