use crate::{
    analysis::params::{AggregateParams, Metric},
    mechanisms::noise::NoiseKind,
};

// Sample mock values to reduce boilerplate in tests.

impl AggregateParams {
    /// COUNT with Gaussian noise, each privacy id contributing once.
    pub fn mock() -> Self {
        Self::new(NoiseKind::Gaussian, vec![Metric::Count], 1, 1)
    }
}
