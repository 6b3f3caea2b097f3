use thiserror::Error;

pub mod noise;
pub mod partition_selection;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MechanismError {
    #[error("gaussian noise requires delta > 0, got delta={0}")]
    GaussianWithoutDelta(f64),
}
