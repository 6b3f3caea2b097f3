pub mod bounding;
pub mod engine;
pub mod errors;
pub mod estimators;
pub mod extractors;
pub mod metrics;
pub mod params;
pub mod selection;
