use std::{fmt::Debug, hash::Hash};

/// Marker trait with bounds for privacy identifiers.
pub trait PrivacyId: Hash + Eq + Clone + Debug {}

/// Implement PrivacyId for all eligible types
impl<T: Hash + Eq + Clone + Debug> PrivacyId for T {}

/// Marker trait with bounds for partition keys. `Ord` gives the stable order
/// used to pick which partitions a privacy id keeps under cross-partition
/// bounding.
pub trait PartitionKey: Hash + Eq + Ord + Clone + Debug {}

/// Implement PartitionKey for all eligible types
impl<T: Hash + Eq + Ord + Clone + Debug> PartitionKey for T {}
