use std::{fmt, sync::Arc};

type Extractor<R, T> = Arc<dyn Fn(&R) -> T + Send + Sync>;

/// Functions pulling the privacy id, partition key and value out of a
/// record. They must be pure and deterministic.
pub struct DataExtractors<R, PID, PK, V> {
    pub privacy_id_extractor: Extractor<R, PID>,
    pub partition_extractor: Extractor<R, PK>,
    pub value_extractor: Extractor<R, V>,
}

impl<R, PID, PK, V> DataExtractors<R, PID, PK, V> {
    pub fn new(
        privacy_id_extractor: impl Fn(&R) -> PID + Send + Sync + 'static,
        partition_extractor: impl Fn(&R) -> PK + Send + Sync + 'static,
        value_extractor: impl Fn(&R) -> V + Send + Sync + 'static,
    ) -> Self {
        Self {
            privacy_id_extractor: Arc::new(privacy_id_extractor),
            partition_extractor: Arc::new(partition_extractor),
            value_extractor: Arc::new(value_extractor),
        }
    }

    pub fn extract(&self, record: &R) -> (PID, PK, V) {
        (
            (self.privacy_id_extractor)(record),
            (self.partition_extractor)(record),
            (self.value_extractor)(record),
        )
    }
}

impl<R, PID, PK, V> Clone for DataExtractors<R, PID, PK, V> {
    fn clone(&self) -> Self {
        Self {
            privacy_id_extractor: self.privacy_id_extractor.clone(),
            partition_extractor: self.partition_extractor.clone(),
            value_extractor: self.value_extractor.clone(),
        }
    }
}

impl<R, PID, PK, V> fmt::Debug for DataExtractors<R, PID, PK, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataExtractors").finish_non_exhaustive()
    }
}
