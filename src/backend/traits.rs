use std::hash::Hash;

/// Trait for the execution backend of a pipeline.
///
/// The engine only describes logical operations over a collection; the
/// backend decides how and when they run. Functions passed to the backend
/// must be pure so results do not depend on the execution strategy.
/// `stage_name` labels an operation for logging and monitoring.
pub trait PipelineBackend: Clone {
    /// Possibly lazy, possibly distributed collection of `T`.
    type Collection<T: 'static>;

    /// Turns in-memory items into a collection.
    fn to_collection<T: 'static>(
        &self,
        items: Vec<T>,
        stage_name: &str,
    ) -> Self::Collection<T>;

    fn map<T: 'static, U: 'static>(
        &self,
        col: Self::Collection<T>,
        f: impl Fn(T) -> U + 'static,
        stage_name: &str,
    ) -> Self::Collection<U>;

    fn flat_map<T: 'static, U: 'static, I: IntoIterator<Item = U> + 'static>(
        &self,
        col: Self::Collection<T>,
        f: impl Fn(T) -> I + 'static,
        stage_name: &str,
    ) -> Self::Collection<U>;

    fn filter<T: 'static>(
        &self,
        col: Self::Collection<T>,
        predicate: impl Fn(&T) -> bool + 'static,
        stage_name: &str,
    ) -> Self::Collection<T>;

    /// Groups values by key. Each key appears exactly once in the output.
    fn group_by_key<K: Hash + Eq + 'static, V: 'static>(
        &self,
        col: Self::Collection<(K, V)>,
        stage_name: &str,
    ) -> Self::Collection<(K, Vec<V>)>;

    /// Combines all values of a key with an associative and commutative
    /// function.
    fn combine_per_key<K: Hash + Eq + 'static, V: 'static>(
        &self,
        col: Self::Collection<(K, V)>,
        combine: impl Fn(V, V) -> V + 'static,
        stage_name: &str,
    ) -> Self::Collection<(K, V)>;

    /// Collects the whole collection into a single element, which is an
    /// empty `Vec` when the collection is empty.
    fn to_list<T: 'static>(
        &self,
        col: Self::Collection<T>,
        stage_name: &str,
    ) -> Self::Collection<Vec<T>>;

    /// Concatenates two collections.
    fn flatten<T: 'static>(
        &self,
        first: Self::Collection<T>,
        second: Self::Collection<T>,
        stage_name: &str,
    ) -> Self::Collection<T>;
}
