use std::{hash::Hash, iter};

use indexmap::IndexMap;
use log::debug;

use super::traits::PipelineBackend;

/// Sequential, in-process backend over lazy iterators.
///
/// Nothing runs until the returned collection is iterated. Grouping stages
/// keep keys in first-seen order, so results are reproducible.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineBackend for LocalBackend {
    type Collection<T: 'static> = Box<dyn Iterator<Item = T>>;

    fn to_collection<T: 'static>(
        &self,
        items: Vec<T>,
        stage_name: &str,
    ) -> Self::Collection<T> {
        debug!("Stage '{stage_name}': {} in-memory items", items.len());
        Box::new(items.into_iter())
    }

    fn map<T: 'static, U: 'static>(
        &self,
        col: Self::Collection<T>,
        f: impl Fn(T) -> U + 'static,
        _stage_name: &str,
    ) -> Self::Collection<U> {
        Box::new(col.map(f))
    }

    fn flat_map<T: 'static, U: 'static, I: IntoIterator<Item = U> + 'static>(
        &self,
        col: Self::Collection<T>,
        f: impl Fn(T) -> I + 'static,
        _stage_name: &str,
    ) -> Self::Collection<U> {
        Box::new(col.flat_map(f))
    }

    fn filter<T: 'static>(
        &self,
        col: Self::Collection<T>,
        predicate: impl Fn(&T) -> bool + 'static,
        _stage_name: &str,
    ) -> Self::Collection<T> {
        Box::new(col.filter(predicate))
    }

    fn group_by_key<K: Hash + Eq + 'static, V: 'static>(
        &self,
        col: Self::Collection<(K, V)>,
        stage_name: &str,
    ) -> Self::Collection<(K, Vec<V>)> {
        let stage_name = stage_name.to_string();
        let grouped = iter::once_with(move || {
            let mut groups: IndexMap<K, Vec<V>> = IndexMap::new();
            for (key, value) in col {
                groups.entry(key).or_default().push(value);
            }
            debug!("Stage '{stage_name}': {} groups", groups.len());
            groups
        });
        Box::new(grouped.flatten())
    }

    fn combine_per_key<K: Hash + Eq + 'static, V: 'static>(
        &self,
        col: Self::Collection<(K, V)>,
        combine: impl Fn(V, V) -> V + 'static,
        stage_name: &str,
    ) -> Self::Collection<(K, V)> {
        let stage_name = stage_name.to_string();
        let combined = iter::once_with(move || {
            let mut accumulators: IndexMap<K, Option<V>> = IndexMap::new();
            for (key, value) in col {
                let slot = accumulators.entry(key).or_insert(None);
                *slot = Some(match slot.take() {
                    Some(accumulator) => combine(accumulator, value),
                    None => value,
                });
            }
            debug!("Stage '{stage_name}': {} keys", accumulators.len());
            accumulators
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
        });
        Box::new(combined.flatten())
    }

    fn to_list<T: 'static>(
        &self,
        col: Self::Collection<T>,
        stage_name: &str,
    ) -> Self::Collection<Vec<T>> {
        let stage_name = stage_name.to_string();
        Box::new(iter::once_with(move || {
            let items: Vec<T> = col.collect();
            debug!("Stage '{stage_name}': collected {} items", items.len());
            items
        }))
    }

    fn flatten<T: 'static>(
        &self,
        first: Self::Collection<T>,
        second: Self::Collection<T>,
        _stage_name: &str,
    ) -> Self::Collection<T> {
        Box::new(first.chain(second))
    }
}
