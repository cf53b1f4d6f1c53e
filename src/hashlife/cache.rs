use ahash::AHashMap as HashMap;
use std::hash::Hash;

/// A memo table whose entries carry the computed-generation counter of
/// their last access.
///
/// Entries are created on first computation, refreshed on every lookup
/// and evicted once they fall behind the counter by more than the
/// retention window.
pub(super) struct GenerationCache<K, V> {
    map: HashMap<K, Entry<V>>,
}

struct Entry<V> {
    value: V,
    last_access: u64,
}

impl<K: Eq + Hash, V: Clone> GenerationCache<K, V> {
    pub(super) fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Returns the cached value and refreshes its access stamp.
    pub(super) fn lookup(&mut self, key: &K, tick: u64) -> Option<V> {
        let entry = self.map.get_mut(key)?;
        entry.last_access = tick;
        Some(entry.value.clone())
    }

    pub(super) fn insert(&mut self, key: K, value: V, tick: u64) {
        self.map.insert(
            key,
            Entry {
                value,
                last_access: tick,
            },
        );
    }

    /// Drops every entry whose last access fell behind `tick` by more
    /// than `window` generations. A full pass over live entries; sweeps
    /// only run once per external step call, not per tick.
    pub(super) fn sweep(&mut self, tick: u64, window: u64) -> usize {
        let before = self.map.len();
        self.map.retain(|_, e| tick - e.last_access <= window);
        before - self.map.len()
    }

    pub(super) fn len(&self) -> usize {
        self.map.len()
    }
}

/// Entry counts of the engine's tables, for observability and the
/// pruning-bound tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Canonical `CellNode`s currently interned.
    pub interned_cells: usize,
    /// Memoized one-tick results for `CellNode`s.
    pub cell_results: usize,
    /// Memoized one-tick results for 16x16 blocks.
    pub level4_results: usize,
    /// Memoized one-tick results for leaves.
    pub leaf_results: usize,
}

impl CacheStats {
    pub fn total(&self) -> usize {
        self.interned_cells + self.cell_results + self.level4_results + self.leaf_results
    }
}
