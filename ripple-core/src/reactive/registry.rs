//! Weak consumer registry.
//!
//! A producer must be able to reach every consumer that is still alive
//! without keeping any of them alive. Consumers live in an arena and are
//! addressed by generational keys, so a registry only stores keys and asks
//! the arena whether each one still resolves. A key whose arena slot has
//! been removed is skipped by every query, and because slot keys are
//! generational it can never start resolving again.

use indexmap::IndexSet;
use slotmap::{Key, SlotMap};

/// Raw size below which [`WeakRegistry::add_pruning`] never prunes.
const MIN_PRUNE_AT: usize = 16;

/// Answers whether a key still refers to a live entry.
pub trait Liveness<K> {
    /// Whether `key` currently resolves.
    fn is_alive(&self, key: K) -> bool;
}

impl<K: Key, V> Liveness<K> for SlotMap<K, V> {
    fn is_alive(&self, key: K) -> bool {
        self.contains_key(key)
    }
}

/// A set of arena keys that only ever reports live entries.
#[derive(Debug, Clone)]
pub struct WeakRegistry<K: Key> {
    entries: IndexSet<K>,
    /// Raw size at which the next `add_pruning` drops dead keys first.
    prune_at: usize,
}

impl<K: Key> WeakRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: IndexSet::new(),
            prune_at: MIN_PRUNE_AT,
        }
    }

    /// Add a key. Returns `false` if it was already present.
    pub fn add(&mut self, key: K) -> bool {
        self.entries.insert(key)
    }

    /// Add a key, first dropping dead keys whenever the raw size has doubled
    /// since the last prune.
    ///
    /// Keeps a registry that is only ever added to bounded by its live keys.
    pub fn add_pruning(&mut self, key: K, arena: &impl Liveness<K>) -> bool {
        if self.entries.len() >= self.prune_at {
            self.prune(arena);
        }
        self.entries.insert(key)
    }

    /// Whether `key` is registered and still alive.
    pub fn has(&self, key: K, arena: &impl Liveness<K>) -> bool {
        self.entries.contains(&key) && arena.is_alive(key)
    }

    /// Remove a live key. Returns `false` if it was absent or already dead.
    pub fn delete(&mut self, key: K, arena: &impl Liveness<K>) -> bool {
        arena.is_alive(key) && self.entries.swap_remove(&key)
    }

    /// Forget every key.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Lazily enumerate the live keys.
    ///
    /// Each call starts a fresh pass that reflects liveness at the time each
    /// key is reached.
    pub fn iter<'a, A>(&'a self, arena: &'a A) -> impl Iterator<Item = K> + 'a
    where
        A: Liveness<K>,
    {
        self.entries
            .iter()
            .copied()
            .filter(move |key| arena.is_alive(*key))
    }

    /// Number of live keys.
    pub fn len(&self, arena: &impl Liveness<K>) -> usize {
        self.iter(arena).count()
    }

    /// Number of stored keys, dead ones included.
    pub fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no live key remains.
    pub fn is_empty(&self, arena: &impl Liveness<K>) -> bool {
        self.iter(arena).next().is_none()
    }

    /// Physically drop dead keys. Returns how many were dropped.
    pub fn prune(&mut self, arena: &impl Liveness<K>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key| arena.is_alive(*key));
        self.prune_at = (self.entries.len() * 2).max(MIN_PRUNE_AT);
        before - self.entries.len()
    }
}

impl<K: Key> Default for WeakRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
