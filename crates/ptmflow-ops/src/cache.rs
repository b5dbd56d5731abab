//! Bounded memoization of expensive operation factories.
//!
//! Device models rebuild the same channels (idle decoherence for a fixed
//! duration, rotations by a fixed angle) many times per simulation. An
//! [`OperationCache`] owned by the caller keeps the most recently used
//! results and evicts the least recently used one when full.

use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::error::OpResult;
use crate::operation::Operation;

/// Cache key made of a factory name and its floating-point arguments.
///
/// Arguments are compared by bit pattern, with `-0.0` folded into `0.0` and
/// every NaN payload folded into the canonical NaN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamKey {
    factory: &'static str,
    params: Vec<u64>,
}

impl ParamKey {
    /// Key for `factory` called with `params`.
    pub fn new(factory: &'static str, params: &[f64]) -> Self {
        let params = params
            .iter()
            .map(|&p| {
                if p == 0.0 {
                    0.0f64.to_bits()
                } else if p.is_nan() {
                    f64::NAN.to_bits()
                } else {
                    p.to_bits()
                }
            })
            .collect();
        Self { factory, params }
    }

    /// Name of the factory this key belongs to.
    pub fn factory(&self) -> &'static str {
        self.factory
    }
}

/// Hit and miss counters since construction or the last [`OperationCache::clear`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that ran the factory.
    pub misses: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hits, {} misses", self.hits, self.misses)
    }
}

struct Entry {
    operation: Operation,
    last_used: u64,
}

struct Inner<K> {
    entries: FxHashMap<K, Entry>,
    tick: u64,
    stats: CacheStats,
}

/// Thread-safe LRU cache of operations.
pub struct OperationCache<K = ParamKey> {
    capacity: usize,
    inner: Mutex<Inner<K>>,
}

impl<K: Hash + Eq + Clone + fmt::Debug> OperationCache<K> {
    /// Create a cache holding at most `capacity` operations. A capacity of
    /// zero disables storage; every lookup then builds.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                tick: 0,
                stats: CacheStats::default(),
            }),
        }
    }

    /// Return the cached operation for `key`, or build and store it.
    ///
    /// The lock is not held while `build` runs, so concurrent misses on the
    /// same key may build twice; the last result wins. Errors are returned
    /// and not cached.
    pub fn get_or_try_insert_with<F>(&self, key: K, build: F) -> OpResult<Operation>
    where
        F: FnOnce() -> OpResult<Operation>,
    {
        {
            let mut inner = self.lock();
            inner.tick += 1;
            let tick = inner.tick;
            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_used = tick;
                let operation = entry.operation.clone();
                inner.stats.hits += 1;
                trace!(?key, "operation cache hit");
                return Ok(operation);
            }
            inner.stats.misses += 1;
        }

        trace!(?key, "operation cache miss");
        let operation = build()?;
        if self.capacity == 0 {
            return Ok(operation);
        }

        let mut inner = self.lock();
        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                trace!(key = ?oldest, "operation cache eviction");
                inner.entries.remove(&oldest);
            }
        }
        inner.tick += 1;
        let last_used = inner.tick;
        inner.entries.insert(
            key,
            Entry {
                operation: operation.clone(),
                last_used,
            },
        );
        Ok(operation)
    }

    /// Number of stored operations.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of stored operations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Drop all entries and reset the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats = CacheStats::default();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K>> {
        // Entries stay consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K> fmt::Debug for OperationCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpError;
    use ndarray::Array2;
    use ptmflow_basis::bases;
    use std::cell::Cell;

    fn identity() -> OpResult<Operation> {
        let b = bases::gell_mann(2)?;
        Operation::from_ptm(Array2::<f64>::eye(4).into_dyn(), &[b], None)
    }

    #[test]
    fn test_param_key_zero_sign() {
        assert_eq!(ParamKey::new("idle", &[0.0]), ParamKey::new("idle", &[-0.0]));
        assert_ne!(ParamKey::new("idle", &[1.0]), ParamKey::new("rx", &[1.0]));
        assert_ne!(ParamKey::new("idle", &[1.0]), ParamKey::new("idle", &[1.0, 2.0]));
    }

    #[test]
    fn test_param_key_nan_payloads() {
        let quiet = f64::NAN;
        let payload = f64::from_bits(0x7ff8_0000_0000_0001);
        let negative = -f64::NAN;
        assert!(payload.is_nan() && negative.is_nan());
        assert_eq!(ParamKey::new("rx", &[quiet]), ParamKey::new("rx", &[payload]));
        assert_eq!(ParamKey::new("rx", &[quiet]), ParamKey::new("rx", &[negative]));
        assert_ne!(ParamKey::new("rx", &[quiet]), ParamKey::new("rx", &[1.0]));
    }

    #[test]
    fn test_hit_and_miss() {
        let cache = OperationCache::new(4);
        let builds = Cell::new(0);
        for _ in 0..3 {
            cache
                .get_or_try_insert_with(ParamKey::new("id", &[1.0]), || {
                    builds.set(builds.get() + 1);
                    identity()
                })
                .unwrap();
        }
        assert_eq!(builds.get(), 1);
        assert_eq!(cache.stats(), CacheStats { hits: 2, misses: 1 });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = OperationCache::new(2);
        cache.get_or_try_insert_with(1u32, identity).unwrap();
        cache.get_or_try_insert_with(2u32, identity).unwrap();
        // Touch 1 so that 2 becomes the eviction candidate.
        cache.get_or_try_insert_with(1u32, identity).unwrap();
        cache.get_or_try_insert_with(3u32, identity).unwrap();
        assert_eq!(cache.len(), 2);

        let misses = cache.stats().misses;
        cache.get_or_try_insert_with(1u32, identity).unwrap();
        assert_eq!(cache.stats().misses, misses);
        cache.get_or_try_insert_with(2u32, identity).unwrap();
        assert_eq!(cache.stats().misses, misses + 1);
    }

    #[test]
    fn test_errors_not_cached() {
        let cache = OperationCache::new(2);
        let result = cache.get_or_try_insert_with("bad", || {
            Err(OpError::InvalidArgument("nope".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
        assert!(cache.get_or_try_insert_with("bad", identity).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_and_clear() {
        let cache = OperationCache::new(0);
        cache.get_or_try_insert_with("a", identity).unwrap();
        cache.get_or_try_insert_with("a", identity).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);

        let cache = OperationCache::new(3);
        cache.get_or_try_insert_with("a", identity).unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = std::sync::Arc::new(OperationCache::new(8));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_try_insert_with(ParamKey::new("id", &[f64::from(i % 2)]), identity)
                        .map(|op| op.num_qubits())
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
        assert_eq!(cache.len(), 2);
    }
}
