// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory store implementation using moka.

use std::{
    fmt::Debug,
    hash::Hash,
    time::{Duration, Instant},
};

use moka::{Expiry, ops::compute::Op, sync::Cache};
use strata_tier::{LocalCache, LocalCacheTier, SetOptions};

use crate::builder::InMemoryCacheBuilder;

/// An [`InMemoryStore`] adapted to the async cache contract.
pub type InMemoryCache<K, V> = LocalCache<K, V, InMemoryStore<K, V>>;

#[derive(Clone)]
struct Stored<V> {
    value: V,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL it was written with.
struct PerEntryTtl;

impl<K, V> Expiry<K, Stored<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, stored: &Stored<V>, _created_at: Instant) -> Option<Duration> {
        stored.ttl
    }

    fn expire_after_update(
        &self,
        _key: &K,
        stored: &Stored<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        stored.ttl
    }
}

/// A concurrent in-process store backed by moka.
///
/// Reads never return an expired entry; expired entries are removed lazily
/// during cache operations and in the background by moka's timer wheel.
///
/// # Examples
///
/// ```
/// use strata_memory::InMemoryStore;
/// use strata_tier::{LocalCacheTier, SetOptions};
///
/// let store = InMemoryStore::<String, i32>::new();
/// assert_eq!(store.set_local(&"key".to_string(), 1, &SetOptions::new()), None);
/// assert_eq!(store.set_local(&"key".to_string(), 2, &SetOptions::new()), Some(1));
/// assert_eq!(store.get_local(&"key".to_string()), Some(2));
/// ```
pub struct InMemoryStore<K, V> {
    inner: Cache<K, Stored<V>>,
    time_to_live: Option<Duration>,
}

// Clones share the same moka cache.
impl<K, V> Clone for InMemoryStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            time_to_live: self.time_to_live,
        }
    }
}

impl<K, V> InMemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new unbounded store whose entries never expire unless a write asks for it.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(None, None, None, None)
    }

    /// Creates a new builder for an [`InMemoryCache`].
    #[must_use]
    pub fn builder() -> InMemoryCacheBuilder<K, V> {
        InMemoryCacheBuilder::new()
    }

    pub(crate) fn with_settings(
        max_capacity: Option<u64>,
        initial_capacity: Option<usize>,
        time_to_live: Option<Duration>,
        name: Option<&str>,
    ) -> Self {
        let mut moka_builder = Cache::builder().expire_after(PerEntryTtl);

        if let Some(capacity) = max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = name {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: moka_builder.build(),
            time_to_live,
        }
    }

    /// Returns the approximate number of live entries.
    ///
    /// The count lags behind recent writes until moka runs its pending
    /// maintenance; call [`run_pending_tasks`](Self::run_pending_tasks) first for an exact figure.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Performs moka's pending maintenance work, such as evictions and expirations.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }

    /// Returns the name given to the store, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn stored(&self, value: V, options: &SetOptions) -> Stored<V> {
        Stored {
            value,
            ttl: options.ttl().or(self.time_to_live),
        }
    }
}

impl<K, V> Default for InMemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for InMemoryStore<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("name", &self.inner.name())
            .field("time_to_live", &self.time_to_live)
            .finish_non_exhaustive()
    }
}

impl<K, V> LocalCacheTier<K, V> for InMemoryStore<K, V>
where
    K: Clone + Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get_local(&self, key: &K) -> Option<V> {
        self.inner.get(key).map(|stored| stored.value)
    }

    fn set_local(&self, key: &K, value: V, options: &SetOptions) -> Option<V> {
        let stored = self.stored(value, options);
        let mut displaced = None;
        // The read of the old value and the write happen under moka's per-key lock.
        let _ = self.inner.entry(key.clone()).and_compute_with(|current| {
            displaced = current.map(|entry| entry.into_value().value);
            Op::Put(stored)
        });
        displaced
    }

    fn delete_local(&self, key: &K) -> Option<V> {
        self.inner.remove(key).map(|stored| stored.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_ttl_overrides_store_default() {
        let store = InMemoryStore::<String, i32>::with_settings(None, None, Some(Duration::from_secs(60)), None);
        let explicit = store.stored(1, &SetOptions::new().with_ttl(Duration::from_secs(5)));
        let inherited = store.stored(1, &SetOptions::new());

        assert_eq!(explicit.ttl, Some(Duration::from_secs(5)));
        assert_eq!(inherited.ttl, Some(Duration::from_secs(60)));
    }

    #[test]
    fn no_ttl_anywhere_means_no_expiry() {
        let store = InMemoryStore::<String, i32>::new();
        assert_eq!(store.stored(1, &SetOptions::new()).ttl, None);
    }

    #[test]
    fn delete_returns_removed_value() {
        let store = InMemoryStore::<String, i32>::new();
        store.set_local(&"k".to_string(), 7, &SetOptions::new());
        assert_eq!(store.delete_local(&"k".to_string()), Some(7));
        assert_eq!(store.delete_local(&"k".to_string()), None);
    }
}
