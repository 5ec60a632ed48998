// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory caches.
//!
//! This module provides a builder API for `InMemoryCache` that abstracts
//! the underlying moka configuration, providing a stable API surface
//! without exposing moka's types.

use std::{fmt::Debug, hash::Hash, marker::PhantomData, sync::Arc, time::Duration};

use strata_tier::{DisposeCause, DisposeHook, LocalCache};

use crate::store::{InMemoryCache, InMemoryStore};

/// Builder for configuring an `InMemoryCache`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_memory::InMemoryCacheBuilder;
///
/// let cache = InMemoryCacheBuilder::<String, i32>::new()
///     .max_capacity(1000)
///     .time_to_live(Duration::from_secs(300))
///     .initial_capacity(100)
///     .name("my-cache")
///     .build();
/// ```
pub struct InMemoryCacheBuilder<K, V> {
    max_capacity: Option<u64>,
    initial_capacity: Option<usize>,
    time_to_live: Option<Duration>,
    name: Option<String>,
    on_dispose: Option<DisposeHook<K, V>>,
    _phantom: PhantomData<fn(K) -> V>,
}

impl<K, V> Debug for InMemoryCacheBuilder<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCacheBuilder")
            .field("max_capacity", &self.max_capacity)
            .field("initial_capacity", &self.initial_capacity)
            .field("time_to_live", &self.time_to_live)
            .field("name", &self.name)
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

impl<K, V> Default for InMemoryCacheBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryCacheBuilder<K, V> {
    /// Creates a new builder with default settings.
    ///
    /// The default configuration creates an unbounded cache with `TinyLFU`
    /// eviction policy and no default time-to-live.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_capacity: None,
            initial_capacity: None,
            time_to_live: None,
            name: None,
            on_dispose: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// Once the capacity is reached, entries will be evicted to make room
    /// for new entries using the `TinyLFU` eviction policy (combination of
    /// LRU eviction and LFU admission). Capacity evictions are not reported
    /// to the dispose hook.
    ///
    /// If not set, the cache will be unbounded (limited only by available memory).
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the initial capacity (pre-allocation hint) for the cache.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets the time-to-live for writes that do not carry their own.
    ///
    /// A `ttl` in the write's [`SetOptions`](strata_tier::SetOptions) always wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use strata_memory::InMemoryCacheBuilder;
    ///
    /// let cache = InMemoryCacheBuilder::<String, i32>::new()
    ///     .time_to_live(Duration::from_secs(300))
    ///     .build();
    /// ```
    #[must_use]
    pub fn time_to_live(mut self, duration: Duration) -> Self {
        self.time_to_live = Some(duration);
        self
    }

    /// Sets a name for the cache.
    ///
    /// This name may appear in logs or debugging output from the
    /// underlying cache implementation.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers a hook that receives every value overwritten by a `set` or removed by a `delete`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_memory::InMemoryCacheBuilder;
    ///
    /// let cache = InMemoryCacheBuilder::<String, Vec<u8>>::new()
    ///     .on_dispose(|key: &String, value: Vec<u8>, cause| {
    ///         println!("{key} dropped {} bytes ({cause:?})", value.len());
    ///     })
    ///     .build();
    /// ```
    #[must_use]
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&K, V, DisposeCause) + Send + Sync + 'static,
    {
        self.on_dispose = Some(Arc::new(hook));
        self
    }

    /// Builds the configured `InMemoryCache`.
    #[must_use]
    pub fn build(self) -> InMemoryCache<K, V>
    where
        K: Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let store = InMemoryStore::with_settings(
            self.max_capacity,
            self.initial_capacity,
            self.time_to_live,
            self.name.as_deref(),
        );
        LocalCache::new(store).with_dispose_hook(self.on_dispose)
    }
}
