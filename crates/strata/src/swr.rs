// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stale-while-revalidate: serve a stale value at once and refresh it in the background.

use std::{
    collections::HashMap,
    fmt::Debug,
    hash::Hash,
    marker::PhantomData,
    sync::Arc,
    time::{Duration, SystemTime},
};

use anyspawn::Spawner;
use strata_tier::{CacheTier, Error, SetOptions};
use tick::Clock;

use crate::{
    revalidation::Revalidation,
    telemetry::{self, CacheActivity, CacheLayer, CacheOperation},
};

const DEFAULT_TTL: Duration = Duration::from_secs(60);
const DEFAULT_STALE_TTL: Duration = Duration::from_secs(60);

// Stand-in deadline when `now + ttl` does not fit in a `SystemTime`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A value together with the moment it stops being fresh.
///
/// [`SwrCache`] stores this envelope in the wrapped cache in place of the raw
/// value. A store behind an SWR layer must round-trip it losslessly.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SwrEnvelope<V> {
    data: V,
    expires_at: SystemTime,
}

impl<V> SwrEnvelope<V> {
    /// Wraps `data` that is fresh until `expires_at`.
    #[must_use]
    pub fn new(data: V, expires_at: SystemTime) -> Self {
        Self { data, expires_at }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn data(&self) -> &V {
        &self.data
    }

    /// Unwraps the value.
    #[must_use]
    pub fn into_data(self) -> V {
        self.data
    }

    /// Returns the moment the value becomes stale.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// Returns `true` while `now` is before the expiry.
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// A cache layer implementing stale-while-revalidate.
///
/// Every value is written as an [`SwrEnvelope`] whose expiry is `now + ttl`,
/// where `ttl` is the write's own TTL or the layer's default. The wrapped cache
/// is asked to keep the entry for `ttl + stale_ttl`, so each key moves through
/// three states:
///
/// - **Fresh**: `get_or_load` returns the value and does nothing else.
/// - **Stale**: `get_or_load` returns the value at once and starts a background
///   refresh with the caller's loader, unless one is already running for the key.
/// - **Expired**: the wrapped cache no longer has the entry, so `get_or_load`
///   loads synchronously like any miss.
///
/// Only `get_or_load` revalidates. `get` returns the value whatever its age.
/// Background refresh failures are logged and otherwise ignored.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::{CacheTier, SetOptions, SwrCache};
/// use strata_tier::testing::MockCache;
/// use tick::Clock;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), strata::Error> {
/// let cache = SwrCache::builder(MockCache::new(), Clock::new_frozen())
///     .default_ttl(Duration::from_secs(60))
///     .stale_ttl(Duration::from_secs(10))
///     .build();
///
/// let value = cache
///     .get_or_load(&"config".to_string(), || async { Ok("v1".to_string()) }, &SetOptions::new())
///     .await?;
/// assert_eq!(value, "v1");
/// # Ok(())
/// # }
/// ```
pub struct SwrCache<K, V, C> {
    inner: Arc<SwrInner<K, V, C>>,
}

struct SwrInner<K, V, C> {
    cache: C,
    clock: Clock,
    default_ttl: Duration,
    stale_ttl: Duration,
    revalidation: Revalidation<K>,
    _phantom: PhantomData<fn() -> V>,
}

/// Builder for [`SwrCache`].
pub struct SwrCacheBuilder<K, V, C> {
    cache: C,
    clock: Clock,
    default_ttl: Duration,
    stale_ttl: Duration,
    spawner: Option<Spawner>,
    _phantom: PhantomData<fn(K) -> V>,
}

impl<K, V, C> SwrCacheBuilder<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, SwrEnvelope<V>> + 'static,
{
    /// Sets how long a value stays fresh when the write carries no TTL. Defaults to 60 seconds.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets how long a value may be served stale after it stops being fresh. Defaults to 60 seconds.
    #[must_use]
    pub fn stale_ttl(mut self, ttl: Duration) -> Self {
        self.stale_ttl = ttl;
        self
    }

    /// Sets the spawner for background refreshes. Defaults to the Tokio runtime.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Builds the layer.
    #[must_use]
    pub fn build(self) -> SwrCache<K, V, C> {
        SwrCache {
            inner: Arc::new(SwrInner {
                cache: self.cache,
                clock: self.clock,
                default_ttl: self.default_ttl,
                stale_ttl: self.stale_ttl,
                revalidation: Revalidation::new(self.spawner.unwrap_or_else(Spawner::new_tokio)),
                _phantom: PhantomData,
            }),
        }
    }
}

impl<K, V, C> Debug for SwrCacheBuilder<K, V, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwrCacheBuilder")
            .field("default_ttl", &self.default_ttl)
            .field("stale_ttl", &self.stale_ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V, C> SwrCache<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, SwrEnvelope<V>> + 'static,
{
    /// Starts building an SWR layer over `cache`, reading time from `clock`.
    #[must_use]
    pub fn builder(cache: C, clock: Clock) -> SwrCacheBuilder<K, V, C> {
        SwrCacheBuilder {
            cache,
            clock,
            default_ttl: DEFAULT_TTL,
            stale_ttl: DEFAULT_STALE_TTL,
            spawner: None,
            _phantom: PhantomData,
        }
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner.cache
    }

    fn revalidate<L, Fut>(&self, key: &K, loader: L, options: &SetOptions)
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let Some(guard) = self.inner.revalidation.try_start(key) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let options = options.clone();
        self.inner.revalidation.spawn(guard, async move {
            let result = match loader().await {
                Ok(value) => inner.store(&key, value, &options).await,
                Err(error) => Err(error),
            };
            match result {
                Ok(()) => telemetry::record(CacheLayer::Swr, CacheOperation::Revalidate, CacheActivity::Revalidated),
                Err(error) => telemetry::record_error(CacheLayer::Swr, CacheOperation::Revalidate, &error),
            }
        });
    }

    #[cfg(test)]
    fn is_revalidating(&self, key: &K) -> bool {
        self.inner.revalidation.is_running(key)
    }
}

impl<K, V, C> SwrInner<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, SwrEnvelope<V>>,
{
    fn envelope(&self, data: V, options: &SetOptions) -> SwrEnvelope<V> {
        let now = self.clock.system_time();
        let ttl = options.ttl().unwrap_or(self.default_ttl);
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        SwrEnvelope::new(data, expires_at)
    }

    /// Options for the wrapped cache: the entry outlives its freshness by `stale_ttl`.
    fn stored_options(&self, options: &SetOptions) -> SetOptions {
        let ttl = options.ttl().unwrap_or(self.default_ttl);
        options.clone().with_ttl(ttl.saturating_add(self.stale_ttl))
    }

    async fn store(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        let envelope = self.envelope(value, options);
        self.cache.set(key, envelope, &self.stored_options(options)).await
    }
}

impl<K, V, C> Debug for SwrCache<K, V, C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwrCache")
            .field("cache", &self.inner.cache)
            .field("default_ttl", &self.inner.default_ttl)
            .field("stale_ttl", &self.inner.stale_ttl)
            .finish_non_exhaustive()
    }
}

impl<K, V, C> Clone for SwrCache<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, C> CacheTier<K, V> for SwrCache<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, SwrEnvelope<V>> + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        Ok(self.inner.cache.get(key).await?.map(SwrEnvelope::into_data))
    }

    async fn get_or_load<L, Fut>(&self, key: &K, loader: L, options: &SetOptions) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let now = self.inner.clock.system_time();
        match self.inner.cache.get(key).await? {
            Some(envelope) if envelope.is_fresh(now) => {
                telemetry::record(CacheLayer::Swr, CacheOperation::GetOrLoad, CacheActivity::Hit);
                Ok(envelope.into_data())
            }
            Some(envelope) => {
                telemetry::record(CacheLayer::Swr, CacheOperation::GetOrLoad, CacheActivity::Stale);
                self.revalidate(key, loader, options);
                Ok(envelope.into_data())
            }
            None => {
                telemetry::record(CacheLayer::Swr, CacheOperation::GetOrLoad, CacheActivity::Miss);
                let inner = Arc::clone(&self.inner);
                let load_options = options.clone();
                let wrapped = move || async move {
                    let data = loader().await?;
                    Ok(inner.envelope(data, &load_options))
                };
                let envelope = self
                    .inner
                    .cache
                    .get_or_load(key, wrapped, &self.inner.stored_options(options))
                    .await?;
                Ok(envelope.into_data())
            }
        }
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        self.inner.store(key, value, options).await
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.inner.cache.delete(key).await
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>, Error> {
        let envelopes = self.inner.cache.get_many(keys).await?;
        Ok(envelopes.into_iter().map(|(key, envelope)| (key, envelope.into_data())).collect())
    }

    async fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> Result<(), Error> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key, self.inner.envelope(value, options)))
            .collect();
        self.inner.cache.set_many(entries, &self.inner.stored_options(options)).await
    }

    async fn delete_many(&self, keys: &[K]) -> Result<(), Error> {
        self.inner.cache.delete_many(keys).await
    }
}
