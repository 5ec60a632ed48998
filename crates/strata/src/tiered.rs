// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-level caching: several caches consulted from hottest to coldest.

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use futures::{FutureExt, future::BoxFuture, future::join_all};
use strata_tier::{CacheTier, DynamicCache, DynamicCacheExt, Error, SetOptions};

use crate::telemetry::{self, CacheActivity, CacheLayer, CacheOperation};

/// One level of a [`TieredCache`].
///
/// The options, when present, are used for every write the tiered layer makes
/// to this level on its own initiative, such as a backfill after a colder hit.
pub struct Tier<K, V> {
    cache: DynamicCache<K, V>,
    options: Option<SetOptions>,
}

impl<K, V> Tier<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a tier over `cache` with no options of its own.
    #[must_use]
    pub fn new<C>(cache: C) -> Self
    where
        C: CacheTier<K, V> + 'static,
    {
        Self {
            cache: cache.into_dynamic(),
            options: None,
        }
    }

    /// Sets the options used when writing to this tier.
    #[must_use]
    pub fn with_options(mut self, options: SetOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Returns the tier's configured options, or `fallback` when it has none.
    fn options_or<'a>(&'a self, fallback: &'a SetOptions) -> &'a SetOptions {
        self.options.as_ref().unwrap_or(fallback)
    }

    /// Options for a backfill into this tier: its configured options, or the defaults.
    ///
    /// Every read path backfills the same way, whatever options the caller passed.
    fn backfill_options(&self) -> SetOptions {
        self.options.clone().unwrap_or_default()
    }
}

impl<K, V> Clone for Tier<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            options: self.options.clone(),
        }
    }
}

impl<K, V> Debug for Tier<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier").field("options", &self.options).finish_non_exhaustive()
    }
}

/// A cache layer over an ordered list of caches, hottest first.
///
/// Reads walk the tiers in order and stop at the first hit. Every tier consulted
/// before the hit is backfilled with the value, using that tier's own options.
/// A `get_or_load` that misses everywhere runs the loader once, through the
/// coldest tier, and backfills the others on the way back.
///
/// Writes and deletes go to every tier concurrently. The coldest tier receives
/// the caller's options; the others receive their configured options when they
/// have some. Writes are not atomic across tiers: if one tier fails, the others
/// keep whatever they accepted and the first error is returned.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::{CacheTier, SetOptions, Tier, TieredCache};
/// use strata_tier::testing::MockCache;
///
/// # futures::executor::block_on(async {
/// let local = MockCache::<String, String>::new();
/// let remote = MockCache::<String, String>::new();
/// remote.set(&"user:1".to_string(), "Ada".to_string(), &SetOptions::new()).await?;
///
/// let cache = TieredCache::new(vec![
///     Tier::new(local.clone()).with_options(SetOptions::new().with_ttl(Duration::from_secs(30))),
///     Tier::new(remote),
/// ])?;
///
/// assert_eq!(cache.get(&"user:1".to_string()).await?, Some("Ada".to_string()));
/// assert!(local.contains_key(&"user:1".to_string()));
/// # Ok::<(), strata::Error>(())
/// # });
/// ```
pub struct TieredCache<K, V> {
    tiers: Arc<[Tier<K, V>]>,
}

impl<K, V> TieredCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a tiered cache from `tiers`, hottest first.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `tiers` is empty.
    pub fn new(tiers: Vec<Tier<K, V>>) -> Result<Self, Error> {
        if tiers.is_empty() {
            return Err(Error::configuration("a tiered cache needs at least one tier"));
        }
        Ok(Self { tiers: tiers.into() })
    }

    /// Returns the number of tiers.
    #[must_use]
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }

    fn last(&self) -> usize {
        self.tiers.len() - 1
    }
}

impl<K, V> Clone for TieredCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            tiers: Arc::clone(&self.tiers),
        }
    }
}

impl<K, V> Debug for TieredCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache").field("tiers", &self.tiers).finish()
    }
}

fn missing_tier(index: usize) -> Error {
    Error::configuration(format!("no tier at index {index}"))
}

/// Reads `key` from the tier at `index`, asking the colder tiers on a miss and
/// backfilling this tier with whatever they find.
fn get_through<K, V>(tiers: Arc<[Tier<K, V>]>, index: usize, key: K) -> BoxFuture<'static, Result<Option<V>, Error>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async move {
        let tier = tiers.get(index).ok_or_else(|| missing_tier(index))?;
        if let Some(value) = tier.cache.get(&key).await? {
            telemetry::record(CacheLayer::Tiered, CacheOperation::Get, CacheActivity::Hit);
            return Ok(Some(value));
        }
        if index + 1 == tiers.len() {
            telemetry::record(CacheLayer::Tiered, CacheOperation::Get, CacheActivity::Miss);
            return Ok(None);
        }

        let found = get_through(Arc::clone(&tiers), index + 1, key.clone()).await?;
        if let Some(value) = &found {
            tier.cache.set(&key, value.clone(), &tier.backfill_options()).await?;
            telemetry::record(CacheLayer::Tiered, CacheOperation::Get, CacheActivity::Backfilled);
        }
        Ok(found)
    }
    .boxed()
}

/// Read-through on the tier at `index` whose loader is the next colder tier.
///
/// The coldest tier runs the caller's loader with the caller's options, falling
/// back to the tier's own options only when the caller set none. Hotter tiers
/// are backfilled with their own options, like any other backfill.
fn load_through<K, V, L, Fut>(
    tiers: Arc<[Tier<K, V>]>,
    index: usize,
    key: K,
    loader: L,
    options: SetOptions,
) -> BoxFuture<'static, Result<V, Error>>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    L: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, Error>> + Send + 'static,
{
    async move {
        let tier = tiers.get(index).ok_or_else(|| missing_tier(index))?;
        if index + 1 == tiers.len() {
            let options = if options.is_unset() {
                tier.options.clone().unwrap_or_default()
            } else {
                options
            };
            return tier.cache.get_or_load(&key, loader, &options).await;
        }

        let write_options = tier.backfill_options();
        let next = {
            let tiers = Arc::clone(&tiers);
            let key = key.clone();
            move || async move {
                let value = load_through(tiers, index + 1, key, loader, options).await?;
                telemetry::record(CacheLayer::Tiered, CacheOperation::GetOrLoad, CacheActivity::Backfilled);
                Ok(value)
            }
        };
        tier.cache.get_or_load(&key, next, &write_options).await
    }
    .boxed()
}

fn first_error(results: impl IntoIterator<Item = Result<(), Error>>) -> Result<(), Error> {
    results.into_iter().collect()
}

impl<K, V> CacheTier<K, V> for TieredCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        get_through(Arc::clone(&self.tiers), 0, key.clone()).await
    }

    async fn get_or_load<L, Fut>(&self, key: &K, loader: L, options: &SetOptions) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        load_through(Arc::clone(&self.tiers), 0, key.clone(), loader, options.clone()).await
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        let last = self.last();
        let writes = self.tiers.iter().enumerate().map(|(index, tier)| {
            let options = if index == last { options } else { tier.options_or(options) };
            tier.cache.set(key, value.clone(), options)
        });
        first_error(join_all(writes).await)
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        first_error(join_all(self.tiers.iter().map(|tier| tier.cache.delete(key))).await)
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>, Error> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let mut remaining: Vec<K> = keys.to_vec();
        let mut found = HashMap::with_capacity(keys.len());
        // Hits per tier, so each can be written back to the hotter tiers.
        let mut hits: Vec<(usize, Vec<(K, V)>)> = Vec::new();

        for (index, tier) in self.tiers.iter().enumerate() {
            let batch = tier.cache.get_many(&remaining).await?;
            if batch.is_empty() {
                continue;
            }
            remaining.retain(|key| !batch.contains_key(key));
            if index > 0 {
                hits.push((index, batch.iter().map(|(k, v)| (k.clone(), v.clone())).collect()));
            }
            found.extend(batch);
            if remaining.is_empty() {
                break;
            }
        }

        let backfill_options: Vec<SetOptions> = self.tiers.iter().map(Tier::backfill_options).collect();
        let backfills = hits.iter().flat_map(|(index, entries)| {
            self.tiers
                .iter()
                .zip(&backfill_options)
                .take(*index)
                .map(|(tier, options)| tier.cache.set_many(entries.clone(), options))
        });
        let backfilled = join_all(backfills).await;
        if !backfilled.is_empty() {
            telemetry::record(CacheLayer::Tiered, CacheOperation::GetMany, CacheActivity::Backfilled);
        }
        first_error(backfilled)?;

        Ok(found)
    }

    async fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> Result<(), Error> {
        let last = self.last();
        let writes = self.tiers.iter().enumerate().map(|(index, tier)| {
            let options = if index == last { options } else { tier.options_or(options) };
            tier.cache.set_many(entries.clone(), options)
        });
        first_error(join_all(writes).await)
    }

    async fn delete_many(&self, keys: &[K]) -> Result<(), Error> {
        first_error(join_all(self.tiers.iter().map(|tier| tier.cache.delete_many(keys))).await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::executor::block_on;
    use strata_tier::testing::{CacheOp, MockCache};

    use super::*;

    fn key(k: &str) -> String {
        k.to_string()
    }

    #[test]
    fn empty_tier_list_is_rejected() {
        let error = TieredCache::<String, i32>::new(Vec::new()).expect_err("should fail");
        assert_eq!(error.kind(), strata_tier::ErrorKind::Configuration);
    }

    #[test]
    fn single_tier_behaves_like_its_cache() {
        block_on(async {
            let mock = MockCache::<String, i32>::new();
            let cache = TieredCache::new(vec![Tier::new(mock.clone())]).expect("valid tiers");

            cache.set(&key("a"), 1, &SetOptions::new()).await.expect("set failed");
            assert_eq!(cache.get(&key("a")).await.expect("get failed"), Some(1));
            assert_eq!(cache.get(&key("b")).await.expect("get failed"), None);
            assert_eq!(cache.tier_count(), 1);
        });
    }

    #[test]
    fn hot_tiers_use_their_own_options_on_set() {
        block_on(async {
            let hot = MockCache::<String, i32>::new();
            let cold = MockCache::<String, i32>::new();
            let hot_options = SetOptions::new().with_ttl(Duration::from_secs(5));
            let cache = TieredCache::new(vec![
                Tier::new(hot.clone()).with_options(hot_options.clone()),
                Tier::new(cold.clone()).with_options(SetOptions::new().with_ttl(Duration::from_secs(99))),
            ])
            .expect("valid tiers");
            let caller = SetOptions::new().with_ttl(Duration::from_secs(60));

            cache.set(&key("a"), 1, &caller).await.expect("set failed");

            assert_eq!(
                hot.operations(),
                vec![CacheOp::Set {
                    key: key("a"),
                    value: 1,
                    options: hot_options
                }]
            );
            assert_eq!(
                cold.operations(),
                vec![CacheOp::Set {
                    key: key("a"),
                    value: 1,
                    options: caller
                }]
            );
        });
    }

    #[test]
    fn coldest_tier_falls_back_to_its_options_when_caller_sets_none() {
        block_on(async {
            let hot = MockCache::<String, i32>::new();
            let cold = MockCache::<String, i32>::new();
            let cold_options = SetOptions::new().with_ttl(Duration::from_secs(300));
            let cache = TieredCache::new(vec![
                Tier::new(hot),
                Tier::new(cold.clone()).with_options(cold_options.clone()),
            ])
            .expect("valid tiers");

            let value = cache
                .get_or_load(&key("a"), || async { Ok(7) }, &SetOptions::new())
                .await
                .expect("load failed");

            assert_eq!(value, 7);
            assert!(cold.operations().contains(&CacheOp::Set {
                key: key("a"),
                value: 7,
                options: cold_options
            }));
        });
    }

    #[test]
    fn empty_get_many_touches_no_tier() {
        block_on(async {
            let hot = MockCache::<String, i32>::new();
            let cold = MockCache::<String, i32>::new();
            let cache = TieredCache::new(vec![Tier::new(hot.clone()), Tier::new(cold.clone())]).expect("valid tiers");

            assert!(cache.get_many(&[]).await.expect("get_many failed").is_empty());
            assert!(hot.operations().is_empty());
            assert!(cold.operations().is_empty());
        });
    }

    #[test]
    fn every_read_path_backfills_with_tier_options_or_defaults() {
        block_on(async {
            let configured = SetOptions::new().with_ttl(Duration::from_secs(30));
            let plain = MockCache::<String, i32>::new();
            let tuned = MockCache::<String, i32>::new();
            let cold = MockCache::<String, i32>::with_data(HashMap::from([(key("a"), 1), (key("b"), 2)]));
            let cache = TieredCache::new(vec![
                Tier::new(plain.clone()),
                Tier::new(tuned.clone()).with_options(configured.clone()),
                Tier::new(cold.clone()),
            ])
            .expect("valid tiers");
            let caller = SetOptions::new().with_ttl(Duration::from_secs(999));

            cache.get(&key("a")).await.expect("get failed");
            cache.get_many(&[key("b")]).await.expect("get_many failed");
            cache
                .get_or_load(&key("c"), || async { Ok(3) }, &caller)
                .await
                .expect("load failed");

            let written_with = |mock: &MockCache<String, i32>| -> Vec<SetOptions> {
                mock.operations()
                    .into_iter()
                    .filter_map(|op| match op {
                        CacheOp::Set { options, .. } | CacheOp::SetMany { options, .. } => Some(options),
                        _ => None,
                    })
                    .collect()
            };
            assert_eq!(written_with(&plain), vec![SetOptions::default(); 3]);
            assert_eq!(written_with(&tuned), vec![configured; 3]);
            // Only the coldest tier sees the caller's options.
            assert_eq!(written_with(&cold), vec![caller]);
        });
    }
}
