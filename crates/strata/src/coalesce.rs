// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Request coalescing: concurrent calls on one key share one underlying call.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
};

use futures::future::join_all;
use strata_tier::{CacheTier, Error, SetOptions};

use crate::{
    flight::{FlightKind, FlightResult, Flights, Joined, Lead, Role},
    telemetry::{self, CacheActivity, CacheLayer, CacheOperation},
};

/// A cache layer that collapses concurrent operations on the same key.
///
/// While an underlying call for a key is outstanding, every other call on that
/// key waits for it and receives the same result, errors included:
///
/// - Concurrent `get`s share one underlying `get`.
/// - Concurrent `get_or_load`s share one underlying read-through, so the loader
///   runs once per stampede.
/// - A `get_or_load` that arrives while a `get` is outstanding waits for it. If
///   the `get` misses, that `get_or_load` calls its loader directly and the
///   original `get` callers receive the loaded value.
/// - `set` and `delete` (and their batch forms) register themselves while they
///   run, so concurrent reads observe the value being written, or its absence,
///   instead of racing the store.
///
/// Coordination is per process and per instance. Once the underlying call
/// settles the key is forgotten, so the next caller starts fresh.
///
/// # Examples
///
/// ```
/// use strata::{CacheTier, CoalescingCache, SetOptions};
/// use strata_tier::testing::MockCache;
///
/// # futures::executor::block_on(async {
/// let cache = CoalescingCache::new(MockCache::<String, u64>::new());
///
/// let value = cache
///     .get_or_load(&"answer".to_string(), || async { Ok(42) }, &SetOptions::new())
///     .await?;
/// assert_eq!(value, 42);
/// # Ok::<(), strata::Error>(())
/// # });
/// ```
pub struct CoalescingCache<K, V, C>
where
    K: Eq + Hash,
{
    inner: C,
    flights: Flights<K, V>,
}

impl<K, V, C> CoalescingCache<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, V>,
{
    /// Wraps `cache` with request coalescing.
    #[must_use]
    pub fn new(cache: C) -> Self {
        Self {
            inner: cache,
            flights: Flights::new(),
        }
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    async fn lead_load<L, Fut>(&self, lead: Lead<K, V>, key: &K, loader: L, options: &SetOptions, missed: bool) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        // After a miss has been observed, reading again would only repeat it.
        let result = if missed {
            match loader().await {
                Ok(value) => self.inner.set(key, value.clone(), options).await.map(|()| value),
                Err(error) => Err(error),
            }
        } else {
            self.inner.get_or_load(key, loader, options).await
        };
        lead.complete(result.clone().map(Some));
        result
    }
}

/// Publishes the outcome of a leading read.
///
/// A miss may be handed to a `get_or_load` that joined in the meantime; the read
/// then reports whatever that load produces.
async fn settle_read<K, V>(lead: Lead<K, V>, result: FlightResult<V>) -> FlightResult<V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    match result {
        Ok(None) => match lead.complete_miss() {
            Some(load) => load.settled().await.unwrap_or(Ok(None)),
            None => Ok(None),
        },
        result => {
            lead.complete(result.clone());
            result
        }
    }
}

impl<K, V, C> Debug for CoalescingCache<K, V, C>
where
    K: Eq + Hash,
    C: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoalescingCache").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<K, V, C> CacheTier<K, V> for CoalescingCache<K, V, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    C: CacheTier<K, V>,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        loop {
            match self.flights.join_or_lead(key, FlightKind::Read) {
                Role::Leader(lead) => {
                    let result = self.inner.get(key).await;
                    return settle_read(lead, result).await;
                }
                Role::Follower(follow) => {
                    telemetry::record(CacheLayer::Coalescing, CacheOperation::Get, CacheActivity::Coalesced);
                    if let Some(result) = follow.settled().await {
                        return result;
                    }
                }
            }
        }
    }

    async fn get_or_load<L, Fut>(&self, key: &K, loader: L, options: &SetOptions) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let mut missed = false;
        loop {
            match self.flights.join_or_lead(key, FlightKind::Load) {
                Role::Leader(lead) => return self.lead_load(lead, key, loader, options, missed).await,
                Role::Follower(follow) => {
                    telemetry::record(CacheLayer::Coalescing, CacheOperation::GetOrLoad, CacheActivity::Coalesced);
                    match follow.wait().await {
                        Joined::HandedOff(lead) => return self.lead_load(lead, key, loader, options, true).await,
                        Joined::Settled(Ok(Some(value))) => return Ok(value),
                        Joined::Settled(Ok(None)) => missed = true,
                        Joined::Settled(Err(error)) => return Err(error),
                        Joined::Abandoned => {}
                    }
                }
            }
        }
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        let lead = self.flights.lead(key, FlightKind::Write);
        let result = self.inner.set(key, value.clone(), options).await;
        lead.complete(result.clone().map(|()| Some(value)));
        result
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        let lead = self.flights.lead(key, FlightKind::Write);
        let result = self.inner.delete(key).await;
        lead.complete(result.clone().map(|()| None));
        result
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>, Error> {
        let mut seen = HashSet::with_capacity(keys.len());
        let mut leads = Vec::new();
        let mut follows = Vec::new();
        for key in keys {
            if !seen.insert(key) {
                continue;
            }
            match self.flights.join_or_lead(key, FlightKind::Read) {
                Role::Leader(lead) => leads.push((key.clone(), lead)),
                Role::Follower(follow) => follows.push((key.clone(), follow)),
            }
        }

        let mut results = Vec::with_capacity(leads.len() + follows.len());
        if !leads.is_empty() {
            let lead_keys: Vec<K> = leads.iter().map(|(key, _)| key.clone()).collect();
            match self.inner.get_many(&lead_keys).await {
                Ok(mut found) => {
                    let settled = leads.into_iter().map(|(key, lead)| {
                        let value = found.remove(&key);
                        async move { (key, settle_read(lead, Ok(value)).await) }
                    });
                    results.extend(join_all(settled).await);
                }
                Err(error) => {
                    for (_, lead) in leads {
                        lead.complete(Err(error.clone()));
                    }
                    return Err(error);
                }
            }
        }

        if !follows.is_empty() {
            telemetry::record(CacheLayer::Coalescing, CacheOperation::GetMany, CacheActivity::Coalesced);
        }
        let followed = follows.into_iter().map(|(key, follow)| async move {
            let result = match follow.settled().await {
                Some(result) => result,
                None => self.get(&key).await,
            };
            (key, result)
        });
        results.extend(join_all(followed).await);

        let mut values = HashMap::with_capacity(results.len());
        for (key, result) in results {
            if let Some(value) = result? {
                values.insert(key, value);
            }
        }
        Ok(values)
    }

    async fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> Result<(), Error> {
        let leads: Vec<_> = entries.iter().map(|(key, _)| self.flights.lead(key, FlightKind::Write)).collect();
        let values: Vec<V> = entries.iter().map(|(_, value)| value.clone()).collect();
        let result = self.inner.set_many(entries, options).await;
        for (lead, value) in leads.into_iter().zip(values) {
            lead.complete(result.clone().map(|()| Some(value)));
        }
        result
    }

    async fn delete_many(&self, keys: &[K]) -> Result<(), Error> {
        let leads: Vec<_> = keys.iter().map(|key| self.flights.lead(key, FlightKind::Write)).collect();
        let result = self.inner.delete_many(keys).await;
        for lead in leads {
            lead.complete(result.clone().map(|()| None));
        }
        result
    }
}
