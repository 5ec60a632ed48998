// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache stores and layers.
//!
//! [`CacheTier`] defines the contract that every backend and every layer
//! implements. This trait is designed for composition: a layer holds some other
//! `CacheTier` and is itself a `CacheTier`.

use std::{collections::HashMap, hash::Hash};

use futures::future::join_all;

use crate::{Error, SetOptions};

/// Trait for cache stores and layers.
///
/// Only `get`, `set` and `delete` are required. The remaining operations have
/// default implementations built from those three:
///
/// - `get_or_load`: `get`; on a miss call the loader, `set` the result, return it.
///   There is no lock, so concurrent misses may each run the loader unless a
///   coalescing layer sits above.
/// - `get_many`, `set_many`, `delete_many`: run the singular operation for every
///   key concurrently and wait for all of them. Nothing is atomic across keys; the
///   first error is reported once every call has settled.
///
/// Absence is `Ok(None)`, never an error.
pub trait CacheTier<K, V>: Send + Sync
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Gets a value, returning `None` if the key is absent.
    fn get(&self, key: &K) -> impl Future<Output = Result<Option<V>, Error>> + Send;

    /// Stores a value under `key`.
    fn set(&self, key: &K, value: V, options: &SetOptions) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes the value stored under `key`. Removing an absent key succeeds.
    fn delete(&self, key: &K) -> impl Future<Output = Result<(), Error>> + Send;

    /// Gets a value, or produces it with `loader` and stores it.
    ///
    /// Loader failures are returned as-is and nothing is stored.
    fn get_or_load<L, Fut>(&self, key: &K, loader: L, options: &SetOptions) -> impl Future<Output = Result<V, Error>> + Send
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        async move {
            if let Some(value) = self.get(key).await? {
                return Ok(value);
            }
            let value = loader().await?;
            self.set(key, value.clone(), options).await?;
            Ok(value)
        }
    }

    /// Gets several values at once. Only keys that were found appear in the result.
    fn get_many(&self, keys: &[K]) -> impl Future<Output = Result<HashMap<K, V>, Error>> + Send {
        async move {
            let results = join_all(keys.iter().map(|key| self.get(key))).await;
            let mut found = HashMap::with_capacity(keys.len());
            for (key, result) in keys.iter().zip(results) {
                if let Some(value) = result? {
                    found.insert(key.clone(), value);
                }
            }
            Ok(found)
        }
    }

    /// Stores several values with the same options.
    fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            let (keys, values): (Vec<K>, Vec<V>) = entries.into_iter().unzip();
            let results = join_all(keys.iter().zip(values).map(|(key, value)| self.set(key, value, options))).await;
            results.into_iter().collect()
        }
    }

    /// Removes several keys.
    fn delete_many(&self, keys: &[K]) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            let results = join_all(keys.iter().map(|key| self.delete(key))).await;
            results.into_iter().collect()
        }
    }
}
