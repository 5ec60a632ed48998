// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Dynamic cache tier wrapper for type erasure.

use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use futures::{FutureExt, future::BoxFuture};

use crate::{CacheTier, Error, SetOptions};

type BoxLoader<V> = Box<dyn FnOnce() -> BoxFuture<'static, Result<V, Error>> + Send>;

/// Object-safe mirror of [`CacheTier`].
///
/// `CacheTier::get_or_load` is generic over the loader, so the trait itself cannot
/// be made into an object. Here the loader is boxed instead.
trait ErasedCacheTier<K, V>: Send + Sync {
    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Error>>;

    fn set<'a>(&'a self, key: &'a K, value: V, options: &'a SetOptions) -> BoxFuture<'a, Result<(), Error>>;

    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<(), Error>>;

    fn get_or_load<'a>(&'a self, key: &'a K, loader: BoxLoader<V>, options: &'a SetOptions) -> BoxFuture<'a, Result<V, Error>>;

    fn get_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, Result<HashMap<K, V>, Error>>;

    fn set_many<'a>(&'a self, entries: Vec<(K, V)>, options: &'a SetOptions) -> BoxFuture<'a, Result<(), Error>>;

    fn delete_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, Result<(), Error>>;
}

impl<K, V, T> ErasedCacheTier<K, V> for T
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    T: CacheTier<K, V>,
{
    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<Option<V>, Error>> {
        CacheTier::get(self, key).boxed()
    }

    fn set<'a>(&'a self, key: &'a K, value: V, options: &'a SetOptions) -> BoxFuture<'a, Result<(), Error>> {
        CacheTier::set(self, key, value, options).boxed()
    }

    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, Result<(), Error>> {
        CacheTier::delete(self, key).boxed()
    }

    fn get_or_load<'a>(&'a self, key: &'a K, loader: BoxLoader<V>, options: &'a SetOptions) -> BoxFuture<'a, Result<V, Error>> {
        CacheTier::get_or_load(self, key, loader, options).boxed()
    }

    fn get_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, Result<HashMap<K, V>, Error>> {
        CacheTier::get_many(self, keys).boxed()
    }

    fn set_many<'a>(&'a self, entries: Vec<(K, V)>, options: &'a SetOptions) -> BoxFuture<'a, Result<(), Error>> {
        CacheTier::set_many(self, entries, options).boxed()
    }

    fn delete_many<'a>(&'a self, keys: &'a [K]) -> BoxFuture<'a, Result<(), Error>> {
        CacheTier::delete_many(self, keys).boxed()
    }
}

/// Extension trait for converting any `CacheTier` into a `DynamicCache`.
///
/// This trait is automatically implemented for all types that implement `CacheTier`.
///
/// # Examples
///
/// ```
/// use strata_tier::{CacheTier, DynamicCache, DynamicCacheExt};
///
/// fn erase<T>(tier: T) -> DynamicCache<String, i32>
/// where
///     T: CacheTier<String, i32> + 'static,
/// {
///     tier.into_dynamic()
/// }
/// ```
pub trait DynamicCacheExt<K, V>: Sized {
    /// Converts this cache tier into a `DynamicCache`.
    fn into_dynamic(self) -> DynamicCache<K, V>;
}

impl<K, V, T> DynamicCacheExt<K, V> for T
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    T: CacheTier<K, V> + 'static,
{
    fn into_dynamic(self) -> DynamicCache<K, V> {
        DynamicCache::new(self)
    }
}

/// A clonable cache tier with its concrete type erased.
///
/// `DynamicCache` wraps a trait object in an `Arc` so that stores of different
/// types can sit side by side, for example as the tiers of a multi-tier cache.
/// Every operation, batch operations included, is forwarded to the wrapped tier,
/// so a tier's own batch implementation is still used.
pub struct DynamicCache<K, V>(Arc<dyn ErasedCacheTier<K, V>>);

impl<K, V> DynamicCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a new dynamic cache from any `CacheTier` implementation.
    pub fn new<T>(tier: T) -> Self
    where
        T: CacheTier<K, V> + 'static,
    {
        Self(Arc::new(tier))
    }
}

impl<K, V> Debug for DynamicCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicCache").finish_non_exhaustive()
    }
}

impl<K, V> Clone for DynamicCache<K, V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<K, V> CacheTier<K, V> for DynamicCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        self.0.get(key).await
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        self.0.set(key, value, options).await
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.0.delete(key).await
    }

    async fn get_or_load<L, Fut>(&self, key: &K, loader: L, options: &SetOptions) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let loader: BoxLoader<V> = Box::new(move || loader().boxed());
        self.0.get_or_load(key, loader, options).await
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>, Error> {
        self.0.get_many(keys).await
    }

    async fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> Result<(), Error> {
        self.0.set_many(entries, options).await
    }

    async fn delete_many(&self, keys: &[K]) -> Result<(), Error> {
        self.0.delete_many(keys).await
    }
}

#[cfg(test)]
mod tests {
    use super::DynamicCacheExt;
    use crate::{
        CacheTier, SetOptions,
        testing::{CacheOp, MockCache},
    };

    #[tokio::test]
    async fn forwards_batch_operations_to_the_wrapped_tier() {
        let mock = MockCache::<String, i32>::new();
        let dynamic = mock.clone().into_dynamic();

        dynamic
            .set_many(vec![("a".to_string(), 1), ("b".to_string(), 2)], &SetOptions::new())
            .await
            .expect("set_many failed");
        let found = dynamic
            .get_many(&["a".to_string(), "b".to_string()])
            .await
            .expect("get_many failed");

        assert_eq!(found.len(), 2);
        let ops = mock.operations();
        assert!(matches!(ops[0], CacheOp::SetMany { .. }));
        assert!(matches!(ops[1], CacheOp::GetMany(_)));
    }

    #[tokio::test]
    async fn get_or_load_runs_boxed_loader_on_miss() {
        let dynamic = MockCache::<String, i32>::new().into_dynamic();
        let value = dynamic
            .get_or_load(&"k".to_string(), || async { Ok(7) }, &SetOptions::new())
            .await
            .expect("get_or_load failed");
        assert_eq!(value, 7);
        assert_eq!(dynamic.get(&"k".to_string()).await.expect("get failed"), Some(7));
    }

    #[test]
    fn clone_shares_the_same_tier() {
        let mock = MockCache::<String, i32>::new();
        let dynamic = mock.clone().into_dynamic();
        let cloned = dynamic.clone();
        futures::executor::block_on(cloned.set(&"k".to_string(), 1, &SetOptions::new())).expect("set failed");
        assert!(mock.contains_key(&"k".to_string()));
        assert_eq!(format!("{dynamic:?}"), "DynamicCache { .. }");
    }
}
