// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous stores that live in the same process.

use std::{fmt::Debug, hash::Hash, marker::PhantomData, sync::Arc};

use crate::{CacheTier, Error, SetOptions};

/// Why a value left a [`LocalCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum DisposeCause {
    /// A `set` overwrote the value.
    Replaced,
    /// A `delete` removed the value.
    Removed,
}

/// Callback invoked with every value that leaves a [`LocalCache`].
pub type DisposeHook<K, V> = Arc<dyn Fn(&K, V, DisposeCause) + Send + Sync>;

/// A store whose primitives complete synchronously.
///
/// In-process stores have nothing to await, so they implement this trait and get
/// the async [`CacheTier`] contract from [`LocalCache`]. Mutations report the value
/// they displaced so the adapter can hand it to a dispose hook.
pub trait LocalCacheTier<K, V>: Send + Sync {
    /// Gets a value, returning `None` if the key is absent or expired.
    fn get_local(&self, key: &K) -> Option<V>;

    /// Stores a value and returns the live value it replaced, if any.
    fn set_local(&self, key: &K, value: V, options: &SetOptions) -> Option<V>;

    /// Removes a key and returns the live value it held, if any.
    fn delete_local(&self, key: &K) -> Option<V>;
}

/// Adapts a [`LocalCacheTier`] to the async [`CacheTier`] contract.
///
/// The optional dispose hook runs synchronously on the calling task, after the
/// store has been updated.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
///
/// use strata_tier::{CacheTier, DisposeCause, LocalCache, LocalCacheTier, SetOptions};
///
/// #[derive(Default)]
/// struct Slot(Mutex<Option<(u32, String)>>);
///
/// impl LocalCacheTier<u32, String> for Slot {
///     fn get_local(&self, key: &u32) -> Option<String> {
///         self.0.lock().unwrap().as_ref().filter(|(k, _)| k == key).map(|(_, v)| v.clone())
///     }
///
///     fn set_local(&self, key: &u32, value: String, _: &SetOptions) -> Option<String> {
///         self.0.lock().unwrap().replace((*key, value)).map(|(_, v)| v)
///     }
///
///     fn delete_local(&self, key: &u32) -> Option<String> {
///         let mut slot = self.0.lock().unwrap();
///         if slot.as_ref().is_some_and(|(k, _)| k == key) { slot.take().map(|(_, v)| v) } else { None }
///     }
/// }
///
/// let disposed = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&disposed);
/// let cache = LocalCache::new(Slot::default())
///     .on_dispose(move |_: &u32, value: String, cause| sink.lock().unwrap().push((value, cause)));
///
/// # futures::executor::block_on(async {
/// cache.set(&1, "a".to_string(), &SetOptions::new()).await.unwrap();
/// cache.set(&1, "b".to_string(), &SetOptions::new()).await.unwrap();
/// # });
/// assert_eq!(disposed.lock().unwrap()[0], ("a".to_string(), DisposeCause::Replaced));
/// ```
pub struct LocalCache<K, V, S> {
    store: S,
    on_dispose: Option<DisposeHook<K, V>>,
    _phantom: PhantomData<fn(K) -> V>,
}

impl<K, V, S> LocalCache<K, V, S> {
    /// Wraps a synchronous store.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            on_dispose: None,
            _phantom: PhantomData,
        }
    }

    /// Registers a hook that receives every replaced or removed value.
    #[must_use]
    pub fn on_dispose<F>(self, hook: F) -> Self
    where
        F: Fn(&K, V, DisposeCause) + Send + Sync + 'static,
    {
        self.with_dispose_hook(Some(Arc::new(hook)))
    }

    /// Replaces the dispose hook with an already shared one.
    #[must_use]
    pub fn with_dispose_hook(mut self, hook: Option<DisposeHook<K, V>>) -> Self {
        self.on_dispose = hook;
        self
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn dispose(&self, key: &K, displaced: Option<V>, cause: DisposeCause) {
        if let (Some(hook), Some(value)) = (&self.on_dispose, displaced) {
            hook(key, value, cause);
        }
    }
}

// Clones share the store when `S` does, and share the dispose hook.
impl<K, V, S: Clone> Clone for LocalCache<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            on_dispose: self.on_dispose.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<K, V, S: Debug> Debug for LocalCache<K, V, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("store", &self.store)
            .field("on_dispose", &self.on_dispose.is_some())
            .finish()
    }
}

impl<K, V, S> CacheTier<K, V> for LocalCache<K, V, S>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    S: LocalCacheTier<K, V>,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        Ok(self.store.get_local(key))
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        let displaced = self.store.set_local(key, value, options);
        self.dispose(key, displaced, DisposeCause::Replaced);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        let removed = self.store.delete_local(key);
        self.dispose(key, removed, DisposeCause::Removed);
        Ok(())
    }
}
