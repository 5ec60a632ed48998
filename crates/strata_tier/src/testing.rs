// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock cache implementation for testing.
//!
//! This module provides `MockCache`, a configurable in-memory cache that
//! records all operations, supports failure injection for testing error paths,
//! and can park operations behind a gate so tests control how calls overlap.

use std::{collections::HashMap, hash::Hash, sync::Arc};

use futures::{
    FutureExt,
    channel::oneshot,
    future::Shared,
};
use parking_lot::Mutex;

use crate::{CacheTier, Error, SetOptions};

/// Recorded cache operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOp<K, V> {
    /// A get operation was performed with the given key.
    Get(K),
    /// A set operation was performed.
    Set {
        /// The key that was written.
        key: K,
        /// The value that was written.
        value: V,
        /// The options the value was written with.
        options: SetOptions,
    },
    /// A delete operation was performed with the given key.
    Delete(K),
    /// A batch get was performed with the given keys.
    GetMany(Vec<K>),
    /// A batch set was performed.
    SetMany {
        /// The entries that were written.
        entries: Vec<(K, V)>,
        /// The options the entries were written with.
        options: SetOptions,
    },
    /// A batch delete was performed with the given keys.
    DeleteMany(Vec<K>),
}

impl<K, V> CacheOp<K, V> {
    /// Returns `true` for `Get` and `GetMany`.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Get(_) | Self::GetMany(_))
    }
}

type FailPredicate<K, V> = Box<dyn Fn(&CacheOp<K, V>) -> bool + Send + Sync>;

type Gate = Shared<oneshot::Receiver<()>>;

/// A configurable mock cache for testing.
///
/// This cache stores values in memory and can be configured to fail
/// operations on demand, making it useful for testing error handling paths.
/// All operations are recorded for later verification, at the moment they start.
///
/// Batch operations are recorded as a single operation, so a test can tell
/// whether a layer issued one batch call or many singular ones.
///
/// # Examples
///
/// ```
/// use strata_tier::{testing::{MockCache, CacheOp}, CacheTier, SetOptions};
///
/// # futures::executor::block_on(async {
/// let cache = MockCache::<String, i32>::new();
///
/// cache.set(&"key".to_string(), 42, &SetOptions::new()).await.unwrap();
/// let value = cache.get(&"key".to_string()).await.unwrap();
/// assert_eq!(value, Some(42));
///
/// assert_eq!(cache.operations(), vec![
///     CacheOp::Set { key: "key".to_string(), value: 42, options: SetOptions::new() },
///     CacheOp::Get("key".to_string()),
/// ]);
/// # });
/// ```
///
/// # Holding Operations
///
/// [`hold`](Self::hold) parks every operation that starts afterwards, right after it
/// is recorded, until [`release`](Self::release) is called. Concurrent callers are
/// therefore guaranteed to overlap, which is what coalescing tests need.
pub struct MockCache<K, V> {
    data: Arc<Mutex<HashMap<K, V>>>,
    operations: Arc<Mutex<Vec<CacheOp<K, V>>>>,
    fail_when: Arc<Mutex<Option<FailPredicate<K, V>>>>,
    gate: Arc<Mutex<Option<(oneshot::Sender<()>, Gate)>>>,
}

impl<K, V> std::fmt::Debug for MockCache<K, V>
where
    K: std::fmt::Debug,
    V: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCache")
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("held", &self.gate.lock().is_some())
            .finish()
    }
}

impl<K, V> Clone for MockCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<K, V> Default for MockCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MockCache<K, V> {
    /// Creates a new empty mock cache.
    #[must_use]
    pub fn new() -> Self {
        Self::with_data(HashMap::new())
    }

    /// Creates a mock cache with pre-populated data.
    #[must_use]
    pub fn with_data(data: HashMap<K, V>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            gate: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the number of entries in the cache.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Parks every operation that starts from now on until [`release`](Self::release).
    ///
    /// Calling `hold` while already held keeps the existing gate.
    pub fn hold(&self) {
        let mut gate = self.gate.lock();
        if gate.is_none() {
            let (sender, receiver) = oneshot::channel();
            *gate = Some((sender, receiver.shared()));
        }
    }

    /// Lets every parked operation continue and stops parking new ones.
    pub fn release(&self) {
        if let Some((sender, _)) = self.gate.lock().take() {
            let _ = sender.send(());
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().as_ref().map(|(_, gate)| gate.clone());
        if let Some(gate) = gate {
            // A dropped sender opens the gate as well.
            let _ = gate.await;
        }
    }
}

impl<K, V> MockCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Returns true if the cache contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the stored value without recording an operation.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        self.data.lock().get(key).cloned()
    }
}

impl<K, V> MockCache<K, V>
where
    K: Clone,
    V: Clone,
{
    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should fail.
    /// A failing operation is still recorded but does not touch the stored data.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_tier::testing::{MockCache, CacheOp};
    ///
    /// let cache: MockCache<String, i32> = MockCache::new();
    ///
    /// // Fail all operations
    /// cache.fail_when(|_| true);
    ///
    /// // Fail only reads
    /// cache.fail_when(CacheOp::is_read);
    ///
    /// // Fail gets for a specific key
    /// cache.fail_when(|op| matches!(op, CacheOp::Get(k) if k == "bad_key"));
    /// ```
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&CacheOp<K, V>) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<CacheOp<K, V>> {
        self.operations.lock().clone()
    }

    /// Returns how many recorded operations match the predicate.
    #[must_use]
    pub fn count_operations(&self, predicate: impl Fn(&CacheOp<K, V>) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    /// Records `op`, waits at the gate, then checks the failure predicate.
    async fn begin(&self, op: CacheOp<K, V>, what: &'static str) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        self.pass_gate().await;
        if fail {
            return Err(Error::store(format!("mock: {what} failed")));
        }
        Ok(())
    }
}

impl<K, V> CacheTier<K, V> for MockCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        self.begin(CacheOp::Get(key.clone()), "get").await?;
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &K, value: V, options: &SetOptions) -> Result<(), Error> {
        let op = CacheOp::Set {
            key: key.clone(),
            value: value.clone(),
            options: options.clone(),
        };
        self.begin(op, "set").await?;
        self.data.lock().insert(key.clone(), value);
        Ok(())
    }

    async fn delete(&self, key: &K) -> Result<(), Error> {
        self.begin(CacheOp::Delete(key.clone()), "delete").await?;
        self.data.lock().remove(key);
        Ok(())
    }

    async fn get_many(&self, keys: &[K]) -> Result<HashMap<K, V>, Error> {
        self.begin(CacheOp::GetMany(keys.to_vec()), "get_many").await?;
        let data = self.data.lock();
        Ok(keys
            .iter()
            .filter_map(|key| data.get(key).map(|value| (key.clone(), value.clone())))
            .collect())
    }

    async fn set_many(&self, entries: Vec<(K, V)>, options: &SetOptions) -> Result<(), Error> {
        let op = CacheOp::SetMany {
            entries: entries.clone(),
            options: options.clone(),
        };
        self.begin(op, "set_many").await?;
        self.data.lock().extend(entries);
        Ok(())
    }

    async fn delete_many(&self, keys: &[K]) -> Result<(), Error> {
        self.begin(CacheOp::DeleteMany(keys.to_vec()), "delete_many").await?;
        let mut data = self.data.lock();
        for key in keys {
            data.remove(key);
        }
        Ok(())
    }
}
