// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tracks background refreshes so that each key has at most one at a time.

use std::{collections::HashSet, fmt::Debug, hash::Hash, sync::Arc};

use anyspawn::Spawner;
use parking_lot::Mutex;

/// Keys with a background refresh running, and the spawner that runs them.
pub(crate) struct Revalidation<K> {
    in_flight: Arc<Mutex<HashSet<K>>>,
    spawner: Spawner,
}

impl<K> Debug for Revalidation<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Revalidation")
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl<K> Revalidation<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(spawner: Spawner) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            spawner,
        }
    }

    /// Marks `key` as refreshing. Returns `None` if a refresh is already running.
    pub fn try_start(&self, key: &K) -> Option<RevalidationGuard<K>> {
        self.in_flight.lock().insert(key.clone()).then(|| RevalidationGuard {
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Runs `work` in the background; the key is released when it finishes,
    /// whatever the outcome.
    pub fn spawn(&self, guard: RevalidationGuard<K>, work: impl Future<Output = ()> + Send + 'static) {
        // Fire-and-forget: dropping the handle detaches the task.
        let _ = self.spawner.spawn(async move {
            let _guard = guard;
            work.await;
        });
    }

    #[cfg(test)]
    pub fn is_running(&self, key: &K) -> bool {
        self.in_flight.lock().contains(key)
    }
}

/// Clears a key's refresh marker when dropped.
pub(crate) struct RevalidationGuard<K>
where
    K: Eq + Hash,
{
    key: K,
    in_flight: Arc<Mutex<HashSet<K>>>,
}

impl<K> Drop for RevalidationGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_refresh_per_key() {
        let revalidation = Revalidation::new(Spawner::new_tokio());
        let first = revalidation.try_start(&"k");
        assert!(first.is_some());
        assert!(revalidation.try_start(&"k").is_none());
        assert!(revalidation.try_start(&"other").is_some());

        drop(first);
        assert!(!revalidation.is_running(&"k"));
    }

    #[tokio::test]
    async fn key_is_released_after_background_work() {
        let revalidation = Revalidation::new(Spawner::new_tokio());
        let guard = revalidation.try_start(&"k").expect("should start");
        revalidation.spawn(guard, async {});
        assert!(revalidation.is_running(&"k"));

        while revalidation.is_running(&"k") {
            tokio::task::yield_now().await;
        }
    }
}
