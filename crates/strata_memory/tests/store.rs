// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `InMemoryCache`.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use strata_memory::{InMemoryCacheBuilder, InMemoryStore};
use strata_tier::{CacheTier, DisposeCause, SetOptions};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn key(k: &str) -> String {
    k.to_string()
}

#[test]
fn get_returns_none_for_missing_key() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        let result = cache.get(&key("missing")).await.expect("get failed");
        assert!(result.is_none());
    });
}

#[test]
fn set_and_get_returns_value() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        cache.set(&key("key"), 42, &SetOptions::new()).await.expect("set failed");
        assert_eq!(cache.get(&key("key")).await.expect("get failed"), Some(42));
    });
}

#[test]
fn set_overwrites_existing_value() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        cache.set(&key("key"), 1, &SetOptions::new()).await.expect("set failed");
        cache.set(&key("key"), 2, &SetOptions::new()).await.expect("set failed");
        assert_eq!(cache.get(&key("key")).await.expect("get failed"), Some(2));
    });
}

#[test]
fn delete_removes_entry() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        cache.set(&key("key"), 1, &SetOptions::new()).await.expect("set failed");
        cache.delete(&key("key")).await.expect("delete failed");
        assert_eq!(cache.get(&key("key")).await.expect("get failed"), None);
    });
}

#[test]
fn entry_expires_after_write_ttl() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        let short = SetOptions::new().with_ttl(Duration::from_millis(20));
        cache.set(&key("short"), 1, &short).await.expect("set failed");
        cache.set(&key("forever"), 2, &SetOptions::new()).await.expect("set failed");

        thread::sleep(Duration::from_millis(100));

        assert_eq!(cache.get(&key("short")).await.expect("get failed"), None);
        assert_eq!(cache.get(&key("forever")).await.expect("get failed"), Some(2));
    });
}

#[test]
fn store_default_ttl_applies_when_write_has_none() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new()
            .time_to_live(Duration::from_millis(20))
            .build();
        let long = SetOptions::new().with_ttl(Duration::from_secs(60));
        cache.set(&key("default"), 1, &SetOptions::new()).await.expect("set failed");
        cache.set(&key("explicit"), 2, &long).await.expect("set failed");

        thread::sleep(Duration::from_millis(100));

        assert_eq!(cache.get(&key("default")).await.expect("get failed"), None);
        assert_eq!(cache.get(&key("explicit")).await.expect("get failed"), Some(2));
    });
}

#[test]
fn dispose_hook_sees_replaced_and_removed_values() {
    block_on(async {
        let disposed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&disposed);
        let cache = InMemoryCacheBuilder::<String, i32>::new()
            .on_dispose(move |key: &String, value, cause| {
                sink.lock().expect("lock poisoned").push((key.clone(), value, cause));
            })
            .build();

        cache.set(&key("k"), 1, &SetOptions::new()).await.expect("set failed");
        cache.set(&key("k"), 2, &SetOptions::new()).await.expect("set failed");
        cache.delete(&key("k")).await.expect("delete failed");

        assert_eq!(
            *disposed.lock().expect("lock poisoned"),
            vec![(key("k"), 1, DisposeCause::Replaced), (key("k"), 2, DisposeCause::Removed)]
        );
    });
}

#[test]
fn max_capacity_bounds_entry_count() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<u32, u32>::new().max_capacity(10).build();
        for i in 0..100 {
            cache.set(&i, i, &SetOptions::new()).await.expect("set failed");
        }
        cache.store().run_pending_tasks();
        assert!(cache.store().entry_count() <= 10);
    });
}

#[test]
fn name_is_exposed() {
    let cache = InMemoryStore::<String, i32>::builder().name("users").build();
    assert_eq!(cache.store().name(), Some("users"));
}

#[test]
fn batch_defaults_work_over_the_store() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        cache
            .set_many(vec![(key("a"), 1), (key("b"), 2)], &SetOptions::new())
            .await
            .expect("set_many failed");
        let found = cache.get_many(&[key("a"), key("b"), key("c")]).await.expect("get_many failed");
        assert_eq!(found.len(), 2);
    });
}

#[test]
fn clones_share_entries() {
    block_on(async {
        let cache = InMemoryCacheBuilder::<String, i32>::new().build();
        let other = cache.clone();

        cache.set(&key("k"), 1, &SetOptions::new()).await.expect("set failed");
        assert_eq!(other.get(&key("k")).await.expect("get failed"), Some(1));

        other.delete(&key("k")).await.expect("delete failed");
        assert_eq!(cache.get(&key("k")).await.expect("get failed"), None);
    });
}
