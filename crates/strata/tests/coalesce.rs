// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `CoalescingCache`.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::join_all;
use strata::{CacheTier, CoalescingCache, Error, SetOptions};
use strata_tier::testing::{CacheOp, MockCache};

fn key(k: &str) -> String {
    k.to_string()
}

fn is_get(op: &CacheOp<String, i32>) -> bool {
    matches!(op, CacheOp::Get(_))
}

fn counting_loader(calls: &Arc<AtomicUsize>, value: i32) -> impl FnOnce() -> futures::future::Ready<Result<i32, Error>> + Send + 'static {
    let calls = Arc::clone(calls);
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(value))
    }
}

async fn release_after_yield(mock: &MockCache<String, i32>) {
    tokio::task::yield_now().await;
    mock.release();
}

#[tokio::test]
async fn concurrent_gets_share_one_underlying_get() {
    let mock = MockCache::with_data(HashMap::from([(key("k"), 1)]));
    let cache = CoalescingCache::new(mock.clone());
    let k = key("k");

    mock.hold();
    let gets = join_all((0..5).map(|_| cache.get(&k)));
    let (results, ()) = futures::join!(gets, release_after_yield(&mock));

    for result in results {
        assert_eq!(result.expect("get failed"), Some(1));
    }
    assert_eq!(mock.count_operations(is_get), 1);
}

#[tokio::test]
async fn sequential_gets_each_reach_the_store() {
    let mock = MockCache::with_data(HashMap::from([(key("k"), 1)]));
    let cache = CoalescingCache::new(mock.clone());

    for _ in 0..3 {
        assert_eq!(cache.get(&key("k")).await.expect("get failed"), Some(1));
    }
    assert_eq!(mock.count_operations(is_get), 3);
}

#[tokio::test]
async fn concurrent_get_or_load_runs_the_loader_once() {
    let mock = MockCache::<String, i32>::new();
    let cache = CoalescingCache::new(mock.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let k = key("k");

    let options = SetOptions::new();

    mock.hold();
    let loads = join_all((0..4).map(|_| cache.get_or_load(&k, counting_loader(&calls, 5), &options)));
    let (results, ()) = futures::join!(loads, release_after_yield(&mock));

    for result in results {
        assert_eq!(result.expect("get_or_load failed"), 5);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(mock.peek(&k), Some(5));
}

#[tokio::test]
async fn get_that_misses_receives_the_value_loaded_by_a_racing_get_or_load() {
    let mock = MockCache::<String, i32>::new();
    let cache = CoalescingCache::new(mock.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let k = key("k");

    let options = SetOptions::new();

    mock.hold();
    let (read, loaded, ()) = futures::join!(
        cache.get(&k),
        cache.get_or_load(&k, counting_loader(&calls, 8), &options),
        release_after_yield(&mock)
    );

    assert_eq!(loaded.expect("get_or_load failed"), 8);
    assert_eq!(read.expect("get failed"), Some(8));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Only the leading get read the store; the load skipped straight to the loader.
    assert_eq!(mock.count_operations(is_get), 1);
}

#[tokio::test]
async fn get_or_load_after_a_racing_hit_does_not_load() {
    let mock = MockCache::with_data(HashMap::from([(key("k"), 3)]));
    let cache = CoalescingCache::new(mock.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let k = key("k");

    let options = SetOptions::new();

    mock.hold();
    let (read, loaded, ()) = futures::join!(
        cache.get(&k),
        cache.get_or_load(&k, counting_loader(&calls, 8), &options),
        release_after_yield(&mock)
    );

    assert_eq!(read.expect("get failed"), Some(3));
    assert_eq!(loaded.expect("get_or_load failed"), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn errors_reach_every_waiter_and_are_not_cached() {
    let mock = MockCache::<String, i32>::new();
    mock.fail_when(|op| matches!(op, CacheOp::Get(_)));
    let cache = CoalescingCache::new(mock.clone());
    let k = key("k");

    mock.hold();
    let gets = join_all((0..3).map(|_| cache.get(&k)));
    let (results, ()) = futures::join!(gets, release_after_yield(&mock));

    assert!(results.iter().all(Result::is_err));
    assert_eq!(mock.count_operations(is_get), 1);

    mock.clear_failures();
    assert_eq!(cache.get(&k).await.expect("get failed"), None);
    assert_eq!(mock.count_operations(is_get), 2);
}

#[tokio::test]
async fn loader_errors_reach_every_waiter() {
    let mock = MockCache::<String, i32>::new();
    let cache = CoalescingCache::new(mock.clone());
    let k = key("k");

    let options = SetOptions::new();

    mock.hold();
    let loads = join_all((0..3).map(|_| cache.get_or_load(&k, || async { Err(Error::loader("origin down")) }, &options)));
    let (results, ()) = futures::join!(loads, release_after_yield(&mock));

    for result in results {
        assert!(result.expect_err("load should fail").is_loader());
    }
    assert!(!mock.contains_key(&k));
}

#[tokio::test]
async fn reads_during_a_write_observe_the_written_value() {
    let mock = MockCache::<String, i32>::new();
    let cache = CoalescingCache::new(mock.clone());
    let k = key("k");

    let options = SetOptions::new();

    mock.hold();
    let (written, read, ()) = futures::join!(
        cache.set(&k, 9, &options),
        cache.get(&k),
        release_after_yield(&mock)
    );

    written.expect("set failed");
    assert_eq!(read.expect("get failed"), Some(9));
    assert_eq!(mock.count_operations(is_get), 0);
}

#[tokio::test]
async fn reads_during_a_delete_observe_absence() {
    let mock = MockCache::with_data(HashMap::from([(key("k"), 1)]));
    let cache = CoalescingCache::new(mock.clone());
    let k = key("k");

    mock.hold();
    let (deleted, read, ()) = futures::join!(cache.delete(&k), cache.get(&k), release_after_yield(&mock));

    deleted.expect("delete failed");
    assert_eq!(read.expect("get failed"), None);
}

#[tokio::test]
async fn get_many_joins_reads_already_in_flight() {
    let mock = MockCache::with_data(HashMap::from([(key("a"), 1), (key("b"), 2)]));
    let cache = CoalescingCache::new(mock.clone());
    let a = key("a");
    let keys = [key("a"), key("b")];

    mock.hold();
    let (single, many, ()) = futures::join!(cache.get(&a), cache.get_many(&keys), release_after_yield(&mock));

    assert_eq!(single.expect("get failed"), Some(1));
    assert_eq!(many.expect("get_many failed"), HashMap::from([(key("a"), 1), (key("b"), 2)]));
    assert_eq!(
        mock.operations(),
        vec![CacheOp::Get(key("a")), CacheOp::GetMany(vec![key("b")])]
    );
}

#[tokio::test]
async fn batch_writes_are_visible_to_concurrent_reads() {
    let mock = MockCache::<String, i32>::new();
    let cache = CoalescingCache::new(mock.clone());
    let b = key("b");

    let options = SetOptions::new();

    mock.hold();
    let (written, read, ()) = futures::join!(
        cache.set_many(vec![(key("a"), 1), (key("b"), 2)], &options),
        cache.get(&b),
        release_after_yield(&mock)
    );

    written.expect("set_many failed");
    assert_eq!(read.expect("get failed"), Some(2));

    cache.delete_many(&[key("a"), key("b")]).await.expect("delete_many failed");
    assert_eq!(mock.entry_count(), 0);
}
