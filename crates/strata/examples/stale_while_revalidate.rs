// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Stale-while-revalidate: once a value goes stale it is still served at once,
//! while a single background refresh replaces it.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use strata::{CacheTier, InMemoryCacheBuilder, SetOptions, SwrCache, SwrEnvelope};
use tick::Clock;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), strata::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let clock = Clock::new_tokio();
    let cache = SwrCache::builder(
        InMemoryCacheBuilder::<String, SwrEnvelope<u32>>::new().build(),
        clock.clone(),
    )
    .default_ttl(Duration::from_millis(100))
    .stale_ttl(Duration::from_secs(10))
    .build();

    let version = Arc::new(AtomicU32::new(0));
    let key = "config".to_string();
    let options = SetOptions::new();
    let read = || {
        let version = Arc::clone(&version);
        cache.get_or_load(
            &key,
            move || async move { Ok(version.fetch_add(1, Ordering::Relaxed) + 1) },
            &options,
        )
    };

    println!("first read (miss, loads v1): {}", read().await?);
    println!("fresh read: {}", read().await?);

    clock.delay(Duration::from_millis(150)).await;
    println!("stale read, refresh starts: {}", read().await?);

    // Give the background refresh a moment to land.
    clock.delay(Duration::from_millis(10)).await;
    println!("after refresh: {}", read().await?);

    Ok(())
}
