// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A small, short-lived local tier in front of a larger shared one. Hits in the
//! shared tier are copied into the local tier on the way back.

use std::time::Duration;

use strata::{CacheTier, InMemoryCacheBuilder, SetOptions, Tier, TieredCache};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), strata::Error> {
    let local = InMemoryCacheBuilder::<String, String>::new()
        .name("local")
        .max_capacity(1_000)
        .build();
    let shared = InMemoryCacheBuilder::<String, String>::new()
        .name("shared")
        .time_to_live(Duration::from_secs(3600))
        .build();

    // Seed the shared tier as if another process had written it.
    shared
        .set(&"user:1".to_string(), "Ada".to_string(), &SetOptions::new())
        .await?;

    let cache = TieredCache::new(vec![
        Tier::new(local.clone()).with_options(SetOptions::new().with_ttl(Duration::from_secs(30))),
        Tier::new(shared),
    ])?;

    println!("local before read: {:?}", local.get(&"user:1".to_string()).await?);
    println!("tiered read: {:?}", cache.get(&"user:1".to_string()).await?);
    println!("local after read: {:?}", local.get(&"user:1".to_string()).await?);

    let value = cache
        .get_or_load(&"user:2".to_string(), || async { Ok("Grace".to_string()) }, &SetOptions::new())
        .await?;
    println!("loaded through every tier: {value}");

    Ok(())
}
