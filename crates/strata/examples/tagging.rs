// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tag-based invalidation: file entries under tags, then drop a whole group with
//! one write.

use std::time::Duration;

use strata::{CacheTier, InMemoryCacheBuilder, SetOptions, TagRecord, TaggedCache};
use tick::Clock;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), strata::Error> {
    let clock = Clock::new_tokio();
    let cache = TaggedCache::new(
        InMemoryCacheBuilder::<String, TagRecord<String>>::new().build(),
        clock.clone(),
    )
    .with_tag_ttl(Duration::from_secs(24 * 3600));

    let tenant = SetOptions::new().with_tags(["tenant:7"]);
    cache.set(&"user:1".to_string(), "Ada".to_string(), &tenant).await?;
    cache.set(&"user:2".to_string(), "Grace".to_string(), &tenant).await?;
    cache
        .set(&"user:3".to_string(), "Linus".to_string(), &SetOptions::new().with_tags(["tenant:8"]))
        .await?;

    clock.delay(Duration::from_millis(1)).await;
    cache.invalidate_tag("tenant:7").await?;

    let found = cache
        .get_many(&["user:1".to_string(), "user:2".to_string(), "user:3".to_string()])
        .await?;
    println!("after invalidating tenant:7: {found:?}");

    Ok(())
}
