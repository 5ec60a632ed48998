// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Composable cache layers that stack over any store.
//!
//! Every layer here wraps a [`CacheTier`] and is itself a `CacheTier`, so layers
//! stack in whatever order suits the application:
//!
//! - [`CoalescingCache`] collapses concurrent calls on one key into one underlying call.
//! - [`SwrCache`] serves stale values while refreshing them in the background.
//! - [`TieredCache`] consults several caches hottest first and backfills on the way back.
//! - [`TaggedCache`] invalidates whole groups of keys by tag.
//!
//! Layers that change what is stored ([`SwrCache`] and [`TaggedCache`]) write an
//! envelope type to the wrapped cache. A store below them has to round-trip that
//! envelope; enable the `serde` feature for stores that serialize. Changing which
//! of these layers sit over a persistent store changes the stored format, so
//! version the key space when doing so.
//!
//! # Examples
//!
//! ## Stampede Protection over an In-Memory Store
//!
//! ```
//! use strata::{CacheTier, CoalescingCache, InMemoryCacheBuilder, SetOptions};
//! # futures::executor::block_on(async {
//!
//! let cache = CoalescingCache::new(InMemoryCacheBuilder::<String, u64>::new().build());
//!
//! let value = cache
//!     .get_or_load(&"visits".to_string(), || async { Ok(7) }, &SetOptions::new())
//!     .await?;
//! assert_eq!(value, 7);
//! assert_eq!(cache.get(&"visits".to_string()).await?, Some(7));
//! # Ok::<(), strata::Error>(())
//! # });
//! ```
//!
//! ## Two Tiers with Tags on Top
//!
//! ```
//! use strata::{CacheTier, InMemoryCacheBuilder, SetOptions, TagRecord, TaggedCache, Tier, TieredCache};
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let local = InMemoryCacheBuilder::<String, TagRecord<String>>::new().build();
//! let remote = InMemoryCacheBuilder::<String, TagRecord<String>>::new().build();
//! let tiers = TieredCache::new(vec![Tier::new(local), Tier::new(remote)])?;
//!
//! let cache = TaggedCache::new(tiers, Clock::new_frozen());
//! cache
//!     .set(&"user:1".to_string(), "Ada".to_string(), &SetOptions::new().with_tags(["users"]))
//!     .await?;
//! assert_eq!(cache.get(&"user:1".to_string()).await?, Some("Ada".to_string()));
//! # Ok::<(), strata::Error>(())
//! # });
//! ```
//!
//! # Features
//!
//! - `memory` (default): re-exports the `strata_memory` in-process store.
//! - `logs` (default): emits `tracing` events for hits, misses, backfills and failures.
//! - `serde`: serialization for the stored envelope types.
//! - `test-util`: re-exports [`MockCache`] and enables `tick` test clocks.

mod coalesce;
mod flight;
mod revalidation;
mod swr;
mod tagging;
mod telemetry;
mod tiered;

#[doc(inline)]
pub use coalesce::CoalescingCache;
#[cfg(feature = "memory")]
#[doc(inline)]
pub use strata_memory::{InMemoryCache, InMemoryCacheBuilder, InMemoryStore};
#[doc(inline)]
pub use strata_tier::{
    CacheTier, DisposeCause, DisposeHook, DynamicCache, DynamicCacheExt, Error, ErrorKind, LocalCache, LocalCacheTier, Result,
    SetOptions,
};
#[cfg(any(feature = "test-util", test))]
#[doc(inline)]
pub use strata_tier::testing::{CacheOp, MockCache};
#[doc(inline)]
pub use swr::{SwrCache, SwrCacheBuilder, SwrEnvelope};
#[doc(inline)]
pub use tagging::{TagRecord, TaggedCache, TaggedEnvelope};
#[doc(inline)]
pub use tiered::{Tier, TieredCache};
