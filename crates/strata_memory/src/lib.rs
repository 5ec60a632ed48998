// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! High-performance in-process cache store backed by moka.
//!
//! This crate provides [`InMemoryStore`], a concurrent store using moka's
//! `TinyLFU` eviction algorithm, adapted to the async strata contract as
//! [`InMemoryCache`]. Use [`InMemoryCacheBuilder`] to configure capacity, the
//! default time-to-live and a dispose hook without exposing moka types directly.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use strata_memory::InMemoryCacheBuilder;
//! use strata_tier::{CacheTier, SetOptions};
//!
//! # futures::executor::block_on(async {
//! let cache = InMemoryCacheBuilder::<String, i32>::new()
//!     .max_capacity(1000)
//!     .time_to_live(Duration::from_secs(300))
//!     .build();
//!
//! cache.set(&"key".to_string(), 42, &SetOptions::new()).await.unwrap();
//! assert_eq!(cache.get(&"key".to_string()).await.unwrap(), Some(42));
//! # });
//! ```
//!
//! # Expiration
//!
//! Every entry carries its own time-to-live: the `ttl` of the [`SetOptions`](strata_tier::SetOptions)
//! it was written with, or the store-wide [`time_to_live`](InMemoryCacheBuilder::time_to_live)
//! when the write did not specify one. Entries without either never expire.
//! Overwriting an entry restarts its clock.

pub mod builder;
pub mod store;

#[doc(inline)]
pub use builder::InMemoryCacheBuilder;
#[doc(inline)]
pub use store::{InMemoryCache, InMemoryStore};
