// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The cache contract shared by every strata store and layer.
//!
//! This crate defines the [`CacheTier`] trait that all stores and layers implement,
//! along with [`SetOptions`] for per-write settings and the [`Error`] type for
//! fallible operations.
//!
//! # Overview
//!
//! A store only supplies the three primitives `get`, `set` and `delete`. Everything
//! else in the contract (`get_or_load` and the batch operations) has a default
//! implementation built from those primitives, so a new backend is small. Layers in
//! the `strata` crate wrap any `CacheTier` and are themselves a `CacheTier`, so they
//! stack in whatever order the integrator chooses.
//!
//! # Implementing a Store
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use strata_tier::{CacheTier, Error, SetOptions};
//!
//! struct SimpleStore<K, V>(RwLock<HashMap<K, V>>);
//!
//! impl<K, V> CacheTier<K, V> for SimpleStore<K, V>
//! where
//!     K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
//!     V: Clone + Send + Sync + 'static,
//! {
//!     async fn get(&self, key: &K) -> Result<Option<V>, Error> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn set(&self, key: &K, value: V, _options: &SetOptions) -> Result<(), Error> {
//!         self.0.write().unwrap().insert(key.clone(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, key: &K) -> Result<(), Error> {
//!         self.0.write().unwrap().remove(key);
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # In-Process Stores
//!
//! Stores that live in the same process can implement the synchronous
//! [`LocalCacheTier`] instead and be adapted with [`LocalCache`], which also
//! reports every overwritten or removed value through a dispose hook.
//!
//! # Dynamic Dispatch
//!
//! [`DynamicCache`] erases the concrete type of any `CacheTier`, which is what
//! multi-tier stacks with heterogeneous stores need.

mod dynamic;
pub mod error;
mod local;
mod options;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
pub(crate) mod tier;

#[doc(inline)]
pub use dynamic::{DynamicCache, DynamicCacheExt};
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};
#[doc(inline)]
pub use local::{DisposeCause, DisposeHook, LocalCache, LocalCacheTier};
#[doc(inline)]
pub use options::SetOptions;
#[doc(inline)]
pub use tier::CacheTier;
