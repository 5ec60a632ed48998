// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tag-based invalidation checked lazily on read.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    marker::PhantomData,
    time::{Duration, SystemTime},
};

use strata_tier::{CacheTier, Error, SetOptions};
use tick::Clock;

use crate::telemetry::{self, CacheActivity, CacheLayer, CacheOperation};

const DEFAULT_TAG_PREFIX: &str = "tag:";

/// A value written through a [`TaggedCache`], with the moment it was written
/// and the tags it was filed under.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaggedEnvelope<V> {
    value: V,
    created_at: SystemTime,
    tags: Vec<String>,
}

impl<V> TaggedEnvelope<V> {
    /// Wraps `value` written at `created_at` under `tags`.
    #[must_use]
    pub fn new(value: V, created_at: SystemTime, tags: Vec<String>) -> Self {
        Self { value, created_at, tags }
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Unwraps the value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns when the value was written.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Returns the tags the value was filed under.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
}

/// What a [`TaggedCache`] stores in the wrapped cache.
///
/// Entries and tag markers share one key space; markers live under the
/// layer's tag prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TagRecord<V> {
    /// A tagged value.
    Entry(TaggedEnvelope<V>),
    /// The last time a tag was invalidated.
    Marker(SystemTime),
}

/// A cache layer that files entries under tags and invalidates whole tags at once.
///
/// Each tag has a marker entry holding the last time it was invalidated.
/// [`invalidate_tag`](Self::invalidate_tag) only moves that marker forward;
/// no tagged key is touched. On read, an entry whose tag marker is missing, or
/// was moved at or after the entry's creation, is treated as a miss.
///
/// Invalidated entries are left in the wrapped cache until their TTL removes
/// them or a write replaces them. Deleting them on read would race with a
/// concurrent `set` of the same key and could erase the fresh value.
///
/// Marker TTL is an operator concern: it must be at least as long as the longest
/// TTL of any entry carrying the tag. A marker that expires first makes its
/// entries look invalidated, but an invalidation written with a short TTL can be
/// forgotten while entries it should have hidden are still stored.
///
/// Underlying cost per call: `get` and `get_or_load` issue one read for the entry
/// and one batch read for its tags; `get_many`, `set` and `set_many` use a fixed
/// number of batch calls regardless of how many keys or tags are involved.
///
/// # Examples
///
/// ```
/// use strata::{CacheTier, SetOptions, TaggedCache};
/// use strata_tier::testing::MockCache;
/// use tick::{Clock, ClockControl};
/// use std::time::Duration;
///
/// # futures::executor::block_on(async {
/// let control = ClockControl::new();
/// let cache = TaggedCache::new(MockCache::new(), control.to_clock());
///
/// cache
///     .set(&"user:1".to_string(), "Ada".to_string(), &SetOptions::new().with_tags(["users"]))
///     .await?;
/// control.advance(Duration::from_millis(1));
/// cache.invalidate_tag("users").await?;
///
/// assert_eq!(cache.get(&"user:1".to_string()).await?, None);
/// # Ok::<(), strata::Error>(())
/// # });
/// ```
pub struct TaggedCache<V, C> {
    cache: C,
    clock: Clock,
    tag_prefix: String,
    tag_ttl: Option<Duration>,
    _phantom: PhantomData<fn() -> V>,
}

impl<V, C> TaggedCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: CacheTier<String, TagRecord<V>>,
{
    /// Wraps `cache`, reading time from `clock`. Markers use the prefix `"tag:"`
    /// and never expire.
    #[must_use]
    pub fn new(cache: C, clock: Clock) -> Self {
        Self {
            cache,
            clock,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            tag_ttl: None,
            _phantom: PhantomData,
        }
    }

    /// Sets the key prefix under which tag markers are stored.
    #[must_use]
    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Sets how long tag markers live.
    #[must_use]
    pub fn with_tag_ttl(mut self, ttl: Duration) -> Self {
        self.tag_ttl = Some(ttl);
        self
    }

    /// Returns the wrapped cache.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.cache
    }

    /// Invalidates every entry filed under `tag`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped cache's error if the marker cannot be written.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<(), Error> {
        self.invalidate_tags(&[tag]).await
    }

    /// Invalidates every entry filed under any of `tags`, in one batch write.
    ///
    /// # Errors
    ///
    /// Returns the wrapped cache's error if the markers cannot be written.
    pub async fn invalidate_tags<T>(&self, tags: &[T]) -> Result<(), Error>
    where
        T: AsRef<str>,
    {
        if tags.is_empty() {
            return Ok(());
        }
        let now = self.clock.system_time();
        let markers = tags
            .iter()
            .map(|tag| (self.marker_key(tag.as_ref()), TagRecord::Marker(now)))
            .collect();
        match self.cache.set_many(markers, &self.marker_options()).await {
            Ok(()) => {
                telemetry::record(CacheLayer::Tagged, CacheOperation::InvalidateTags, CacheActivity::Invalidated);
                Ok(())
            }
            Err(error) => {
                telemetry::record_error(CacheLayer::Tagged, CacheOperation::InvalidateTags, &error);
                Err(error)
            }
        }
    }

    fn marker_key(&self, tag: &str) -> String {
        format!("{}{tag}", self.tag_prefix)
    }

    fn marker_options(&self) -> SetOptions {
        match self.tag_ttl {
            Some(ttl) => SetOptions::new().with_ttl(ttl),
            None => SetOptions::new(),
        }
    }

    /// Creates markers for any of `tags` that have none.
    ///
    /// A new marker is stamped just before `now`, so entries written at `now`
    /// are valid while an invalidation at `now` still hides them.
    async fn ensure_markers(&self, tags: &[String], now: SystemTime) -> Result<(), Error> {
        if tags.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = tags
            .iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|tag| self.marker_key(tag))
            .collect();
        let existing = self.cache.get_many(&keys).await?;
        let stamp = now.checked_sub(Duration::from_nanos(1)).unwrap_or(now);
        let missing: Vec<_> = keys
            .into_iter()
            .filter(|key| !matches!(existing.get(key), Some(TagRecord::Marker(_))))
            .map(|key| (key, TagRecord::Marker(stamp)))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        self.cache.set_many(missing, &self.marker_options()).await
    }

    /// Reads the markers for every tag of every envelope in one batch.
    async fn markers<'a>(
        &self,
        envelopes: impl IntoIterator<Item = &'a TaggedEnvelope<V>>,
    ) -> Result<HashMap<String, SystemTime>, Error>
    where
        V: 'a,
    {
        let keys: Vec<String> = envelopes
            .into_iter()
            .flat_map(TaggedEnvelope::tags)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|tag| self.marker_key(tag))
            .collect();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .cache
            .get_many(&keys)
            .await?
            .into_iter()
            .filter_map(|(key, record)| match record {
                TagRecord::Marker(at) => Some((key, at)),
                TagRecord::Entry(_) => None,
            })
            .collect())
    }

    fn is_valid(&self, envelope: &TaggedEnvelope<V>, markers: &HashMap<String, SystemTime>) -> bool {
        envelope.tags.iter().all(|tag| {
            markers
                .get(&self.marker_key(tag))
                .is_some_and(|invalidated_at| *invalidated_at < envelope.created_at)
        })
    }

    fn wrap(&self, value: V, options: &SetOptions, now: SystemTime) -> TagRecord<V> {
        TagRecord::Entry(TaggedEnvelope::new(value, now, options.tags().to_vec()))
    }

    async fn get_valid(&self, key: &String, operation: CacheOperation) -> Result<Option<V>, Error> {
        let Some(TagRecord::Entry(envelope)) = self.cache.get(key).await? else {
            telemetry::record(CacheLayer::Tagged, operation, CacheActivity::Miss);
            return Ok(None);
        };
        if !envelope.tags.is_empty() {
            let markers = self.markers([&envelope]).await?;
            if !self.is_valid(&envelope, &markers) {
                telemetry::record(CacheLayer::Tagged, operation, CacheActivity::Invalidated);
                return Ok(None);
            }
        }
        telemetry::record(CacheLayer::Tagged, operation, CacheActivity::Hit);
        Ok(Some(envelope.into_value()))
    }
}

impl<V, C> Debug for TaggedCache<V, C>
where
    C: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedCache")
            .field("cache", &self.cache)
            .field("tag_prefix", &self.tag_prefix)
            .field("tag_ttl", &self.tag_ttl)
            .finish_non_exhaustive()
    }
}

impl<V, C> CacheTier<String, V> for TaggedCache<V, C>
where
    V: Clone + Send + Sync + 'static,
    C: CacheTier<String, TagRecord<V>>,
{
    async fn get(&self, key: &String) -> Result<Option<V>, Error> {
        self.get_valid(key, CacheOperation::Get).await
    }

    async fn get_or_load<L, Fut>(&self, key: &String, loader: L, options: &SetOptions) -> Result<V, Error>
    where
        L: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        if let Some(value) = self.get_valid(key, CacheOperation::GetOrLoad).await? {
            return Ok(value);
        }
        let value = loader().await?;
        self.set(key, value.clone(), options).await?;
        telemetry::record(CacheLayer::Tagged, CacheOperation::GetOrLoad, CacheActivity::Loaded);
        Ok(value)
    }

    async fn set(&self, key: &String, value: V, options: &SetOptions) -> Result<(), Error> {
        let now = self.clock.system_time();
        self.ensure_markers(options.tags(), now).await?;
        self.cache.set(key, self.wrap(value, options, now), &options.without_tags()).await
    }

    async fn delete(&self, key: &String) -> Result<(), Error> {
        self.cache.delete(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, V>, Error> {
        let envelopes: HashMap<String, TaggedEnvelope<V>> = self
            .cache
            .get_many(keys)
            .await?
            .into_iter()
            .filter_map(|(key, record)| match record {
                TagRecord::Entry(envelope) => Some((key, envelope)),
                TagRecord::Marker(_) => None,
            })
            .collect();
        let markers = self.markers(envelopes.values()).await?;

        let total = envelopes.len();
        let found: HashMap<String, V> = envelopes
            .into_iter()
            .filter(|(_, envelope)| self.is_valid(envelope, &markers))
            .map(|(key, envelope)| (key, envelope.into_value()))
            .collect();

        if found.len() < total {
            telemetry::record(CacheLayer::Tagged, CacheOperation::GetMany, CacheActivity::Invalidated);
        }
        Ok(found)
    }

    async fn set_many(&self, entries: Vec<(String, V)>, options: &SetOptions) -> Result<(), Error> {
        let now = self.clock.system_time();
        self.ensure_markers(options.tags(), now).await?;
        let entries = entries
            .into_iter()
            .map(|(key, value)| (key, self.wrap(value, options, now)))
            .collect();
        self.cache.set_many(entries, &options.without_tags()).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), Error> {
        self.cache.delete_many(keys).await
    }
}
