// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Per-write settings passed to [`set`](crate::CacheTier::set) and friends.
///
/// Stores read `ttl`; layers may read additional settings. The tagging layer in
/// `strata`, for example, reads `tags`. Layers that do not understand a setting
/// pass it through untouched.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_tier::SetOptions;
///
/// let options = SetOptions::new()
///     .with_ttl(Duration::from_secs(30))
///     .with_tags(["users", "tenant:7"]);
///
/// assert_eq!(options.ttl(), Some(Duration::from_secs(30)));
/// assert_eq!(options.tags(), ["users", "tenant:7"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    ttl: Option<Duration>,
    tags: Vec<String>,
}

impl SetOptions {
    /// Creates empty options: no TTL and no tags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long the written value should live.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sets the tags the written value is filed under.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the requested time-to-live, if any.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the tags attached to the write.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns a copy of these options without any tags.
    #[must_use]
    pub fn without_tags(&self) -> Self {
        Self { ttl: self.ttl, tags: Vec::new() }
    }

    /// Returns `true` if the caller did not set anything.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.ttl.is_none() && self.tags.is_empty()
    }
}
