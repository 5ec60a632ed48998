// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for cache operations.

use std::fmt;

/// Classifies where a cache error came from.
///
/// Layers that tolerate store failures must still let loader failures through, so
/// the two are never folded into one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A backing store failed (connection, timeout, serialization).
    Store,
    /// A caller-supplied loader failed.
    Loader,
    /// A layer was constructed with an invalid configuration.
    Configuration,
    /// The in-flight operation a caller was waiting on was dropped before it settled.
    Abandoned,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Store => "store",
            Self::Loader => "loader",
            Self::Configuration => "configuration",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// An error from a cache operation.
///
/// This is an opaque error type that can wrap any underlying error from a store or a
/// loader. Use [`std::error::Error::source()`] to access the underlying cause and
/// [`kind()`](Self::kind) to tell store failures from loader failures.
///
/// `Error` is cheap to clone so that one failure can be handed to every caller that
/// was waiting on the same in-flight operation.
///
/// # Example
///
/// ```
/// use strata_tier::{Error, ErrorKind};
///
/// let error = Error::loader("origin unavailable");
/// assert_eq!(error.kind(), ErrorKind::Loader);
/// ```
#[ohno::error]
#[derive(Clone)]
#[display("cache {kind} error")]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    /// Creates a store error from any type that can be converted to an error.
    ///
    /// This is the public API for creating cache errors from external store crates.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata_tier::Error;
    ///
    /// let error = Error::from_message("operation failed");
    /// ```
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::store(cause)
    }

    /// Creates an error reporting a failed backing store.
    pub fn store(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Store, cause)
    }

    /// Creates an error reporting a failed loader.
    ///
    /// Loaders passed to [`get_or_load`](crate::CacheTier::get_or_load) use this to
    /// report their own failures.
    pub fn loader(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Loader, cause)
    }

    /// Creates an error reporting an invalid layer configuration.
    pub fn configuration(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Configuration, cause)
    }

    /// Creates an error reporting that a shared in-flight operation was dropped.
    pub fn abandoned(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(ErrorKind::Abandoned, cause)
    }

    /// Returns what kind of failure this is.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns `true` if the failure came from a caller-supplied loader.
    #[must_use]
    pub fn is_loader(&self) -> bool {
        self.kind == ErrorKind::Loader
    }
}

/// A specialized [`Result`] type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
