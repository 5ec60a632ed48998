// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured log events emitted by the cache layers.
//!
//! With the `logs` feature enabled, layers emit one `cache.event` record per
//! notable step through `tracing`. Without it, recording compiles to nothing.

use strata_tier::Error;

#[cfg(test)]
pub(crate) const CACHE_EVENT_NAME: &str = "cache.event";
#[cfg(test)]
pub(crate) const CACHE_LAYER_NAME: &str = "cache.layer";
#[cfg(test)]
pub(crate) const CACHE_OPERATION_NAME: &str = "cache.operation";
#[cfg(test)]
pub(crate) const CACHE_ACTIVITY_NAME: &str = "cache.activity";

#[derive(Debug, Clone, Copy)]
pub(crate) enum CacheLayer {
    Coalescing,
    Swr,
    Tiered,
    Tagged,
}

impl CacheLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coalescing => "coalescing",
            Self::Swr => "swr",
            Self::Tiered => "tiered",
            Self::Tagged => "tagged",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum CacheOperation {
    Get,
    GetOrLoad,
    GetMany,
    Revalidate,
    InvalidateTags,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::GetOrLoad => "cache.get_or_load",
            Self::GetMany => "cache.get_many",
            Self::Revalidate => "cache.revalidate",
            Self::InvalidateTags => "cache.invalidate_tags",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Coalesced,
    Stale,
    Loaded,
    Backfilled,
    Invalidated,
    Revalidated,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Coalesced => "cache.coalesced",
            Self::Stale => "cache.stale",
            Self::Loaded => "cache.loaded",
            Self::Backfilled => "cache.backfilled",
            Self::Invalidated => "cache.invalidated",
            Self::Revalidated => "cache.revalidated",
            Self::Error => "cache.error",
        }
    }

    #[cfg(any(feature = "logs", test))]
    pub fn level(self) -> tracing::Level {
        match self {
            Self::Hit | Self::Miss | Self::Coalesced => tracing::Level::DEBUG,
            Self::Stale | Self::Loaded | Self::Backfilled | Self::Invalidated | Self::Revalidated => {
                tracing::Level::INFO
            }
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Records a layer event.
#[cfg_attr(
    not(any(feature = "logs", test)),
    expect(unused_variables, reason = "events are only emitted with the logs feature")
)]
#[inline]
pub(crate) fn record(layer: CacheLayer, operation: CacheOperation, activity: CacheActivity) {
    #[cfg(any(feature = "logs", test))]
    emit(layer, operation, activity, None);
}

/// Records a failure together with its cause.
#[cfg_attr(
    not(any(feature = "logs", test)),
    expect(unused_variables, reason = "events are only emitted with the logs feature")
)]
#[inline]
pub(crate) fn record_error(layer: CacheLayer, operation: CacheOperation, error: &Error) {
    #[cfg(any(feature = "logs", test))]
    emit(layer, operation, CacheActivity::Error, Some(error));
}

#[cfg(any(feature = "logs", test))]
fn emit(layer: CacheLayer, operation: CacheOperation, activity: CacheActivity, error: Option<&Error>) {
    let layer = layer.as_str();
    let op = operation.as_str();
    let ev = activity.as_str();
    let error = error.map(tracing::field::display);

    // Tracing level must be constant, so we use a macro to select the appropriate level.
    // Field names must match the constants at the top of this module.
    macro_rules! emit_event {
        ($level:ident) => {
            tracing::$level!(
                cache.layer = layer,
                cache.operation = op,
                cache.activity = ev,
                error = error,
                "cache.event"
            )
        };
    }

    match activity.level() {
        tracing::Level::ERROR => emit_event!(error),
        tracing::Level::INFO => emit_event!(info),
        _ => emit_event!(debug),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    /// Captures formatted log output into a buffer that tests can inspect.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct LogCapture {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl LogCapture {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        #[must_use]
        pub fn output(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().unwrap()).to_string()
        }

        pub fn assert_contains(&self, expected: &str) {
            let output = self.output();
            assert!(
                output.contains(expected),
                "log output does not contain '{expected}', got:\n{output}"
            );
        }

        /// Creates a subscriber writing to this buffer. Use with `set_default()`.
        #[must_use]
        pub fn subscriber(&self) -> impl tracing::Subscriber {
            use tracing_subscriber::layer::SubscriberExt;
            tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            LogCaptureWriter {
                buffer: Arc::clone(&self.buffer),
            }
        }
    }

    pub(crate) struct LogCaptureWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl Write for LogCaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
