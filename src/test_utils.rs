//! Test utilities for layerscope.
//!
//! This module provides shared helpers for unit and integration tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - A blocking async test runner
//! - Recording finalizers for release-order assertions
//!
//! # Example
//! ```
//! use layerscope::test_utils::{init_test_logging, run_test};
//!
//! init_test_logging();
//! run_test(|| async {
//!     // async test code
//! });
//! ```

use crate::scope::Finalizer;
use crate::types::Exit;
use parking_lot::Mutex as PlMutex;
use std::future::Future;
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Run async test code to completion on the current thread.
pub fn run_test<F, Fut>(f: F) -> Fut::Output
where
    F: FnOnce() -> Fut,
    Fut: Future,
{
    init_test_logging();
    futures_lite::future::block_on(f())
}

/// Shared log of labels, appended to by [`recording_finalizer`].
pub type EventLog = Arc<PlMutex<Vec<String>>>;

/// Creates an empty event log.
#[must_use]
pub fn event_log() -> EventLog {
    Arc::new(PlMutex::new(Vec::new()))
}

/// A finalizer that appends `label` to `log` every time it runs.
#[must_use]
pub fn recording_finalizer<E>(log: &EventLog, label: impl Into<String>) -> Finalizer<E>
where
    E: Send + Sync + 'static,
{
    let log = Arc::clone(log);
    let label: String = label.into();
    Finalizer::from_fn(move |_exit: Exit<(), E>| {
        log.lock().push(label.clone());
        Ok(())
    })
}

/// A finalizer that appends `label` to `log` and then fails with `error`.
#[must_use]
pub fn failing_finalizer<E>(log: &EventLog, label: impl Into<String>, error: E) -> Finalizer<E>
where
    E: Clone + Send + Sync + 'static,
{
    let log = Arc::clone(log);
    let label: String = label.into();
    Finalizer::from_fn(move |_exit: Exit<(), E>| {
        log.lock().push(label.clone());
        Err(crate::Cause::fail(error.clone()))
    })
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
