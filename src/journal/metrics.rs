//! Observation hooks around structural journal operations.
//!
//! The journal writer wraps segment creation, truncation and flush in the
//! hooks of an injected [`JournalMetrics`]. A hook runs the operation it is
//! given exactly once and returns its result unchanged; it may time or
//! count it, but it never alters control flow.
//!
//! Implementations:
//!
//! - [`NoopJournalMetrics`]: runs the operation, nothing else (default)
//! - [`CountingJournalMetrics`]: atomic invocation counters
//! - `MetricsJournalMetrics`: counters and duration histograms through the
//!   `metrics` facade (requires the `metrics` feature)

use super::error::JournalError;
use std::sync::atomic::{AtomicU64, Ordering};

/// An operation handed to an observation hook.
pub type ObservedOperation<'a> = &'a mut dyn FnMut() -> Result<(), JournalError>;

/// Hooks wrapping the journal's structural operations.
///
/// Every method defaults to running the operation directly, so an
/// implementation only overrides the hooks it cares about.
pub trait JournalMetrics: Send + Sync + std::fmt::Debug {
    /// Wrap the creation of a new segment during rollover.
    ///
    /// # Errors
    ///
    /// Must return exactly what `operation` returned.
    fn observe_segment_creation(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        operation()
    }

    /// Wrap a truncation of the journal's tail.
    ///
    /// # Errors
    ///
    /// Must return exactly what `operation` returned.
    fn observe_segment_truncation(
        &self,
        operation: ObservedOperation<'_>,
    ) -> Result<(), JournalError> {
        operation()
    }

    /// Wrap a flush of the active segment.
    ///
    /// # Errors
    ///
    /// Must return exactly what `operation` returned.
    fn observe_segment_flush(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        operation()
    }
}

/// Hooks that only run the wrapped operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopJournalMetrics;

impl JournalMetrics for NoopJournalMetrics {}

/// Hooks that count how often each operation ran.
///
/// Failed operations are counted too.
#[derive(Debug, Default)]
pub struct CountingJournalMetrics {
    segment_creations: AtomicU64,
    segment_truncations: AtomicU64,
    segment_flushes: AtomicU64,
}

impl CountingJournalMetrics {
    /// Create a set of zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segment creations observed.
    #[must_use]
    pub fn segment_creations(&self) -> u64 {
        self.segment_creations.load(Ordering::Relaxed)
    }

    /// Number of truncations observed.
    #[must_use]
    pub fn segment_truncations(&self) -> u64 {
        self.segment_truncations.load(Ordering::Relaxed)
    }

    /// Number of flushes observed.
    #[must_use]
    pub fn segment_flushes(&self) -> u64 {
        self.segment_flushes.load(Ordering::Relaxed)
    }
}

impl JournalMetrics for CountingJournalMetrics {
    fn observe_segment_creation(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        self.segment_creations.fetch_add(1, Ordering::Relaxed);
        operation()
    }

    fn observe_segment_truncation(
        &self,
        operation: ObservedOperation<'_>,
    ) -> Result<(), JournalError> {
        self.segment_truncations.fetch_add(1, Ordering::Relaxed);
        operation()
    }

    fn observe_segment_flush(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        self.segment_flushes.fetch_add(1, Ordering::Relaxed);
        operation()
    }
}

/// Hooks reporting to the global `metrics` recorder.
///
/// Emits, labelled with `journal`:
///
/// - `segmented_journal_segment_creation_total` / `_seconds`
/// - `segmented_journal_segment_truncation_total` / `_seconds`
/// - `segmented_journal_segment_flush_total` / `_seconds`
/// - `segmented_journal_operation_errors_total` (labelled with `operation`)
///
/// With no recorder installed every call is a cheap no-op.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsJournalMetrics {
    journal: String,
}

#[cfg(feature = "metrics")]
impl MetricsJournalMetrics {
    /// Create hooks labelled with the given journal name.
    #[must_use]
    pub fn new(journal: impl Into<String>) -> Self {
        Self {
            journal: journal.into(),
        }
    }

    fn observe(
        &self,
        operation_name: &'static str,
        total: &'static str,
        seconds: &'static str,
        operation: ObservedOperation<'_>,
    ) -> Result<(), JournalError> {
        let started = std::time::Instant::now();
        let result = operation();
        let elapsed = started.elapsed().as_secs_f64();

        metrics::counter!(total, "journal" => self.journal.clone()).increment(1);
        metrics::histogram!(seconds, "journal" => self.journal.clone()).record(elapsed);
        if result.is_err() {
            metrics::counter!(
                "segmented_journal_operation_errors_total",
                "journal" => self.journal.clone(),
                "operation" => operation_name
            )
            .increment(1);
        }
        result
    }
}

#[cfg(feature = "metrics")]
impl JournalMetrics for MetricsJournalMetrics {
    fn observe_segment_creation(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        self.observe(
            "segment_creation",
            "segmented_journal_segment_creation_total",
            "segmented_journal_segment_creation_seconds",
            operation,
        )
    }

    fn observe_segment_truncation(
        &self,
        operation: ObservedOperation<'_>,
    ) -> Result<(), JournalError> {
        self.observe(
            "segment_truncation",
            "segmented_journal_segment_truncation_total",
            "segmented_journal_segment_truncation_seconds",
            operation,
        )
    }

    fn observe_segment_flush(&self, operation: ObservedOperation<'_>) -> Result<(), JournalError> {
        self.observe(
            "segment_flush",
            "segmented_journal_segment_flush_total",
            "segmented_journal_segment_flush_seconds",
            operation,
        )
    }
}
