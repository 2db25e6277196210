//! ErrorReporter implementations.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, warn};

use crate::error::EngineError;
use crate::traits::ErrorReporter;

// ---------------------------------------------------------------------------
// TracingReporter (production: structured logs)
// ---------------------------------------------------------------------------

/// Logs every report through `tracing`. The default reporter.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: EngineError) {
        match &report {
            EngineError::EffectThrew { effect, error } => {
                error!(effect = %effect, error = %format!("{error:#}"), "Effect threw, restarting");
            }
            EngineError::InvalidDispatch {
                effect,
                reason,
                rendered,
                ..
            } => {
                error!(effect = %effect, reason, value = %rendered, "Effect dispatched an invalid action");
            }
            EngineError::GroupFatal {
                identity,
                effect,
                error,
            } => {
                error!(
                    identity = %identity,
                    effect = %effect,
                    error = %format!("{error:#}"),
                    "Effect failed without auto-recovery, group ended"
                );
            }
            EngineError::NotRunning { .. } | EngineError::Config(_) => {
                warn!(error = %report, "Effects engine error");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryReporter (tests: collects reports for assertions)
// ---------------------------------------------------------------------------

/// Collects reports in memory. Thread-safe.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<EngineError>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered messages of all reports so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.lock().iter().map(ToString::to_string).collect()
    }

    /// Number of reports matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&EngineError) -> bool) -> usize {
        self.lock().iter().filter(|report| predicate(report)).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take all reports collected so far.
    pub fn drain(&self) -> Vec<EngineError> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EngineError>> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, report: EngineError) {
        self.lock().push(report);
    }
}

// ---------------------------------------------------------------------------
// Arc<R> blanket, lets tests share the reporter for assertions
// ---------------------------------------------------------------------------

impl<R: ErrorReporter + ?Sized> ErrorReporter for Arc<R> {
    fn report(&self, report: EngineError) {
        (**self).report(report)
    }
}
