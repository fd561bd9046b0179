// Sinks for the log-and-skip conditions of batch planning

use crate::error::PlanningError;
use std::sync::Mutex;
use tracing::warn;

/// Receives the items that a batch operation skipped.
pub trait DiagnosticSink: Send + Sync {
    fn skipped(&self, error: &PlanningError);
}

/// Emits every skipped item as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn skipped(&self, error: &PlanningError) {
        warn!(%error, "skipping item");
    }
}

/// Keeps skipped items in memory so callers can inspect them.
#[derive(Debug, Default)]
pub struct CollectingSink {
    errors: Mutex<Vec<PlanningError>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<PlanningError> {
        self.errors
            .lock()
            .map(|errors| errors.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors().is_empty()
    }
}

impl DiagnosticSink for CollectingSink {
    fn skipped(&self, error: &PlanningError) {
        warn!(%error, "skipping item");
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.clone());
        }
    }
}
