//! External control of in-flight executions.
//!
//! Anything holding a clone of [`ExecutionControl`] (an API handler, an
//! operator CLI, a scheduler) can ask a run to pause or cancel. The
//! coordinator polls before every node; a signal takes effect before the
//! next node is invoked, never in the middle of one.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A request to stop a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Pause,
    Cancel,
}

/// Shared, cheaply clonable signal board keyed by execution id.
#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    signals: Arc<DashMap<Uuid, ControlSignal>>,
}

impl ExecutionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Overrides a pending pause.
    pub fn cancel(&self, execution_id: Uuid) {
        self.signals.insert(execution_id, ControlSignal::Cancel);
    }

    /// Request a pause. Does not downgrade a pending cancel.
    pub fn pause(&self, execution_id: Uuid) {
        self.signals
            .entry(execution_id)
            .or_insert(ControlSignal::Pause);
    }

    /// The signal pending for `execution_id`, if any.
    pub fn signal(&self, execution_id: Uuid) -> Option<ControlSignal> {
        self.signals.get(&execution_id).map(|s| *s)
    }

    /// Drop any pending signal, returning it.
    pub fn clear(&self, execution_id: Uuid) -> Option<ControlSignal> {
        self.signals.remove(&execution_id).map(|(_, s)| s)
    }
}
