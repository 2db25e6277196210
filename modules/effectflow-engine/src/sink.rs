//! DispatchSink implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use effectflow_events::{Action, ActionBus};
use tokio::sync::Notify;

use crate::traits::DispatchSink;

// ---------------------------------------------------------------------------
// ActionBus adapter (production: dispatched actions feed the action source)
// ---------------------------------------------------------------------------

impl DispatchSink for ActionBus {
    fn dispatch(&self, action: Action) {
        self.publish(action);
    }
}

// ---------------------------------------------------------------------------
// MemorySink (tests: records every dispatched action)
// ---------------------------------------------------------------------------

/// Records dispatched actions in order. Thread-safe.
#[derive(Debug, Default)]
pub struct MemorySink {
    actions: Mutex<Vec<Action>>,
    dispatched: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All dispatched actions so far (for test assertions).
    pub fn actions(&self) -> Vec<Action> {
        self.lock().clone()
    }

    pub fn action_types(&self) -> Vec<String> {
        self.lock()
            .iter()
            .map(|action| action.action_type().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Wait until at least `count` actions have been dispatched.
    pub async fn wait_for(&self, count: usize) {
        loop {
            if self.len() >= count {
                return;
            }
            self.dispatched.notified().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Action>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DispatchSink for MemorySink {
    fn dispatch(&self, action: Action) {
        self.lock().push(action);
        self.dispatched.notify_one();
    }
}

// ---------------------------------------------------------------------------
// Arc<S> blanket, lets tests share the sink for assertions
// ---------------------------------------------------------------------------

impl<S: DispatchSink + ?Sized> DispatchSink for Arc<S> {
    fn dispatch(&self, action: Action) {
        (**self).dispatch(action)
    }
}
