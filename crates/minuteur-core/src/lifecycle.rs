//! Worker lifecycle tracking

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Lifecycle state of the offline worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Created, nothing installed yet
    #[default]
    Parsed,
    Installing,
    /// Installed and waiting to take over
    Installed,
    Activating,
    /// Active and intercepting requests
    Activated,
    /// Failed to install or replaced
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state plus the skip-waiting request flag
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    pub fn transition(&self, to: WorkerState) {
        let mut state = self.state.lock();
        if *state != to {
            debug!("Worker state {} -> {}", *state, to);
            *state = to;
        }
    }

    /// Ask to activate without waiting for open clients to go away
    pub fn request_skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::SeqCst);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    /// An installed worker activates once no client holds the previous
    /// version open, or right away when skip-waiting was requested.
    pub fn can_activate(&self, open_clients: usize) -> bool {
        self.state() == WorkerState::Installed
            && (self.skip_waiting_requested() || open_clients == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waits_for_clients_without_skip_waiting() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.can_activate(0));

        lifecycle.transition(WorkerState::Installed);
        assert!(lifecycle.can_activate(0));
        assert!(!lifecycle.can_activate(2));
    }

    #[test]
    fn test_skip_waiting_bypasses_open_clients() {
        let lifecycle = Lifecycle::new();
        lifecycle.transition(WorkerState::Installed);
        lifecycle.request_skip_waiting();
        assert!(lifecycle.can_activate(3));

        lifecycle.transition(WorkerState::Activated);
        assert!(!lifecycle.can_activate(0));
    }
}
