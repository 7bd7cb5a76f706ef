//! Save-state reporting for toolbar feedback.

use shared_types::SaveState;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Receives one call per `saving` / `saved` / `error` transition.
pub trait StatusReporter: Send + Sync {
    fn set_save_state(&self, state: SaveState);
}

/// Writes transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn set_save_state(&self, state: SaveState) {
        match state {
            SaveState::Error => tracing::warn!(state = state.as_str(), "Autosave failed"),
            _ => tracing::debug!(state = state.as_str(), "Autosave state changed"),
        }
    }
}

/// Publishes the latest state on a watch channel and keeps the full history.
#[derive(Debug)]
pub struct WatchStatusReporter {
    tx: watch::Sender<SaveState>,
    history: Mutex<Vec<SaveState>>,
}

impl WatchStatusReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SaveState::Idle);
        Self {
            tx,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SaveState {
        *self.tx.borrow()
    }

    pub fn history(&self) -> Vec<SaveState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for WatchStatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for WatchStatusReporter {
    fn set_save_state(&self, state: SaveState) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(state);
        // send_replace never fails, even with no receivers.
        self.tx.send_replace(state);
    }
}
