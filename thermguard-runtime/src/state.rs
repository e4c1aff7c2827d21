//! Process-wide system state: one writer, many readers
//!
//! The supervisor owns the only [`StateWriter`]; every task gets a
//! [`StateReader`] snapshot handle. The writer enforces the transition rules
//! of [`SystemState`], so no reader can ever observe an illegal sequence.
//!
//! Readers are not synchronized with relay delivery: a record committed just
//! before a transition may be interpreted under the new state.

use thermguard_core::{SystemState, TransitionError};
use tokio::sync::watch;

/// Create a state cell starting in INIT
pub fn state_register() -> (StateWriter, StateReader) {
    let (tx, rx) = watch::channel(SystemState::Init);
    (StateWriter { tx }, StateReader { rx })
}

/// Sole writer of the system state
#[derive(Debug)]
pub struct StateWriter {
    tx: watch::Sender<SystemState>,
}

impl StateWriter {
    /// Current state
    pub fn current(&self) -> SystemState {
        *self.tx.borrow()
    }

    /// Move to `next` if the transition is allowed
    ///
    /// Returns the previous state. Re-entering the current state is a no-op.
    pub fn transition(&self, next: SystemState) -> Result<SystemState, TransitionError> {
        let current = self.current();
        if current == next {
            return Ok(current);
        }
        current.transition(next)?;
        self.tx.send_replace(next);
        Ok(current)
    }

    /// New reader handle
    pub fn subscribe(&self) -> StateReader {
        StateReader { rx: self.tx.subscribe() }
    }
}

/// Read-only snapshot handle of the system state
#[derive(Debug, Clone)]
pub struct StateReader {
    rx: watch::Receiver<SystemState>,
}

impl StateReader {
    /// Snapshot of the current state
    pub fn current(&self) -> SystemState {
        *self.rx.borrow()
    }

    /// Wait until the state changes, then return the new state
    ///
    /// Once the writer is gone the state can no longer change and this waits
    /// forever.
    pub async fn changed(&mut self) -> SystemState {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        *self.rx.borrow_and_update()
    }
}
