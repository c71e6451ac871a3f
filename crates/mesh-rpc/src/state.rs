// crates/mesh-rpc/src/state.rs
//
// Lifecycle state machine of a managed worker.
//
// Valid transitions:
//   Created -> Starting -> Ready -> Running -> Stopping -> Stopped
//   Starting -> Stopped   (setup failed)

use std::fmt;

use mesh_core::MeshError;

/// Lifecycle states of a managed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, worker thread not spawned yet.
    Created,
    /// Worker thread is joining the overlay and registering handlers.
    Starting,
    /// Setup finished; readiness has been signalled.
    Ready,
    /// Serving inbound calls.
    Running,
    /// Shutdown observed; deregistering handlers.
    Stopping,
    /// Worker thread has finished.
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Created => write!(f, "Created"),
            WorkerState::Starting => write!(f, "Starting"),
            WorkerState::Ready => write!(f, "Ready"),
            WorkerState::Running => write!(f, "Running"),
            WorkerState::Stopping => write!(f, "Stopping"),
            WorkerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// State machine for managing worker lifecycle transitions.
#[derive(Debug)]
pub struct WorkerStateMachine {
    pub current: WorkerState,
}

impl WorkerStateMachine {
    /// Create a new state machine starting in the Created state.
    pub fn new() -> Self {
        Self {
            current: WorkerState::Created,
        }
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `MeshError::InvalidState` if the transition is not valid.
    pub fn transition(&mut self, new_state: WorkerState) -> Result<(), MeshError> {
        let valid = matches!(
            (self.current, new_state),
            (WorkerState::Created, WorkerState::Starting)
                | (WorkerState::Starting, WorkerState::Ready)
                | (WorkerState::Starting, WorkerState::Stopped)
                | (WorkerState::Ready, WorkerState::Running)
                | (WorkerState::Running, WorkerState::Stopping)
                | (WorkerState::Stopping, WorkerState::Stopped)
        );

        if valid {
            tracing::info!("Worker state transition: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(MeshError::InvalidState(format!(
                "Invalid worker state transition: {} -> {}",
                self.current, new_state
            )))
        }
    }
}

impl Default for WorkerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
