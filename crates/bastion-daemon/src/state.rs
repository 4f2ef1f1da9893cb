// crates/bastion-daemon/src/state.rs
//
// Daemon lifecycle state machine.
//
// Valid transitions:
//   Initializing -> Restoring -> Running
//   Any state -> ShuttingDown

use std::fmt;

/// Lifecycle states of the daemon process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    /// Loading configuration and deploying modules.
    Initializing,
    /// Replacing deployed modules with persisted snapshots.
    Restoring,
    /// Serving modules and dripping fees.
    Running,
    /// Persisting snapshots before exit.
    ShuttingDown,
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonState::Initializing => write!(f, "Initializing"),
            DaemonState::Restoring => write!(f, "Restoring"),
            DaemonState::Running => write!(f, "Running"),
            DaemonState::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// State machine for the daemon's lifecycle transitions.
pub struct DaemonStateMachine {
    pub current: DaemonState,
}

impl DaemonStateMachine {
    pub fn new() -> Self {
        Self {
            current: DaemonState::Initializing,
        }
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns an error if the transition is not valid.
    pub fn transition(&mut self, new_state: DaemonState) -> Result<(), String> {
        let valid = matches!(
            (&self.current, &new_state),
            (_, DaemonState::ShuttingDown)
                | (DaemonState::Initializing, DaemonState::Restoring)
                | (DaemonState::Restoring, DaemonState::Running)
        );

        if valid {
            tracing::info!("Daemon state: {} -> {}", self.current, new_state);
            self.current = new_state;
            Ok(())
        } else {
            Err(format!(
                "Invalid state transition: {} -> {}",
                self.current, new_state
            ))
        }
    }
}

impl Default for DaemonStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
