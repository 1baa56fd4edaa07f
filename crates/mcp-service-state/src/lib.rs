use chrono::{DateTime, Utc};
use mcp_common::errors::{ProcessError, ProcessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Spawned, not yet confirmed by a health probe
    Starting,
    /// At least one health probe succeeded
    Running,
    /// The startup probe failed: no open port in the window, or the process already exited
    Unhealthy,
    /// The process exited while it was expected to be running
    Crashed,
    /// Torn down by the shutdown coordinator
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Starting => write!(f, "starting"),
            ServiceState::Running => write!(f, "running"),
            ServiceState::Unhealthy => write!(f, "unhealthy"),
            ServiceState::Crashed => write!(f, "crashed"),
            ServiceState::Stopped => write!(f, "stopped"),
        }
    }
}

impl ServiceState {
    /// Whether the process behind the service is expected to be alive.
    pub fn is_expected_running(&self) -> bool {
        matches!(
            self,
            ServiceState::Starting | ServiceState::Running | ServiceState::Unhealthy
        )
    }
}

/// Represents a state transition with timestamp and optional reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ServiceState,
    pub to_state: ServiceState,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// State machine that enforces `Starting → (Running | Unhealthy) → (Crashed | Stopped)`.
///
/// A machine is born in `Starting`: it only exists once a process has been
/// spawned for the service.
#[derive(Debug, Clone)]
pub struct ServiceStateMachine {
    service_id: String,
    current_state: ServiceState,
    state_history: Vec<StateTransition>,
}

impl ServiceStateMachine {
    /// Create a state machine for a freshly spawned service.
    pub fn new(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            current_state: ServiceState::Starting,
            state_history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> ServiceState {
        self.current_state
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    /// Check if a transition from current state to target state is valid
    fn is_valid_transition(&self, target_state: ServiceState) -> bool {
        use ServiceState::*;

        match (self.current_state, target_state) {
            (Starting, Running) | (Starting, Unhealthy) => true,
            // shutdown can arrive before the first health check
            (Starting, Stopped) => true,

            (Running, Crashed) | (Running, Stopped) => true,
            (Unhealthy, Crashed) | (Unhealthy, Stopped) => true,

            (Crashed, Stopped) => true,

            (state, target) if state == target => true,

            _ => false,
        }
    }

    /// Transition to a new state with optional reason
    pub fn transition_to(
        &mut self,
        target_state: ServiceState,
        reason: Option<String>,
    ) -> ProcessResult<()> {
        if !self.is_valid_transition(target_state) {
            return Err(ProcessError::invalid_state(
                &self.service_id,
                target_state.to_string(),
                self.current_state.to_string(),
            ));
        }

        if target_state == self.current_state {
            return Ok(());
        }

        let from_state = self.current_state;
        self.state_history.push(StateTransition {
            from_state,
            to_state: target_state,
            timestamp: Utc::now(),
            reason,
        });
        self.current_state = target_state;

        tracing::debug!(
            "Service {} transitioned from {} to {}",
            self.service_id,
            from_state,
            target_state
        );

        Ok(())
    }
}
