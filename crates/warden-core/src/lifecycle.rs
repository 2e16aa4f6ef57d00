//! Handshake state machine: `Uninitialized -> Initializing -> Ready ->
//! ShuttingDown`. A plain function over `(state, method)`, not a trait
//! object — there is exactly one state machine per server process.

use crate::errors::ProtocolError;

pub const PROTOCOL_VERSION: &str = "2025-11-25";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
}

impl LifecycleState {
    pub fn is_ready(self) -> bool {
        matches!(self, LifecycleState::Ready)
    }

    /// Validate that `method` is legal in the current state and return the
    /// state to transition to. Does not mutate; the caller commits the
    /// transition.
    pub fn on_method(self, method: &str) -> Result<LifecycleState, ProtocolError> {
        match self {
            LifecycleState::Uninitialized => {
                if method == "initialize" {
                    Ok(LifecycleState::Initializing)
                } else {
                    Err(ProtocolError::InvalidRequest(format!(
                        "method '{method}' is not valid before initialize"
                    )))
                }
            }
            LifecycleState::Initializing => {
                if method == "notifications/initialized" {
                    Ok(LifecycleState::Ready)
                } else {
                    Err(ProtocolError::InvalidRequest(format!(
                        "method '{method}' is not valid until notifications/initialized"
                    )))
                }
            }
            LifecycleState::Ready => Ok(LifecycleState::Ready),
            LifecycleState::ShuttingDown => Err(ProtocolError::InvalidRequest(
                "server is shutting down".to_string(),
            )),
        }
    }

    pub fn on_eof(self) -> LifecycleState {
        LifecycleState::ShuttingDown
    }
}
