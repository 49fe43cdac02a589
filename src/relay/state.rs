//! Relay connection state machine.

/// Relay connection states.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayState {
    /// Not started.
    #[default]
    Idle,
    /// Running an attempt (1-based counter within the current budget).
    Connecting { attempt: u32 },
    /// Interface established, packets flowing.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting { failures: u32 },
    /// Stopped on request.
    Stopped,
    /// Gave up.
    Failed(String),
}

impl RelayState {
    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, RelayState::Connected)
    }

    /// Check if the supervisor has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Stopped | RelayState::Failed(_))
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Idle => write!(f, "Idle"),
            RelayState::Connecting { attempt } => write!(f, "Connecting (attempt {attempt})"),
            RelayState::Connected => write!(f, "Connected"),
            RelayState::Reconnecting { failures } => {
                write!(f, "Reconnecting ({failures} consecutive failures)")
            }
            RelayState::Stopped => write!(f, "Stopped"),
            RelayState::Failed(e) => write!(f, "Failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(RelayState::Stopped.is_terminal());
        assert!(RelayState::Failed("x".into()).is_terminal());
        assert!(!RelayState::Connected.is_terminal());
        assert!(RelayState::Connected.is_connected());
        assert_eq!(RelayState::default(), RelayState::Idle);
        assert_eq!(RelayState::Connecting { attempt: 2 }.to_string(), "Connecting (attempt 2)");
    }
}
