//! Connection state machine.
//!
//! ```text
//! CONNECTING -> CONNECTED -> MONITORING
//!      \             \           \
//!       +-------------+-----------+--> CLOSED
//! ```
//!
//! CLOSED is terminal.

use crate::error::ClientError;
use std::fmt;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Transport being established, decoder not yet fed.
    Connecting,
    /// Decoder active.
    Connected,
    /// At least one monitor is installed.
    Monitoring,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Monitoring => "MONITORING",
            ConnectionState::Closed => "CLOSED",
        }
    }

    /// Returns whether `self -> to` is a legal transition.
    ///
    /// MONITORING -> MONITORING is legal: a second monitor on a connection
    /// that already has one.
    pub fn can_transition_to(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (*self, to),
            (Connecting, Connected)
                | (Connected, Monitoring)
                | (Monitoring, Monitoring)
                | (Connecting | Connected | Monitoring, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of one connection and rejects illegal transitions.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// Moves to `to`, returning the previous state.
    pub fn transition(&mut self, to: ConnectionState) -> Result<ConnectionState, ClientError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            tracing::warn!("rejected connection state transition {} -> {}", from, to);
            return Err(ClientError::InvalidTransition { from, to });
        }
        self.state = to;
        if from != to {
            tracing::debug!("connection state {} -> {}", from, to);
        }
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = ConnectionStateMachine::new();
        assert_eq!(sm.state(), ConnectionState::Connecting);
        assert_eq!(
            sm.transition(ConnectionState::Connected).unwrap(),
            ConnectionState::Connecting
        );
        sm.transition(ConnectionState::Monitoring).unwrap();
        sm.transition(ConnectionState::Monitoring).unwrap();
        sm.transition(ConnectionState::Closed).unwrap();
        assert!(sm.is_closed());
    }

    #[test]
    fn test_close_from_any_open_state() {
        for path in [
            vec![],
            vec![ConnectionState::Connected],
            vec![ConnectionState::Connected, ConnectionState::Monitoring],
        ] {
            let mut sm = ConnectionStateMachine::new();
            for state in path {
                sm.transition(state).unwrap();
            }
            assert!(sm.transition(ConnectionState::Closed).is_ok());
        }
    }

    #[test]
    fn test_illegal_transitions() {
        let mut sm = ConnectionStateMachine::new();
        assert!(matches!(
            sm.transition(ConnectionState::Monitoring),
            Err(ClientError::InvalidTransition {
                from: ConnectionState::Connecting,
                to: ConnectionState::Monitoring
            })
        ));
        assert_eq!(sm.state(), ConnectionState::Connecting);

        sm.transition(ConnectionState::Closed).unwrap();
        for to in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Monitoring,
            ConnectionState::Closed,
        ] {
            assert!(sm.transition(to).is_err());
        }
        assert!(sm.is_closed());
    }
}
