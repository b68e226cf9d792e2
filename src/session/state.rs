//! Session lifecycle states

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Connection lifecycle: `Idle → Connecting → Connected → Disconnecting → Idle`.
///
/// Failures fall back to `Idle`: an open failure takes `Connecting → Idle`,
/// a transport fault drives `Connected → Disconnecting → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Idle)
                | (Connected, Disconnecting)
                | (Disconnecting, Idle)
        )
    }

    /// Control operations (reset) are only permitted while connected
    pub fn accepts_control(self) -> bool {
        self == SessionState::Connected
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// Current state plus a broadcast of every change
pub(crate) struct StateCell {
    current: SessionState,
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionState::Idle);
        Self {
            current: SessionState::Idle,
            tx,
        }
    }

    pub fn get(&self) -> SessionState {
        self.current
    }

    /// Apply a transition. Invalid transitions are refused and logged.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.current.can_transition_to(next) {
            tracing::error!("Refusing session transition {} -> {}", self.current, next);
            return false;
        }
        tracing::debug!("Session {} -> {}", self.current, next);
        self.current = next;
        self.tx.send_replace(next);
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use SessionState::*;
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Idle));
        assert!(Connected.can_transition_to(Disconnecting));
        assert!(Disconnecting.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Connected));
        assert!(!Idle.can_transition_to(Disconnecting));
        assert!(!Connected.can_transition_to(Idle));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Disconnecting.can_transition_to(Connected));
    }

    #[test]
    fn test_only_connected_accepts_control() {
        assert!(SessionState::Connected.accepts_control());
        assert!(!SessionState::Idle.accepts_control());
        assert!(!SessionState::Connecting.accepts_control());
        assert!(!SessionState::Disconnecting.accepts_control());
    }

    #[test]
    fn test_state_cell_broadcasts_changes() {
        let mut cell = StateCell::new();
        let rx = cell.subscribe();

        assert!(cell.transition(SessionState::Connecting));
        assert_eq!(*rx.borrow(), SessionState::Connecting);

        // Invalid jump is refused and leaves the state alone
        assert!(!cell.transition(SessionState::Disconnecting));
        assert_eq!(cell.get(), SessionState::Connecting);
        assert_eq!(*rx.borrow(), SessionState::Connecting);
    }
}
