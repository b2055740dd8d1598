//! Per-server connection FSM (spec.md §4.2). The state itself is a plain
//! value the dispatcher holds per server; `conn.rs` drives the transitions.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Disconnected,
    Connecting,
    TlsHandshaking,
    Identifying,
    Connected,
    WaitingToReconnect,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Disconnected => "disconnected",
            State::Connecting => "connecting",
            State::TlsHandshaking => "tls_handshaking",
            State::Identifying => "identifying",
            State::Connected => "connected",
            State::WaitingToReconnect => "waiting_to_reconnect",
            State::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

impl State {
    /// Whether this state accepts the "this is a transition to
    /// `waiting_to_reconnect`" event (spec.md §4.2: "any -> waiting_to_reconnect
    /// on socket error... except once stopped").
    pub fn can_reconnect(self) -> bool {
        self != State::Stopped
    }

    pub fn is_connected(self) -> bool {
        self == State::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_cannot_reconnect() {
        assert!(!State::Stopped.can_reconnect());
        assert!(State::WaitingToReconnect.can_reconnect());
    }
}
