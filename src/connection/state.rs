//! Connection state machine.
//!
//! Pure transition logic; the supervisor thread feeds it inputs and carries
//! out the returned actions.

use crate::types::ConnectionState;

/// Side effect the supervisor must perform after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    /// Close any open subscription and open a fresh one.
    Open,
    /// Close the open subscription.
    Close,
    /// Arm the reconnect timer for the given attempt (0-based).
    ScheduleReconnect { attempt: u32 },
    /// Disarm the reconnect timer.
    CancelReconnect,
}

/// One step of the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub action: Action,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Lifecycle of one realtime subscription target.
#[derive(Clone, Debug, Default)]
pub struct ConnectionMachine {
    state: ConnectionState,
    /// Consecutive reconnect attempts since the last successful connect.
    attempt: u32,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn go(&mut self, to: ConnectionState, action: Action) -> Transition {
        let from = self.state;
        self.state = to;
        Transition { from, to, action }
    }

    fn stay(&self) -> Transition {
        Transition {
            from: self.state,
            to: self.state,
            action: Action::None,
        }
    }

    /// Explicit subscribe from any state.
    pub fn subscribe(&mut self) -> Transition {
        self.attempt = 0;
        self.go(ConnectionState::Connecting, Action::Open)
    }

    /// The transport reports the channel is live.
    pub fn connected(&mut self) -> Transition {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Disconnected => {
                self.attempt = 0;
                self.go(ConnectionState::Connected, Action::CancelReconnect)
            }
            _ => self.stay(),
        }
    }

    /// The transport lost the channel (or asked to re-establish it).
    pub fn disconnected(&mut self) -> Transition {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                let attempt = self.attempt;
                self.go(
                    ConnectionState::Disconnected,
                    Action::ScheduleReconnect { attempt },
                )
            }
            _ => self.stay(),
        }
    }

    /// The subscription failed. No automatic retry.
    pub fn failed(&mut self) -> Transition {
        self.go(ConnectionState::Error, Action::Close)
    }

    /// The reconnect timer fired.
    ///
    /// Only acts while still disconnected; anything else means the timer is
    /// stale.
    pub fn reconnect_due(&mut self) -> Transition {
        if self.state != ConnectionState::Disconnected {
            return self.stay();
        }
        self.attempt = self.attempt.saturating_add(1);
        self.go(ConnectionState::Connecting, Action::Open)
    }

    /// A reopen during reconnect could not even be requested.
    ///
    /// Falls back to disconnected with the next backoff step.
    pub fn reopen_failed(&mut self) -> Transition {
        let attempt = self.attempt;
        self.go(
            ConnectionState::Disconnected,
            Action::ScheduleReconnect { attempt },
        )
    }

    /// Explicit unsubscribe from any state.
    pub fn unsubscribe(&mut self) -> Transition {
        self.attempt = 0;
        self.go(ConnectionState::Disconnected, Action::Close)
    }
}
