//! Connectivity monitoring
//!
//! A watch channel carrying the current connectivity state. The queue
//! subscribes and reacts to offline-to-online transitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Whether the backing store is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// The backing store is reachable.
    Online,
    /// The backing store is unreachable; writes queue locally.
    #[default]
    Offline,
}

impl ConnectivityState {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Publishes connectivity transitions to subscribers.
#[derive(Debug)]
pub struct ConnectionMonitor {
    sender: watch::Sender<ConnectivityState>,
}

impl ConnectionMonitor {
    /// Create a monitor starting in the given state.
    #[must_use]
    pub fn new(initial: ConnectivityState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Current connectivity state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.sender.borrow()
    }

    /// True when the monitor reports online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state() == ConnectivityState::Online
    }

    /// Publish a new state. Subscribers are only notified on change.
    pub fn set_state(&self, state: ConnectivityState) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            info!(state = %state, "connectivity changed");
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.sender.subscribe()
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(ConnectivityState::Offline)
    }
}
