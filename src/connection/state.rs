//! Lifecycle state and statistics.

use std::time::Instant;

/// Durable lifecycle state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// Configuration not yet resolved.
    #[default]
    Unprepared,
    /// Prepared but not connected.
    Prepared,
    /// Connected and ready.
    Connected,
}

impl LifecycleState {
    /// Check if the client is usable.
    pub fn is_connected(&self) -> bool {
        *self == LifecycleState::Connected
    }

    /// Check if the configuration has been resolved.
    pub fn is_prepared(&self) -> bool {
        !matches!(self, LifecycleState::Unprepared)
    }
}

/// Lifecycle statistics.
#[derive(Debug, Clone, Default)]
pub struct LifecycleStats {
    /// Number of times the connect hook succeeded.
    pub connect_count: u64,
    /// Number of times the connect hook failed.
    pub failure_count: u64,
    /// Number of completed disconnects.
    pub disconnect_count: u64,
    /// Number of disconnects forced by a configuration change.
    pub invalidation_count: u64,
    /// Number of resets.
    pub reset_count: u64,
    /// Time of last successful connection.
    pub last_connected: Option<Instant>,
    /// Time of last disconnect.
    pub last_disconnected: Option<Instant>,
    /// Time of last connect failure.
    pub last_error: Option<Instant>,
}

impl LifecycleStats {
    /// Record a successful connection.
    pub fn record_connect(&mut self) {
        self.connect_count += 1;
        self.last_connected = Some(Instant::now());
    }

    /// Record a disconnection.
    pub fn record_disconnect(&mut self) {
        self.disconnect_count += 1;
        self.last_disconnected = Some(Instant::now());
    }

    /// Record a connection failure.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_error = Some(Instant::now());
    }

    /// Record a disconnect caused by a field change.
    pub fn record_invalidation(&mut self) {
        self.invalidation_count += 1;
    }

    /// Record a reset.
    pub fn record_reset(&mut self) {
        self.reset_count += 1;
    }

    /// Time since the last successful connection.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.last_connected.map(|t| t.elapsed())
    }
}
