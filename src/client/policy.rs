//! When to (re)open the live-updates connection.
//!
//! Pure bookkeeping: no timers, no I/O. The supervisor feeds in what happened
//! and sleeps for whatever delay comes back.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Failures tolerated in a row; the next one stops reconnecting.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl BackoffConfig {
    /// `min(base · 2^attempt, max)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Why there is no connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Never connected.
    Idle,
    /// Closed on purpose (logout); never reconnects by itself.
    Manual,
    /// Waiting `delay` before attempt number `attempt + 1`.
    Backoff { attempt: u32, delay: Duration },
    /// Gave up; shown to the user as "live updates paused".
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected(Disconnect),
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, ConnectionState::Disconnected(Disconnect::Exhausted))
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    config: BackoffConfig,
    state: ConnectionState,
    attempt: u32,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

impl ReconnectionPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected(Disconnect::Idle),
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failures since the last successful connect.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// User or app asks for a connection. Starts over from any disconnected
    /// state, including an exhausted one; no-op while connecting or connected.
    pub fn connect_requested(&mut self) -> ConnectionState {
        if let ConnectionState::Disconnected(_) = self.state {
            self.attempt = 0;
            self.state = ConnectionState::Connecting;
        }
        self.state
    }

    /// The backoff timer fired. Returns false for a timer that no longer
    /// applies, e.g. one outlived by a manual disconnect.
    pub fn backoff_elapsed(&mut self) -> bool {
        if let ConnectionState::Disconnected(Disconnect::Backoff { .. }) = self.state {
            self.state = ConnectionState::Connecting;
            true
        } else {
            false
        }
    }

    /// Handshake and reconciliation succeeded. Returns false if the attempt
    /// was abandoned meanwhile and the fresh connection should be closed.
    pub fn connected(&mut self) -> bool {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Connected;
            self.attempt = 0;
            true
        } else {
            false
        }
    }

    /// A connect attempt failed.
    pub fn connect_failed(&mut self) -> ConnectionState {
        self.fail()
    }

    /// An established connection closed without being asked to.
    pub fn connection_lost(&mut self) -> ConnectionState {
        self.fail()
    }

    /// Logout or explicit close. Cancels any pending reconnect.
    pub fn disconnect_requested(&mut self) -> ConnectionState {
        self.attempt = 0;
        self.state = ConnectionState::Disconnected(Disconnect::Manual);
        self.state
    }

    fn fail(&mut self) -> ConnectionState {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {}
            // manual, idle and exhausted stay put; a stray failure report
            // during backoff does not count twice
            ConnectionState::Disconnected(_) => return self.state,
        }

        self.attempt += 1;
        self.state = if self.attempt > self.config.max_attempts {
            ConnectionState::Disconnected(Disconnect::Exhausted)
        } else {
            ConnectionState::Disconnected(Disconnect::Backoff {
                attempt: self.attempt,
                delay: self.config.delay_for(self.attempt),
            })
        };
        self.state
    }
}
