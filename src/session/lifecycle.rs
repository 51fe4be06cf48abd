//! Session lifecycle state machine.
//!
//! Pure transition logic, kept free of I/O so every path is unit-testable.
//! All transitions happen behind the session manager's mutex; concurrent
//! triggers (connect success, connection loss, explicit disconnect, retry
//! timer) serialize through these methods.

/// Connection state of the agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Tracks the session state plus the single pending-retry slot.
///
/// At most one retry timer exists at a time, and at most one connect attempt
/// is in flight: a retry that fires while an attempt is already in progress
/// or has already succeeded becomes a no-op.
#[derive(Debug)]
pub struct SessionLifecycle {
    state: SessionState,
    retry_pending: bool,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLifecycle {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            retry_pending: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Request a connect attempt. Returns false when one is already in
    /// flight or the session is already connected.
    pub fn begin_connect(&mut self) -> bool {
        match self.state {
            SessionState::Connected | SessionState::Connecting => false,
            SessionState::Disconnected | SessionState::Reconnecting => {
                self.state = SessionState::Connecting;
                true
            }
        }
    }

    /// A connect attempt was abandoned before reaching the transport
    /// (precondition failure). No retry is scheduled.
    pub fn abort_connect(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Disconnected;
        }
    }

    /// Transport-level connect succeeded. Returns false when the attempt is
    /// no longer current (a shutdown landed while CONNACK was in flight);
    /// the caller must then close the fresh transport instead of adopting
    /// it.
    pub fn connect_succeeded(&mut self) -> bool {
        if self.state != SessionState::Connecting {
            return false;
        }
        self.state = SessionState::Connected;
        self.retry_pending = false;
        true
    }

    /// Transport-level connect failed. Returns true when a retry timer
    /// should be scheduled (none pending yet).
    pub fn connect_failed(&mut self) -> bool {
        self.state = SessionState::Disconnected;
        if self.retry_pending {
            return false;
        }
        self.retry_pending = true;
        true
    }

    /// Unexpected drop while connected. Returns true when a retry timer
    /// should be scheduled.
    pub fn connection_lost(&mut self) -> bool {
        if self.state != SessionState::Connected {
            return false;
        }
        self.state = SessionState::Reconnecting;
        if self.retry_pending {
            return false;
        }
        self.retry_pending = true;
        true
    }

    /// The retry timer fired; release the slot before attempting to connect.
    pub fn retry_fired(&mut self) {
        self.retry_pending = false;
    }

    /// Explicit shutdown. Returns true when a pending retry must be
    /// cancelled along with it.
    pub fn shutdown(&mut self) -> bool {
        self.state = SessionState::Disconnected;
        std::mem::take(&mut self.retry_pending)
    }
}
