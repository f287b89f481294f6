//! Session connection states.
//!
//! A session moves through these states while connecting, reading status,
//! and delivering a command. Every transition is published as a
//! [`SessionEvent`].

/// Lifecycle state of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No open connection.
    #[default]
    Disconnected,
    /// Establishing the connection and discovering services.
    Connecting,
    /// Reading and decoding the status beacon.
    StatusRead,
    /// Last status read reported the device ready for commands.
    Ready,
    /// Last status read reported the device not ready for commands.
    NotReady,
    /// Writing a command frame.
    Sending,
    /// Waiting before dropping the link of a not-ready device.
    RetryWait,
    /// Link dropped, waiting before reconnecting.
    ReconnectWait,
    /// Terminal failure of the last operation; the link is closed.
    Failed,
}

impl SessionState {
    /// Check if a connection is open in this state.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            Self::StatusRead | Self::Ready | Self::NotReady | Self::Sending | Self::RetryWait
        )
    }

    /// Check if the state follows a completed status read.
    pub fn has_status(&self) -> bool {
        matches!(self, Self::Ready | Self::NotReady)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::StatusRead | Self::Sending | Self::RetryWait | Self::ReconnectWait
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::StatusRead => write!(f, "StatusRead"),
            Self::Ready => write!(f, "Ready"),
            Self::NotReady => write!(f, "NotReady"),
            Self::Sending => write!(f, "Sending"),
            Self::RetryWait => write!(f, "RetryWait"),
            Self::ReconnectWait => write!(f, "ReconnectWait"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Event for session state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    /// Address of the device.
    pub address: String,
    /// The new session state.
    pub state: SessionState,
}
