//! Error types for the inkposter-ble crate.

use thiserror::Error;

/// Failure to decode a status beacon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The beacon was not exactly the expected size.
    #[error("Status beacon must be {expected} bytes, got {actual}")]
    Length {
        /// Required beacon size.
        expected: usize,
        /// Size of the data that was received.
        actual: usize,
    },

    /// The beacon reports a protocol version this crate does not speak.
    #[error("Unsupported status protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The model identifier is not valid UTF-8.
    #[error("Model identifier is not valid UTF-8")]
    MalformedModel,
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A status beacon could not be decoded. Never retried automatically.
    Decode,
    /// The session configuration is invalid. Raised before any connection attempt.
    Configuration,
    /// The radio link failed or timed out.
    Transport,
    /// The device stayed not-ready through the reconnect escalation.
    NotReady,
    /// The session was cancelled by the caller.
    Cancelled,
}

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No peripheral with the requested address is known to the adapter.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation requires a connection but the session is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// A status beacon could not be decoded.
    #[error("Invalid status beacon: {0}")]
    Decode(#[from] DecodeError),

    /// The supplied per-device key is not valid hex.
    #[error("Invalid device key: {reason}")]
    InvalidKeyFormat {
        /// Description of what was wrong with the key.
        reason: String,
    },

    /// A radio operation did not complete in time.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
    },

    /// The device did not become ready for commands after one reconnect cycle.
    #[error("Device {address} still not ready for commands")]
    DeviceNotReady {
        /// Address of the device.
        address: String,
    },

    /// The session was cancelled before the operation completed.
    #[error("Session cancelled")]
    Cancelled,

    /// A command payload could not be serialized.
    #[error("Payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) => ErrorKind::Decode,
            Self::InvalidKeyFormat { .. } | Self::InvalidParameter { .. } | Self::Payload(_) => {
                ErrorKind::Configuration
            }
            Self::DeviceNotReady { .. } => ErrorKind::NotReady,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Bluetooth(_)
            | Self::BluetoothUnavailable
            | Self::DeviceNotFound { .. }
            | Self::NotConnected
            | Self::ConnectionFailed { .. }
            | Self::Timeout { .. }
            | Self::CharacteristicNotFound { .. }
            | Self::ServiceNotFound { .. } => ErrorKind::Transport,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let decode: Error = DecodeError::UnsupportedVersion(2).into();
        assert_eq!(decode.kind(), ErrorKind::Decode);

        let key = Error::InvalidKeyFormat {
            reason: "odd length".to_string(),
        };
        assert_eq!(key.kind(), ErrorKind::Configuration);

        assert_eq!(
            Error::Timeout {
                operation: "connect"
            }
            .kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            Error::DeviceNotReady {
                address: "AA:BB".to_string()
            }
            .kind(),
            ErrorKind::NotReady
        );
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::Length {
            expected: 28,
            actual: 20,
        };
        assert_eq!(err.to_string(), "Status beacon must be 28 bytes, got 20");
    }
}
