//! Session configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default upper bound on connection establishment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default upper bound on a single status read or command write.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Transmission unit size requested after connecting.
pub const DEFAULT_TARGET_MTU: u16 = 512;

/// Pause between a command write and the confirming status read.
pub const DEFAULT_CONFIRM_DELAY: Duration = Duration::from_secs(1);

/// Configuration for one device session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Hex-encoded per-device key issued by the cloud service (`sharedKey`).
    pub device_key: Option<String>,
    /// Generation index of `device_key` (`sharedKeySequence`).
    pub key_sequence: Option<u8>,
    /// Upper bound on connecting, including service discovery.
    pub connect_timeout: Duration,
    /// Upper bound on each status read and command write.
    pub operation_timeout: Duration,
    /// Transmission unit size to request.
    pub target_mtu: u16,
    /// Subscribe to status notifications after connecting.
    pub live_updates: bool,
    /// Re-read status after each command to check that it took effect.
    pub confirm_delivery: bool,
    /// Pause before the confirming status read.
    pub confirm_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_key: None,
            key_sequence: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            target_mtu: DEFAULT_TARGET_MTU,
            live_updates: false,
            confirm_delivery: true,
            confirm_delay: DEFAULT_CONFIRM_DELAY,
        }
    }
}

impl SessionConfig {
    /// Set the per-device key (hex).
    pub fn with_device_key(mut self, key_hex: impl Into<String>) -> Self {
        self.device_key = Some(key_hex.into());
        self
    }

    /// Set the key generation index.
    pub fn with_key_sequence(mut self, sequence: u8) -> Self {
        self.key_sequence = Some(sequence);
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read/write timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Enable or disable status notifications.
    pub fn with_live_updates(mut self, enabled: bool) -> Self {
        self.live_updates = enabled;
        self
    }

    /// Enable or disable the post-command status check.
    pub fn with_confirm_delivery(mut self, enabled: bool) -> Self {
        self.confirm_delivery = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.target_mtu, 512);
        assert!(config.confirm_delivery);
        assert!(!config.live_updates);
        assert!(config.device_key.is_none());
    }

    #[test]
    fn test_builder() {
        let config = SessionConfig::default()
            .with_device_key("abcd")
            .with_key_sequence(4)
            .with_connect_timeout(Duration::from_secs(5))
            .with_live_updates(true)
            .with_confirm_delivery(false);
        assert_eq!(config.device_key.as_deref(), Some("abcd"));
        assert_eq!(config.key_sequence, Some(4));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.live_updates);
        assert!(!config.confirm_delivery);
    }
}
