//! Command key selection.
//!
//! A frame accepts commands authenticated with one of two keys: the
//! per-device key issued by the cloud service, or a fixed default key. Which
//! one the firmware checks depends on its secure-mode flag, so the choice is
//! re-evaluated on every status read.

use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Key used by every frame that is not in secure mode.
pub const DEFAULT_KEY: [u8; 16] = [
    0xb7, 0x16, 0xc1, 0xd9, 0x80, 0x7b, 0x85, 0x7f, 0xcb, 0x26, 0xf2, 0x6f, 0xab, 0x21, 0x5c, 0x6b,
];

/// Per-device key material.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKey(Vec<u8>);

impl DeviceKey {
    /// Parse a hex-encoded key.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidKeyFormat {
                reason: "key is empty".to_string(),
            });
        }
        let bytes = hex::decode(trimmed).map_err(|e| Error::InvalidKeyFormat {
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceKey(<{} bytes>)", self.0.len())
    }
}

impl std::str::FromStr for DeviceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

/// The key currently authoritative for outbound commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveKey {
    /// The fixed [`DEFAULT_KEY`].
    Default,
    /// The caller-supplied per-device key.
    Device(DeviceKey),
}

impl ActiveKey {
    /// Key bytes to authenticate with.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Default => &DEFAULT_KEY,
            Self::Device(key) => key.as_bytes(),
        }
    }

    /// Check if this is the default key.
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

/// Holds candidate key material and decides which key is active.
#[derive(Debug, Clone, Default)]
pub struct KeyManager {
    device_key: Option<DeviceKey>,
    key_sequence: Option<u8>,
}

impl KeyManager {
    /// Create a key manager from an optional hex key.
    ///
    /// `None` and the empty string both mean "no per-device key".
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyFormat`] if a non-empty key is not valid hex.
    pub fn new(device_key_hex: Option<&str>) -> Result<Self> {
        let device_key = match device_key_hex.map(str::trim) {
            Some(hex_key) if !hex_key.is_empty() => Some(DeviceKey::from_hex(hex_key)?),
            _ => None,
        };

        Ok(Self {
            device_key,
            key_sequence: None,
        })
    }

    /// Create a key manager from session configuration.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut manager = Self::new(config.device_key.as_deref())?;
        manager.key_sequence = config.key_sequence;
        Ok(manager)
    }

    /// Check if a per-device key was supplied.
    pub fn has_device_key(&self) -> bool {
        self.device_key.is_some()
    }

    /// Decide the active key for a device in the given mode.
    ///
    /// Outside secure mode the firmware only checks the default key, so the
    /// per-device key is ignored even when present. A frame authenticated
    /// with the wrong key is written successfully and then silently dropped.
    pub fn resolve(&self, secure_mode: bool) -> ActiveKey {
        match (secure_mode, &self.device_key) {
            (false, _) => ActiveKey::Default,
            (true, Some(key)) => ActiveKey::Device(key.clone()),
            (true, None) => {
                // Unconfirmed against hardware: the frame may reject these commands.
                warn!("Device is in secure mode but no device key is configured; using default key");
                ActiveKey::Default
            }
        }
    }

    /// Resolve the active key for a freshly read status.
    ///
    /// Also warns when the device reports a key generation other than the
    /// configured one.
    pub fn resolve_for(&self, secure_mode: bool, device_key_index: u8) -> ActiveKey {
        let key = self.resolve(secure_mode);

        if let (ActiveKey::Device(_), Some(expected)) = (&key, self.key_sequence) {
            if expected != device_key_index {
                warn!(
                    "Configured key generation {} differs from device key index {}",
                    expected, device_key_index
                );
            }
        }

        debug!(
            "Key policy: secure_mode={}, active={}",
            secure_mode,
            if key.is_default() { "default" } else { "device" }
        );

        key
    }
}
