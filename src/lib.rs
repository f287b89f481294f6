// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # inkposter-ble
//!
//! A cross-platform Rust library for controlling InkPoster e-ink frames over
//! Bluetooth Low Energy, without the cloud service in the command path.
//!
//! ## Features
//!
//! - **Frame Discovery**: Find nearby `InkP-*` frames and decode their beacons
//! - **Status Decoding**: Battery, Wi-Fi, firmware, model, and all status flags
//! - **Key Selection**: Per-device or default key, following the frame's secure mode
//! - **Authenticated Commands**: HMAC-SHA256 framing bound to the freshness counter
//! - **Readiness Recovery**: One bounded reconnect when the launcher is not ready
//! - **Delivery Confirmation**: Reports whether the frame actually ran a command
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inkposter_ble::{Command, DeviceManager, Result, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     manager.start_scanning().await?;
//!
//!     let frame = manager.find_frame(Duration::from_secs(10)).await?;
//!     println!("Found {} ({})", frame.name, frame.address);
//!
//!     let config = SessionConfig::default().with_device_key("00112233445566778899aabbccddeeff");
//!     let mut session = manager.session(&frame.address, config)?;
//!
//!     let outcome = session.send(&Command::Fetch).await?;
//!     println!("Fetch: {:?}", outcome);
//!
//!     session.disconnect().await?;
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Frames are addressed by the
//! CoreBluetooth peripheral identifier rather than a MAC address.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//! Do not pair the frame in BlueZ; paired links reject command writes.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for status and config types

// Public modules
pub mod ble;
pub mod config;
pub mod device_manager;
pub mod error;
pub mod protocol;
pub mod session;

// Re-exports for convenience
pub use config::SessionConfig;
pub use device_manager::{CallbackHandle, DeviceManager};
pub use error::{DecodeError, Error, ErrorKind, Result};
pub use session::{CancelHandle, ConnectionSession, SendOutcome};

// Re-export commonly used types from submodules
pub use ble::{DeviceAdvertisement, DeviceCandidate, SessionEvent, SessionState, WriteMode};
pub use protocol::{
    ActiveKey, Command, CommandFrame, DeviceStatus, FirmwareVersion, FrameModel, KeyManager,
    Readiness, Settings, StatusFlags,
};
