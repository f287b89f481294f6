//! Protocol module for decoding status and constructing commands.
//!
//! This module contains the implementations for:
//! - Status beacon decoding
//! - Command key selection
//! - Authenticated command framing
//! - Command payloads
//! - Command readiness

pub mod command;
pub mod frame;
pub mod keys;
pub mod readiness;
pub mod status;

pub use command::{Command, Settings};
pub use frame::{build_frame, verify_frame, CommandFrame, FRAME_KIND_JSON, MAC_LEN};
pub use keys::{ActiveKey, DeviceKey, KeyManager, DEFAULT_KEY};
pub use readiness::{is_ready, Readiness};
pub use status::{DeviceStatus, FirmwareVersion, FrameModel, StatusFlags, STATUS_LEN};
