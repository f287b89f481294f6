//! BLE communication module.
//!
//! This module provides the radio-facing side of the crate: advertisement
//! filtering, scanning, the transport traits, and their btleplug
//! implementation.

pub mod advertising;
pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use advertising::{filter_advertisement, DeviceAdvertisement, DeviceCandidate};
pub use characteristics::{BtleplugLink, CharacteristicHandler};
pub use connection::{SessionEvent, SessionState};
pub use scanner::BleScanner;
pub use transport::{BleConnection, BleLink, NotificationStream, WriteMode};
pub use uuids::*;
