//! Radio transport boundary.
//!
//! The session drives a device through these traits. The btleplug-backed
//! implementation lives in [`crate::ble::characteristics`]; tests supply
//! simulated devices.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;

/// Stream of raw characteristic values pushed by the device.
pub type NotificationStream = BoxStream<'static, Vec<u8>>;

/// GATT write mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Write request, acknowledged by the peer's link layer.
    WithResponse,
    /// Write command, fire and forget.
    WithoutResponse,
}

/// Opens connections to devices by address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleLink: Send + Sync {
    /// Connect to the device. Must not pair or bond.
    async fn connect(&self, address: &str) -> Result<Box<dyn BleConnection>>;
}

/// An open connection to one device.
///
/// Operations on one connection are issued strictly one at a time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleConnection: Send + Sync {
    /// Request a larger transmission unit. Returns the agreed size if the
    /// platform reports it.
    async fn negotiate_mtu(&self, target: u16) -> Result<Option<u16>>;

    /// Discover services and characteristics.
    async fn discover_services(&self) -> Result<()>;

    /// Check whether a characteristic was discovered.
    fn has_characteristic(&self, uuid: &Uuid) -> bool;

    /// Read a characteristic value.
    async fn read(&self, uuid: &Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(&self, uuid: &Uuid, data: &[u8], mode: WriteMode) -> Result<()>;

    /// Enable notifications and return the stream of values.
    async fn subscribe(&self, uuid: &Uuid) -> Result<NotificationStream>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;
}
