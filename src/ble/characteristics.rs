//! GATT characteristic handling over btleplug.
//!
//! Provides the platform implementation of [`BleLink`] and
//! [`BleConnection`] for reading, writing, and subscribing to
//! characteristics on InkPoster frames.

use async_trait::async_trait;
use btleplug::api::{Central, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::transport::{BleConnection, BleLink, NotificationStream, WriteMode};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Opens connections through a btleplug adapter.
#[derive(Clone)]
pub struct BtleplugLink {
    adapter: Adapter,
}

impl BtleplugLink {
    /// Create a link on the given adapter.
    pub fn new(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Find a known peripheral by address.
    ///
    /// Matches the Bluetooth address, or the platform peripheral id on
    /// platforms that hide addresses.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let peripherals = self.adapter.peripherals().await.map_err(Error::Bluetooth)?;

        peripherals
            .into_iter()
            .find(|p| {
                p.address().to_string().eq_ignore_ascii_case(address)
                    || p.id().to_string() == address
            })
            .ok_or_else(|| Error::DeviceNotFound {
                address: address.to_string(),
            })
    }
}

#[async_trait]
impl BleLink for BtleplugLink {
    async fn connect(&self, address: &str) -> Result<Box<dyn BleConnection>> {
        let peripheral = self.find_peripheral(address).await?;

        // Plain connect only. Bonding turns on link encryption, which breaks
        // command writes on some platforms.
        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral.connect().await.map_err(|e| Error::ConnectionFailed {
                reason: e.to_string(),
            })?;
        }

        info!("Connected to {}", address);

        Ok(Box::new(CharacteristicHandler::new(peripheral)))
    }
}

/// Handler for GATT characteristics on a connected frame.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a connected peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Get a characteristic by UUID.
    fn get_characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Cache characteristics from the peripheral's discovered services.
    fn cache_characteristics(&self) -> usize {
        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                trace!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid,
                    service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        chars.len()
    }
}

#[async_trait]
impl BleConnection for CharacteristicHandler {
    async fn negotiate_mtu(&self, target: u16) -> Result<Option<u16>> {
        // btleplug negotiates the largest unit the platform allows during
        // connect and does not expose the result.
        debug!("Transmission unit of {} left to the platform stack", target);
        Ok(None)
    }

    async fn discover_services(&self) -> Result<()> {
        if self.peripheral.services().is_empty() {
            self.peripheral
                .discover_services()
                .await
                .map_err(Error::Bluetooth)?;
        } else {
            debug!("Using cached services");
        }

        let count = self.cache_characteristics();
        debug!("Discovered {} characteristics", count);

        let has_service = self
            .peripheral
            .services()
            .iter()
            .any(|s| is_inkposter_service(&s.uuid));
        if !has_service {
            return Err(Error::ServiceNotFound {
                uuid: INKPOSTER_SERVICE_UUID.to_string(),
            });
        }

        Ok(())
    }

    fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    async fn read(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        let characteristic = self.get_characteristic(uuid)?;

        let data = self
            .peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from characteristic {}", data.len(), uuid);

        Ok(data)
    }

    async fn write(&self, uuid: &Uuid, data: &[u8], mode: WriteMode) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        self.peripheral
            .write(&characteristic, data, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), uuid);

        Ok(())
    }

    async fn subscribe(&self, uuid: &Uuid) -> Result<NotificationStream> {
        let characteristic = self.get_characteristic(uuid)?;

        if !characteristic.descriptors.iter().any(|d| d.uuid == CCCD_UUID) {
            warn!("Characteristic {} has no CCCD; notifications may not arrive", uuid);
        }

        let notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to notifications from {}", uuid);

        let wanted = *uuid;
        Ok(notifications
            .filter(move |n| futures::future::ready(n.uuid == wanted))
            .map(|n| n.value)
            .boxed())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        self.peripheral
            .disconnect()
            .await
            .map_err(Error::Bluetooth)?;

        info!("Disconnected from {}", self.peripheral.address());

        Ok(())
    }
}
