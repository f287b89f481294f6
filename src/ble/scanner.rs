//! BLE scanning functionality.
//!
//! Provides the scanner for discovering InkPoster frames.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::ble::advertising::{filter_advertisement, DeviceAdvertisement, DeviceCandidate};
use crate::error::{Error, Result};

const UNKNOWN_ADDRESS: &str = "00:00:00:00:00:00";

/// BLE scanner for discovering InkPoster frames.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Accepted candidates by address.
    discovered: Arc<RwLock<HashMap<String, DeviceCandidate>>>,
    /// Channel for discovery events.
    event_tx: broadcast::Sender<DeviceCandidate>,
    /// Handle to the scanning task.
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl BleScanner {
    /// Create a new BLE scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start scanning for frames.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for InkPoster frames");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while *is_scanning.read() {
                tokio::select! {
                    Some(event) = events.next() => {
                        Self::handle_event(event, &adapter, &discovered, &event_tx).await;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning for frames.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Get all accepted candidates, keyed by address.
    pub fn candidates(&self) -> HashMap<String, DeviceCandidate> {
        self.discovered.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceCandidate> {
        self.event_tx.subscribe()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Handle a BLE central event.
    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        discovered: &Arc<RwLock<HashMap<String, DeviceCandidate>>>,
        event_tx: &broadcast::Sender<DeviceCandidate>,
    ) {
        match event {
            CentralEvent::DeviceDiscovered(id)
            | CentralEvent::DeviceUpdated(id)
            | CentralEvent::ManufacturerDataAdvertisement { id, .. } => {
                Self::process_peripheral(adapter, id, discovered, event_tx).await;
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            _ => {}
        }
    }

    /// Turn a peripheral's advertised properties into advertisements and filter them.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        discovered: &Arc<RwLock<HashMap<String, DeviceCandidate>>>,
        event_tx: &broadcast::Sender<DeviceCandidate>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        // CoreBluetooth hides MAC addresses; fall back to the peripheral id.
        let address = if properties.address.to_string() == UNKNOWN_ADDRESS {
            id.to_string()
        } else {
            properties.address.to_string()
        };

        let advertisements = advertisements_from(
            &address,
            properties.local_name.as_deref(),
            properties.rssi,
            &properties.manufacturer_data,
        );

        for advertisement in advertisements {
            let Some(candidate) = filter_advertisement(&advertisement) else {
                continue;
            };

            trace!("Frame advertisement from {}", candidate.address);
            discovered
                .write()
                .insert(candidate.address.clone(), candidate.clone());
            let _ = event_tx.send(candidate);
        }
    }
}

/// Expand btleplug's manufacturer data into one advertisement per company id.
///
/// btleplug strips the company identifier and uses it as the map key; it is
/// put back in front of the value so each advertisement carries the full beacon.
pub(crate) fn advertisements_from(
    address: &str,
    name: Option<&str>,
    rssi: Option<i16>,
    manufacturer_data: &HashMap<u16, Vec<u8>>,
) -> Vec<DeviceAdvertisement> {
    manufacturer_data
        .iter()
        .map(|(company_id, value)| {
            let mut data = company_id.to_le_bytes().to_vec();
            data.extend_from_slice(value);

            DeviceAdvertisement {
                address: address.to_string(),
                name: name.map(str::to_string),
                manufacturer_data: data,
                rssi,
            }
        })
        .collect()
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}
