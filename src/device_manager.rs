//! Device manager for discovering InkPoster frames and opening sessions.
//!
//! This module ties the scanner to the btleplug transport. Discovery runs
//! continuously in the background; sessions to different frames are
//! independent of it and of each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ble::advertising::DeviceCandidate;
use crate::ble::characteristics::BtleplugLink;
use crate::ble::scanner::BleScanner;
use crate::ble::transport::BleLink;
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::session::ConnectionSession;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Central manager for discovering frames and opening sessions.
pub struct DeviceManager {
    /// BLE scanner.
    scanner: Arc<BleScanner>,
    /// Transport used for sessions.
    link: Arc<BtleplugLink>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl DeviceManager {
    /// Create a new DeviceManager on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let scanner = BleScanner::new().await?;
        let link = BtleplugLink::new(scanner.adapter().clone());

        Ok(Self {
            scanner: Arc::new(scanner),
            link: Arc::new(link),
            callback_counter: AtomicU64::new(0),
        })
    }

    /// Start scanning for frames.
    pub async fn start_scanning(&self) -> Result<()> {
        self.scanner.start_scanning().await
    }

    /// Stop scanning for frames.
    pub async fn stop_scanning(&self) -> Result<()> {
        self.scanner.stop_scanning().await
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Get all frames seen so far, keyed by address.
    pub fn candidates(&self) -> HashMap<String, DeviceCandidate> {
        self.scanner.candidates()
    }

    /// Subscribe to frame advertisements.
    pub fn subscribe_candidates(&self) -> broadcast::Receiver<DeviceCandidate> {
        self.scanner.subscribe()
    }

    /// Register a callback for every frame advertisement.
    pub fn on_frame_discovered<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(DeviceCandidate) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.scanner.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(candidate) => callback(candidate),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Discovery callback skipped {} advertisements", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }

    /// Wait for the first frame advertisement.
    ///
    /// Returns a frame already seen, if any; otherwise waits up to `timeout`.
    pub async fn find_frame(&self, timeout: Duration) -> Result<DeviceCandidate> {
        let mut rx = self.scanner.subscribe();

        if let Some(candidate) = self.candidates().into_values().next() {
            return Ok(candidate);
        }

        let wait = async {
            loop {
                match rx.recv().await {
                    Ok(candidate) => return Ok(candidate),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(Error::BluetoothUnavailable)
                    }
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| Error::Timeout {
                operation: "frame discovery",
            })?
    }

    /// Open a session with the frame at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyFormat`] if the configured key is not hex.
    pub fn session(&self, address: &str, config: SessionConfig) -> Result<ConnectionSession> {
        let link: Arc<dyn BleLink> = self.link.clone();
        ConnectionSession::new(link, address, config)
    }

    /// Clean shutdown of scanning.
    ///
    /// Sessions are owned by the caller and close when disconnected or dropped.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");
        self.stop_scanning().await
    }
}
