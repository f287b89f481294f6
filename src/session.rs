//! Device session.
//!
//! A [`ConnectionSession`] owns one connection to one frame: it connects,
//! reads and decodes status, tracks the active key, and delivers commands.
//!
//! Command delivery is a small state machine:
//!
//! ```text
//! Disconnected -> Connecting -> StatusRead -> Ready ----------------------> Sending
//!                                          \-> NotReady -> RetryWait (3s)
//!                                                -> ReconnectWait (1s) -> Connecting -> StatusRead
//!                                                     -> Ready -> Sending
//!                                                     -> NotReady -> Failed
//! ```
//!
//! The reconnect escalation runs at most once per command. A frame that is
//! not ready, or that is addressed with the wrong key, still acknowledges
//! the radio write; the only evidence that a command ran is the freshness
//! counter advancing, which is what [`SendOutcome`] reports.

use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ble::connection::{SessionEvent, SessionState};
use crate::ble::transport::{BleConnection, BleLink, NotificationStream, WriteMode};
use crate::ble::uuids::{COMMAND_CHARACTERISTIC_UUID, STATUS_CHARACTERISTIC_UUID};
use crate::config::SessionConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::command::Command;
use crate::protocol::keys::{ActiveKey, KeyManager};
use crate::protocol::readiness::Readiness;
use crate::protocol::status::DeviceStatus;

/// Wait before dropping the link of a device that is not ready.
pub const NOT_READY_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Wait between dropping the link and reconnecting.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// What is known about a command after it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendOutcome {
    /// The freshness counter advanced after the write: the device executed a command.
    Confirmed {
        /// Counter the frame was authenticated with.
        counter_before: u16,
        /// Counter read after the write.
        counter_after: u16,
    },
    /// The write was acknowledged but the counter did not advance. The
    /// device most likely ignored the frame.
    Unconfirmed {
        /// Counter the frame was authenticated with.
        counter: u16,
    },
    /// The write was acknowledged; whether the device executed it is unknown,
    /// either because no check was requested or because the check failed.
    Delivered {
        /// Counter the frame was authenticated with.
        counter: u16,
    },
}

impl SendOutcome {
    /// Check if the command is known to have taken effect.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    /// Counter the frame was authenticated with.
    pub fn counter(&self) -> u16 {
        match *self {
            Self::Confirmed { counter_before, .. } => counter_before,
            Self::Unconfirmed { counter } | Self::Delivered { counter } => counter,
        }
    }
}

/// Cancels a session at its next state boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    duration: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| Error::Timeout { operation })?
}

/// A session with one InkPoster frame.
///
/// All radio operations take `&mut self`, so a session never has more than
/// one operation in flight. Sessions to different frames share nothing and
/// can run in parallel.
pub struct ConnectionSession {
    address: String,
    link: Arc<dyn BleLink>,
    config: SessionConfig,
    keys: KeyManager,
    state: SessionState,
    connection: Option<Box<dyn BleConnection>>,
    status: Option<DeviceStatus>,
    status_read_at: Option<DateTime<Utc>>,
    active_key: ActiveKey,
    updates: Option<NotificationStream>,
    event_tx: broadcast::Sender<SessionEvent>,
    cancel: CancelHandle,
}

impl ConnectionSession {
    /// Create a session for the device at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyFormat`] if the configured device key is
    /// not valid hex. No radio activity happens before this check.
    pub fn new(
        link: Arc<dyn BleLink>,
        address: impl Into<String>,
        config: SessionConfig,
    ) -> Result<Self> {
        let keys = KeyManager::from_config(&config)?;
        let (event_tx, _) = broadcast::channel(32);

        Ok(Self {
            address: address.into(),
            link,
            config,
            keys,
            state: SessionState::Disconnected,
            connection: None,
            status: None,
            status_read_at: None,
            active_key: ActiveKey::Default,
            updates: None,
            event_tx,
            cancel: CancelHandle::default(),
        })
    }

    /// Device address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Most recently decoded status, if any.
    pub fn status(&self) -> Option<&DeviceStatus> {
        self.status.as_ref()
    }

    /// When the current status was read.
    pub fn status_read_at(&self) -> Option<DateTime<Utc>> {
        self.status_read_at
    }

    /// Key that the next command will be authenticated with.
    pub fn active_key(&self) -> &ActiveKey {
        &self.active_key
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Handle for cancelling this session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Connect if needed and read a fresh status.
    pub async fn connect(&mut self) -> Result<&DeviceStatus> {
        self.check_cancelled().await?;

        if self.connection.is_none() {
            self.open().await?;
        }

        self.refresh_status().await
    }

    /// Read and decode the status characteristic.
    ///
    /// Re-derives the active key and readiness. Any failure closes the link
    /// and leaves the session [`SessionState::Failed`].
    pub async fn refresh_status(&mut self) -> Result<&DeviceStatus> {
        self.check_cancelled().await?;

        if self.connection.is_none() {
            return Err(Error::NotConnected);
        }

        self.set_state(SessionState::StatusRead);

        let read = match self.connection.as_deref() {
            Some(conn) => {
                with_timeout(
                    "status read",
                    self.config.operation_timeout,
                    conn.read(&STATUS_CHARACTERISTIC_UUID),
                )
                .await
            }
            None => Err(Error::NotConnected),
        };

        let decoded = read.and_then(|raw| Ok(DeviceStatus::decode(&raw)?));
        match decoded {
            Ok(status) => Ok(self.apply_status(status)),
            Err(e) => {
                warn!("Status read from {} failed: {}", self.address, e);
                self.fail().await;
                Err(e)
            }
        }
    }

    /// Wait for the next status notification.
    ///
    /// Requires `live_updates`. Returns `Ok(None)` once the notification
    /// stream ends.
    pub async fn next_update(&mut self) -> Result<Option<&DeviceStatus>> {
        self.check_cancelled().await?;

        let raw = match self.updates.as_mut() {
            Some(updates) => updates.next().await,
            None => {
                return Err(Error::InvalidParameter {
                    name: "live_updates".to_string(),
                    value: "false".to_string(),
                })
            }
        };

        let Some(raw) = raw else {
            debug!("Status notifications from {} ended", self.address);
            self.updates = None;
            return Ok(None);
        };

        let status = DeviceStatus::decode(&raw)?;
        Ok(Some(self.apply_status(status)))
    }

    /// Deliver a command.
    ///
    /// Reads a fresh status first so the frame carries the current freshness
    /// counter. If the device is not ready, runs the reconnect escalation
    /// once; if it is still not ready, fails with [`Error::DeviceNotReady`].
    pub async fn send(&mut self, command: &Command) -> Result<SendOutcome> {
        // Surface payload problems before touching the radio.
        command.to_payload()?;

        info!("Sending {} to {}", command, self.address);

        self.connect().await?;

        let mut escalated = false;
        loop {
            self.check_cancelled().await?;

            match self.state {
                SessionState::Ready => return self.deliver(command).await,
                SessionState::NotReady if escalated => {
                    warn!("{} still not ready after reconnecting", self.address);
                    self.fail().await;
                    return Err(Error::DeviceNotReady {
                        address: self.address.clone(),
                    });
                }
                SessionState::NotReady => {
                    escalated = true;
                    self.escalate().await?;
                }
                _ => {
                    self.connect().await?;
                }
            }
        }
    }

    /// Close the connection.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.updates = None;

        let result = match self.connection.take() {
            Some(conn) => {
                with_timeout(
                    "disconnect",
                    self.config.operation_timeout,
                    conn.disconnect(),
                )
                .await
            }
            None => Ok(()),
        };

        self.set_state(SessionState::Disconnected);
        result
    }

    /// Connect, negotiate the transmission unit, and locate characteristics.
    async fn open(&mut self) -> Result<()> {
        self.set_state(SessionState::Connecting);

        let deadline = Instant::now() + self.config.connect_timeout;

        let connection = match tokio::time::timeout_at(deadline, self.link.connect(&self.address)).await
        {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                warn!("Connection to {} failed: {}", self.address, e);
                self.set_state(SessionState::Failed);
                return Err(e);
            }
            Err(_) => {
                warn!("Connection to {} timed out", self.address);
                self.set_state(SessionState::Failed);
                return Err(Error::Timeout {
                    operation: "connect",
                });
            }
        };
        self.connection = Some(connection);

        let setup = match self.connection.as_deref() {
            Some(conn) => tokio::time::timeout_at(deadline, self.prepare(conn))
                .await
                .unwrap_or(Err(Error::Timeout {
                    operation: "service discovery",
                })),
            None => Err(Error::NotConnected),
        };

        match setup {
            Ok(updates) => self.updates = updates,
            Err(e) => {
                warn!("Setting up {} failed: {}", self.address, e);
                self.fail().await;
                return Err(e);
            }
        }

        info!("Connected to {}", self.address);
        Ok(())
    }

    async fn prepare(&self, conn: &dyn BleConnection) -> Result<Option<NotificationStream>> {
        match conn.negotiate_mtu(self.config.target_mtu).await {
            Ok(Some(mtu)) => debug!("Negotiated transmission unit {}", mtu),
            Ok(None) => {}
            Err(e) => warn!("Transmission unit negotiation failed: {}", e),
        }

        conn.discover_services().await?;

        for uuid in [STATUS_CHARACTERISTIC_UUID, COMMAND_CHARACTERISTIC_UUID] {
            if !conn.has_characteristic(&uuid) {
                return Err(Error::CharacteristicNotFound {
                    uuid: uuid.to_string(),
                });
            }
        }

        if !self.config.live_updates {
            return Ok(None);
        }

        let updates = conn.subscribe(&STATUS_CHARACTERISTIC_UUID).await?;
        debug!("Subscribed to status notifications from {}", self.address);
        Ok(Some(updates))
    }

    /// Drop the link of a not-ready device and reconnect once.
    async fn escalate(&mut self) -> Result<()> {
        info!(
            "{} not ready for commands; reconnecting in {:?}",
            self.address,
            NOT_READY_SETTLE_DELAY + RECONNECT_DELAY
        );

        self.set_state(SessionState::RetryWait);
        tokio::time::sleep(NOT_READY_SETTLE_DELAY).await;
        self.check_cancelled().await?;

        self.close_connection().await;
        self.set_state(SessionState::ReconnectWait);
        tokio::time::sleep(RECONNECT_DELAY).await;
        self.check_cancelled().await?;

        self.connect().await?;
        Ok(())
    }

    /// Frame and write a command to a ready device.
    async fn deliver(&mut self, command: &Command) -> Result<SendOutcome> {
        let counter = self
            .status
            .as_ref()
            .map(|s| s.freshness_counter)
            .ok_or(Error::NotConnected)?;
        let frame = command.to_frame(counter, &self.active_key)?;

        self.set_state(SessionState::Sending);

        // Write requests only: unacknowledged writes are dropped by some stacks.
        let written = match self.connection.as_deref() {
            Some(conn) => {
                with_timeout(
                    "command write",
                    self.config.operation_timeout,
                    conn.write(&COMMAND_CHARACTERISTIC_UUID, frame.as_bytes(), WriteMode::WithResponse),
                )
                .await
            }
            None => Err(Error::NotConnected),
        };

        if let Err(e) = written {
            warn!("Writing {} to {} failed: {}", command, self.address, e);
            self.fail().await;
            return Err(e);
        }

        debug!(
            "Wrote {} ({} bytes) with counter {}",
            command,
            frame.len(),
            counter
        );

        if !self.config.confirm_delivery {
            self.set_state(SessionState::Ready);
            return Ok(SendOutcome::Delivered { counter });
        }

        tokio::time::sleep(self.config.confirm_delay).await;

        let reread = self.refresh_status().await.map(|s| s.freshness_counter);
        match reread {
            Ok(counter_after) if counter_after != counter => {
                info!("{} confirmed by {} ({} -> {})", command, self.address, counter, counter_after);
                Ok(SendOutcome::Confirmed {
                    counter_before: counter,
                    counter_after,
                })
            }
            Ok(_) => {
                warn!(
                    "{} written to {} but counter stayed at {}; command was likely ignored",
                    command, self.address, counter
                );
                Ok(SendOutcome::Unconfirmed { counter })
            }
            Err(e) if command.restarts_device() && e.kind() == ErrorKind::Transport => {
                debug!("{} dropped the link after {}: {}", self.address, command, e);
                self.set_state(SessionState::Disconnected);
                Ok(SendOutcome::Delivered { counter })
            }
            // The frame was written; a failed check leaves its effect unknown.
            Err(e) if e.kind() == ErrorKind::Transport => {
                warn!(
                    "{} written to {} but the confirming status read failed: {}",
                    command, self.address, e
                );
                Ok(SendOutcome::Delivered { counter })
            }
            Err(e) => Err(e),
        }
    }

    fn apply_status(&mut self, status: DeviceStatus) -> &DeviceStatus {
        let key = self.keys.resolve_for(status.secure_mode(), status.key_index);
        if key != self.active_key {
            debug!(
                "Active key for {} is now the {} key",
                self.address,
                if key.is_default() { "default" } else { "device" }
            );
        }
        self.active_key = key;

        let readiness = Readiness::of(&status);
        debug!(
            "Status from {}: counter={}, model={}, firmware={}, battery={}%, ready={}",
            self.address,
            status.freshness_counter,
            status.model,
            status.firmware,
            status.battery_percent,
            readiness.is_ready()
        );

        self.status_read_at = Some(Utc::now());
        self.set_state(match readiness {
            Readiness::Ready => SessionState::Ready,
            Readiness::NotReady => SessionState::NotReady,
        });

        self.status.insert(status)
    }

    async fn check_cancelled(&mut self) -> Result<()> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }

        info!("Session with {} cancelled", self.address);
        self.close_connection().await;
        self.set_state(SessionState::Disconnected);
        Err(Error::Cancelled)
    }

    async fn fail(&mut self) {
        self.close_connection().await;
        self.set_state(SessionState::Failed);
    }

    async fn close_connection(&mut self) {
        self.updates = None;

        if let Some(conn) = self.connection.take() {
            let closed = with_timeout(
                "disconnect",
                self.config.operation_timeout,
                conn.disconnect(),
            )
            .await;
            if let Err(e) = closed {
                warn!("Error disconnecting from {}: {}", self.address, e);
            }
        }
    }

    /// Update the session state and emit an event.
    fn set_state(&mut self, new_state: SessionState) {
        let old_state = std::mem::replace(&mut self.state, new_state);

        if old_state != new_state {
            debug!("Session {} state: {} -> {}", self.address, old_state, new_state);

            let _ = self.event_tx.send(SessionEvent {
                address: self.address.clone(),
                state: new_state,
            });
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let address = self.address.clone();
                handle.spawn(async move {
                    if let Err(e) = conn.disconnect().await {
                        warn!("Error disconnecting from {} on drop: {}", address, e);
                    }
                });
            }
            Err(_) => warn!("Session with {} dropped outside a runtime while connected", self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::transport::{MockBleConnection, MockBleLink};
    use crate::protocol::frame::verify_frame;
    use crate::protocol::status::{BeaconBuilder, StatusFlags};
    use pretty_assertions::assert_eq;

    const ADDRESS: &str = "D4:3B:04:00:00:01";

    fn ready_beacon(counter: u16) -> Vec<u8> {
        BeaconBuilder::new()
            .counter(counter)
            .flags(StatusFlags::LAUNCHER_CMD_READY)
            .model("W1330")
            .build()
            .to_vec()
    }

    fn connection_with_reads(counters: Vec<u16>) -> MockBleConnection {
        let mut conn = MockBleConnection::new();
        conn.expect_negotiate_mtu().returning(|target| Ok(Some(target)));
        conn.expect_discover_services().returning(|| Ok(()));
        conn.expect_has_characteristic().return_const(true);

        let mut reads = counters.into_iter();
        conn.expect_read()
            .withf(|uuid| *uuid == STATUS_CHARACTERISTIC_UUID)
            .returning(move |_| Ok(ready_beacon(reads.next().unwrap_or(0))));
        conn
    }

    fn link_returning(conn: MockBleConnection) -> Arc<dyn BleLink> {
        let mut link = MockBleLink::new();
        link.expect_connect()
            .withf(|address| address == ADDRESS)
            .times(1)
            .return_once(move |_| Ok(Box::new(conn) as Box<dyn BleConnection>));
        Arc::new(link)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_writes_with_response() {
        let mut conn = connection_with_reads(vec![5, 6]);
        conn.expect_write()
            .withf(|uuid, data, mode| {
                *uuid == COMMAND_CHARACTERISTIC_UUID
                    && *mode == WriteMode::WithResponse
                    && verify_frame(data, 5, &ActiveKey::Default)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        conn.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session =
            ConnectionSession::new(link_returning(conn), ADDRESS, SessionConfig::default()).unwrap();

        let outcome = session.send(&Command::Fetch).await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Confirmed {
                counter_before: 5,
                counter_after: 6
            }
        );
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.status().map(|s| s.freshness_counter), Some(6));

        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_counter_is_unconfirmed() {
        let mut conn = connection_with_reads(vec![9, 9]);
        conn.expect_write().times(1).returning(|_, _, _| Ok(()));
        conn.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session =
            ConnectionSession::new(link_returning(conn), ADDRESS, SessionConfig::default()).unwrap();

        let outcome = session.send(&Command::GhostingCleaner).await.unwrap();
        assert_eq!(outcome, SendOutcome::Unconfirmed { counter: 9 });
        assert!(!outcome.is_confirmed());

        session.disconnect().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivered_without_confirmation() {
        let mut conn = connection_with_reads(vec![2]);
        conn.expect_write().times(1).returning(|_, _, _| Ok(()));
        conn.expect_disconnect().times(1).returning(|| Ok(()));

        let config = SessionConfig::default().with_confirm_delivery(false);
        let mut session = ConnectionSession::new(link_returning(conn), ADDRESS, config).unwrap();

        let outcome = session.send(&Command::Hello).await.unwrap();
        assert_eq!(outcome, SendOutcome::Delivered { counter: 2 });
        assert_eq!(outcome.counter(), 2);

        session.disconnect().await.unwrap();
    }

    #[test]
    fn test_invalid_key_rejected_before_connect() {
        let mut link = MockBleLink::new();
        link.expect_connect().never();

        let config = SessionConfig::default().with_device_key("not-hex");
        let err = ConnectionSession::new(Arc::new(link), ADDRESS, config)
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_missing_command_characteristic_fails_session() {
        let mut conn = MockBleConnection::new();
        conn.expect_negotiate_mtu().returning(|_| Ok(None));
        conn.expect_discover_services().returning(|| Ok(()));
        conn.expect_has_characteristic()
            .returning(|uuid| *uuid == STATUS_CHARACTERISTIC_UUID);
        conn.expect_read().never();
        conn.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session =
            ConnectionSession::new(link_returning(conn), ADDRESS, SessionConfig::default()).unwrap();

        let err = session.connect().await.err().unwrap();
        assert!(matches!(err, Error::CharacteristicNotFound { .. }));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_decode_error_is_surfaced() {
        let mut conn = MockBleConnection::new();
        conn.expect_negotiate_mtu().returning(|_| Ok(None));
        conn.expect_discover_services().returning(|| Ok(()));
        conn.expect_has_characteristic().return_const(true);
        conn.expect_read().times(1).returning(|_| Ok(vec![0u8; 20]));
        conn.expect_disconnect().times(1).returning(|| Ok(()));

        let mut session =
            ConnectionSession::new(link_returning(conn), ADDRESS, SessionConfig::default()).unwrap();

        let err = session.connect().await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Decode);
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.status().is_none());
    }

    #[test]
    fn test_cancel_handle_shared() {
        let handle = CancelHandle::default();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
