//! Status beacon decoding.
//!
//! Decodes the 28-byte record exposed by the status characteristic (and
//! carried in the manufacturer data of advertisements).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Size of a status beacon in bytes.
pub const STATUS_LEN: usize = 28;

/// The only status protocol version this crate understands.
pub const STATUS_VERSION: u8 = 1;

const MODEL_OFFSET: usize = 20;

/// Boolean status flags packed into the beacon's 32-bit bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    /// General error.
    pub const GENERAL_ERROR: u32 = 0x0000_0001;
    /// Battery low.
    pub const BATTERY_LOW: u32 = 0x0000_0002;
    /// Battery charging.
    pub const BATTERY_CHARGING: u32 = 0x0000_0004;
    /// Battery charging while low.
    pub const BATTERY_CHARGING_LOW: u32 = 0x0000_0008;
    /// Battery full.
    pub const BATTERY_FULL: u32 = 0x0000_0010;
    /// Per-device key is in effect.
    pub const SECURE_MODE: u32 = 0x0000_0040;
    /// User interaction required on the frame.
    pub const USER_INTERACTION_REQUIRED: u32 = 0x0000_0080;
    /// Wi-Fi connection error.
    pub const WIFI_CONNECTION_ERROR: u32 = 0x0000_0100;
    /// Wi-Fi link up.
    pub const WIFI_LINK_OK: u32 = 0x0000_0200;
    /// Server connection error.
    pub const SERVER_CONNECTION_ERROR: u32 = 0x0000_0400;
    /// Server socket link up.
    pub const SERVER_SOCKET_LINK_OK: u32 = 0x0000_0800;
    /// Content sync error.
    pub const SYNC_ERROR: u32 = 0x0000_1000;
    /// Firmware update failed.
    pub const FW_UPDATE_ERROR: u32 = 0x0000_2000;
    /// Firmware update downloaded and ready.
    pub const FW_UPDATE_READY: u32 = 0x0001_0000;
    /// Firmware launcher accepts commands.
    pub const LAUNCHER_CMD_READY: u32 = 0x0002_0000;
    /// Device clock synchronized.
    pub const DATETIME_SYNCED: u32 = 0x0004_0000;

    /// Raw bitmask value.
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Check whether every bit in `mask` is set.
    pub fn contains(&self, mask: u32) -> bool {
        self.0 & mask == mask
    }

    /// Check for the general error bit.
    pub fn general_error(&self) -> bool {
        self.contains(Self::GENERAL_ERROR)
    }

    /// Check if the battery is low.
    pub fn battery_low(&self) -> bool {
        self.contains(Self::BATTERY_LOW)
    }

    /// Check if the battery is charging.
    pub fn battery_charging(&self) -> bool {
        self.contains(Self::BATTERY_CHARGING)
    }

    /// Check if the battery is charging from a low level.
    pub fn battery_charging_low(&self) -> bool {
        self.contains(Self::BATTERY_CHARGING_LOW)
    }

    /// Check if the battery is full.
    pub fn battery_full(&self) -> bool {
        self.contains(Self::BATTERY_FULL)
    }

    /// Check if the device is in secure mode (per-device key active).
    pub fn secure_mode(&self) -> bool {
        self.contains(Self::SECURE_MODE)
    }

    /// Check if the frame is waiting for user interaction.
    pub fn user_interaction_required(&self) -> bool {
        self.contains(Self::USER_INTERACTION_REQUIRED)
    }

    /// Check for a Wi-Fi connection error.
    pub fn wifi_connection_error(&self) -> bool {
        self.contains(Self::WIFI_CONNECTION_ERROR)
    }

    /// Check if the Wi-Fi link is up.
    pub fn wifi_link_ok(&self) -> bool {
        self.contains(Self::WIFI_LINK_OK)
    }

    /// Check for a server connection error.
    pub fn server_connection_error(&self) -> bool {
        self.contains(Self::SERVER_CONNECTION_ERROR)
    }

    /// Check if the server socket link is up.
    pub fn server_socket_link_ok(&self) -> bool {
        self.contains(Self::SERVER_SOCKET_LINK_OK)
    }

    /// Check for a sync error.
    pub fn sync_error(&self) -> bool {
        self.contains(Self::SYNC_ERROR)
    }

    /// Check for a firmware update error.
    pub fn fw_update_error(&self) -> bool {
        self.contains(Self::FW_UPDATE_ERROR)
    }

    /// Check if a firmware update is ready to install.
    pub fn fw_update_ready(&self) -> bool {
        self.contains(Self::FW_UPDATE_READY)
    }

    /// Check if the firmware launcher accepts commands.
    pub fn launcher_cmd_ready(&self) -> bool {
        self.contains(Self::LAUNCHER_CMD_READY)
    }

    /// Check if the device clock is synchronized.
    pub fn datetime_synced(&self) -> bool {
        self.contains(Self::DATETIME_SYNCED)
    }
}

/// Firmware version, unpacked from a 32-bit field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FirmwareVersion {
    /// Major version (bits 31..24).
    pub major: u8,
    /// Minor version (bits 23..16).
    pub minor: u8,
    /// Build number (bits 15..0).
    pub build: u16,
}

impl FirmwareVersion {
    /// Unpack from the raw field.
    pub fn from_packed(packed: u32) -> Self {
        Self {
            major: (packed >> 24) as u8,
            minor: (packed >> 16) as u8,
            build: packed as u16,
        }
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// Frame hardware model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameModel {
    /// 13.3" Spectra panel.
    Frame13_3,
    /// 28.5" Sharp panel.
    Frame28_5,
    /// 31.5" Spectra panel.
    Frame31_5,
    /// A model string this crate does not recognise.
    Unknown(String),
}

impl FrameModel {
    /// Map the model identifier reported over BLE.
    pub fn from_model_str(model: &str) -> Self {
        match model {
            "W1330" | "Frame_13_3" => Self::Frame13_3,
            "W2850" | "Frame_28_5" => Self::Frame28_5,
            "W3150" | "Frame_31_5" => Self::Frame31_5,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Map the `modelAlias` reported by the cloud service.
    pub fn from_cloud_alias(alias: &str) -> Self {
        match alias {
            "spectra_13_3" => Self::Frame13_3,
            "sharp_28_5" => Self::Frame28_5,
            "spectra_31_5" => Self::Frame31_5,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Panel resolution as (width, height), if the model is known.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        match self {
            Self::Frame13_3 => Some((1200, 1600)),
            Self::Frame28_5 => Some((2160, 3060)),
            Self::Frame31_5 => Some((2560, 1440)),
            Self::Unknown(_) => None,
        }
    }

    /// Check if the model is recognised.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl std::fmt::Display for FrameModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame13_3 => write!(f, "Frame_13_3"),
            Self::Frame28_5 => write!(f, "Frame_28_5"),
            Self::Frame31_5 => write!(f, "Frame_31_5"),
            Self::Unknown(s) => write!(f, "unknown ({})", s),
        }
    }
}

/// A decoded status beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatus {
    /// Freshness counter. Advances each time the device executes a command.
    pub freshness_counter: u16,
    /// Status protocol version (always [`STATUS_VERSION`]).
    pub version: u8,
    /// Battery charge in percent.
    pub battery_percent: u8,
    /// Wi-Fi signal quality in percent.
    pub wifi_quality: u8,
    /// Generation index of the key the device currently uses.
    pub key_index: u8,
    /// Status flags.
    pub flags: StatusFlags,
    /// Number of queued jobs.
    pub jobs: u32,
    /// Firmware version.
    pub firmware: FirmwareVersion,
    /// Model identifier as reported, NUL padding removed.
    pub model_id: String,
    /// Hardware model derived from `model_id`.
    pub model: FrameModel,
}

impl DeviceStatus {
    /// Decode a status beacon.
    ///
    /// Layout (multi-byte integers little-endian):
    /// - Bytes 0-1: Company identifier (discarded)
    /// - Bytes 2-3: Freshness counter
    /// - Byte 4: Version (must be 1)
    /// - Byte 5: Battery percent
    /// - Byte 6: Wi-Fi quality percent
    /// - Byte 7: Active key index
    /// - Bytes 8-11: Flag bitmask
    /// - Bytes 12-15: Job queue depth
    /// - Bytes 16-19: Packed firmware version
    /// - Bytes 20-27: Model string, NUL padded
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != STATUS_LEN {
            return Err(DecodeError::Length {
                expected: STATUS_LEN,
                actual: data.len(),
            });
        }

        tracing::trace!("Decoding status beacon: {:02X?}", data);

        let version = data[4];
        if version != STATUS_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        let freshness_counter = u16::from_le_bytes([data[2], data[3]]);
        let flags = StatusFlags(u32::from_le_bytes([data[8], data[9], data[10], data[11]]));
        let jobs = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);
        let firmware =
            FirmwareVersion::from_packed(u32::from_le_bytes([data[16], data[17], data[18], data[19]]));

        let model_field = &data[MODEL_OFFSET..STATUS_LEN];
        let model_end = model_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(model_field.len());
        let model_id = std::str::from_utf8(&model_field[..model_end])
            .map_err(|_| DecodeError::MalformedModel)?
            .to_string();
        let model = FrameModel::from_model_str(&model_id);

        Ok(Self {
            freshness_counter,
            version,
            battery_percent: data[5],
            wifi_quality: data[6],
            key_index: data[7],
            flags,
            jobs,
            firmware,
            model_id,
            model,
        })
    }

    /// Check if the device is in secure mode.
    pub fn secure_mode(&self) -> bool {
        self.flags.secure_mode()
    }

    /// Check if the firmware launcher accepts commands.
    pub fn launcher_cmd_ready(&self) -> bool {
        self.flags.launcher_cmd_ready()
    }
}

/// Builder for raw beacons, used by tests and simulated devices.
#[derive(Debug, Clone)]
pub struct BeaconBuilder {
    bytes: [u8; STATUS_LEN],
}

impl BeaconBuilder {
    /// Start from a version-1 beacon with every other field zeroed.
    pub fn new() -> Self {
        let mut bytes = [0u8; STATUS_LEN];
        bytes[4] = STATUS_VERSION;
        Self { bytes }
    }

    /// Set the company identifier.
    pub fn company_id(mut self, id: u16) -> Self {
        self.bytes[0..2].copy_from_slice(&id.to_le_bytes());
        self
    }

    /// Set the freshness counter.
    pub fn counter(mut self, counter: u16) -> Self {
        self.bytes[2..4].copy_from_slice(&counter.to_le_bytes());
        self
    }

    /// Set the version byte.
    pub fn version(mut self, version: u8) -> Self {
        self.bytes[4] = version;
        self
    }

    /// Set battery and Wi-Fi percentages.
    pub fn levels(mut self, battery: u8, wifi: u8) -> Self {
        self.bytes[5] = battery;
        self.bytes[6] = wifi;
        self
    }

    /// Set the active key index.
    pub fn key_index(mut self, index: u8) -> Self {
        self.bytes[7] = index;
        self
    }

    /// Set the flag bitmask.
    pub fn flags(mut self, flags: u32) -> Self {
        self.bytes[8..12].copy_from_slice(&flags.to_le_bytes());
        self
    }

    /// Set the job queue depth.
    pub fn jobs(mut self, jobs: u32) -> Self {
        self.bytes[12..16].copy_from_slice(&jobs.to_le_bytes());
        self
    }

    /// Set the firmware version.
    pub fn firmware(mut self, major: u8, minor: u8, build: u16) -> Self {
        let packed = (major as u32) << 24 | (minor as u32) << 16 | build as u32;
        self.bytes[16..20].copy_from_slice(&packed.to_le_bytes());
        self
    }

    /// Set the model string. Truncated to 8 bytes, NUL padded.
    pub fn model(mut self, model: &str) -> Self {
        let field = &mut self.bytes[MODEL_OFFSET..STATUS_LEN];
        field.fill(0);
        let raw = model.as_bytes();
        let n = raw.len().min(field.len());
        field[..n].copy_from_slice(&raw[..n]);
        self
    }

    /// Finish the beacon.
    pub fn build(self) -> [u8; STATUS_LEN] {
        self.bytes
    }
}

impl Default for BeaconBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_decode_full_beacon() {
        let raw = BeaconBuilder::new()
            .company_id(0x0A1B)
            .counter(0x0107)
            .levels(87, 64)
            .key_index(3)
            .flags(StatusFlags::SECURE_MODE | StatusFlags::LAUNCHER_CMD_READY)
            .jobs(2)
            .firmware(1, 4, 0x0203)
            .model("W3150")
            .build();

        let status = DeviceStatus::decode(&raw).unwrap();
        assert_eq!(status.freshness_counter, 0x0107);
        assert_eq!(status.version, 1);
        assert_eq!(status.battery_percent, 87);
        assert_eq!(status.wifi_quality, 64);
        assert_eq!(status.key_index, 3);
        assert!(status.secure_mode());
        assert!(status.launcher_cmd_ready());
        assert!(!status.flags.battery_low());
        assert_eq!(status.jobs, 2);
        assert_eq!(
            status.firmware,
            FirmwareVersion {
                major: 1,
                minor: 4,
                build: 0x0203
            }
        );
        assert_eq!(status.firmware.to_string(), "1.4.515");
        assert_eq!(status.model_id, "W3150");
        assert_eq!(status.model, FrameModel::Frame31_5);
        assert_eq!(status.model.resolution(), Some((2560, 1440)));
    }

    #[test]
    fn test_decode_hand_written_bytes() {
        let raw: [u8; 28] = [
            0xFF, 0xFF, // company id
            0x07, 0x00, // counter
            0x01, // version
            0x32, 0x50, 0x01, // battery, wifi, key index
            0x40, 0x00, 0x02, 0x00, // flags: secure + launcher ready
            0x00, 0x00, 0x00, 0x00, // jobs
            0x2A, 0x00, 0x03, 0x02, // firmware 2.3.42
            b'W', b'1', b'3', b'3', b'0', 0, 0, 0,
        ];
        let status = DeviceStatus::decode(&raw).unwrap();
        assert_eq!(status.freshness_counter, 7);
        assert_eq!(status.battery_percent, 50);
        assert_eq!(status.wifi_quality, 80);
        assert_eq!(status.flags.bits(), 0x0002_0040);
        assert_eq!(status.firmware.to_string(), "2.3.42");
        assert_eq!(status.model, FrameModel::Frame13_3);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let raw = BeaconBuilder::new().build();
        assert_eq!(
            DeviceStatus::decode(&raw[..27]),
            Err(DecodeError::Length {
                expected: 28,
                actual: 27
            })
        );

        let mut long = raw.to_vec();
        long.push(0);
        assert!(matches!(
            DeviceStatus::decode(&long),
            Err(DecodeError::Length { actual: 29, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_version() {
        let raw = BeaconBuilder::new().version(2).build();
        assert_eq!(
            DeviceStatus::decode(&raw),
            Err(DecodeError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn test_decode_rejects_malformed_model() {
        let mut raw = BeaconBuilder::new().model("W31").build();
        raw[23] = 0xC3; // truncated two-byte sequence
        assert_eq!(DeviceStatus::decode(&raw), Err(DecodeError::MalformedModel));
    }

    #[test]
    fn test_model_without_padding() {
        let raw = BeaconBuilder::new().model("ABCDEFGH").build();
        let status = DeviceStatus::decode(&raw).unwrap();
        assert_eq!(status.model_id, "ABCDEFGH");
    }

    #[test]
    fn test_unknown_model() {
        let raw = BeaconBuilder::new().model("X9999").build();
        let status = DeviceStatus::decode(&raw).unwrap();
        assert_eq!(status.model, FrameModel::Unknown("X9999".to_string()));
        assert!(!status.model.is_known());
        assert_eq!(status.model.resolution(), None);
    }

    #[test]
    fn test_model_mapping() {
        assert_eq!(FrameModel::from_model_str("W1330"), FrameModel::Frame13_3);
        assert_eq!(FrameModel::from_model_str("Frame_28_5"), FrameModel::Frame28_5);
        assert_eq!(FrameModel::from_model_str("W3150"), FrameModel::Frame31_5);
        assert_eq!(FrameModel::from_cloud_alias("sharp_28_5"), FrameModel::Frame28_5);
        assert_eq!(FrameModel::Frame28_5.resolution(), Some((2160, 3060)));
        assert_eq!(FrameModel::Frame13_3.to_string(), "Frame_13_3");
    }

    #[test]
    fn test_flags() {
        let flags = StatusFlags(
            StatusFlags::BATTERY_CHARGING
                | StatusFlags::WIFI_LINK_OK
                | StatusFlags::FW_UPDATE_READY
                | StatusFlags::DATETIME_SYNCED,
        );
        assert!(flags.battery_charging());
        assert!(flags.wifi_link_ok());
        assert!(flags.fw_update_ready());
        assert!(flags.datetime_synced());
        assert!(!flags.secure_mode());
        assert!(!flags.launcher_cmd_ready());
        assert!(!flags.general_error());
        assert!(!flags.server_socket_link_ok());
    }

    proptest! {
        #[test]
        fn prop_decode_total_for_valid_beacons(
            mut raw in proptest::array::uniform28(any::<u8>()),
            model in "[A-Za-z0-9_]{0,8}",
        ) {
            raw[4] = STATUS_VERSION;
            raw[MODEL_OFFSET..].fill(0);
            raw[MODEL_OFFSET..MODEL_OFFSET + model.len()].copy_from_slice(model.as_bytes());

            let first = DeviceStatus::decode(&raw).unwrap();
            let second = DeviceStatus::decode(&raw).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.freshness_counter, u16::from_le_bytes([raw[2], raw[3]]));
            prop_assert_eq!(first.model_id, model);
        }

        #[test]
        fn prop_decode_rejects_other_lengths(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(data.len() != STATUS_LEN);
            let is_length_error = matches!(
                DeviceStatus::decode(&data),
                Err(DecodeError::Length { .. })
            );
            prop_assert!(is_length_error);
        }
    }
}
