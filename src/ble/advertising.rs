//! Advertisement filtering.
//!
//! Frames advertise with a `InkP-` local name and carry their status beacon
//! in the manufacturer data. Anything else seen during a scan is noise and is
//! dropped without error.

use crate::ble::uuids::DEVICE_NAME_PREFIX;
use crate::error::Result;
use crate::protocol::status::{DeviceStatus, STATUS_LEN};

/// Size of the company identifier that prefixes a full beacon.
pub const COMPANY_ID_LEN: usize = 2;

/// Manufacturer payload size once the company identifier is stripped.
pub const MANUFACTURER_PAYLOAD_LEN: usize = STATUS_LEN - COMPANY_ID_LEN;

/// One advertisement as seen by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAdvertisement {
    /// Device address (or platform identifier).
    pub address: String,
    /// Advertised local name.
    pub name: Option<String>,
    /// Raw manufacturer data bytes, with or without the company identifier.
    pub manufacturer_data: Vec<u8>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// An advertisement that passed the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Device address (or platform identifier).
    pub address: String,
    /// Advertised local name.
    pub name: String,
    /// Company identifier, if the advertisement carried it inline.
    pub company_id: Option<u16>,
    /// Manufacturer payload without the company identifier.
    pub payload: [u8; MANUFACTURER_PAYLOAD_LEN],
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

impl DeviceCandidate {
    /// Decode the status beacon carried in the advertisement.
    pub fn status(&self) -> Result<DeviceStatus> {
        let mut beacon = [0u8; STATUS_LEN];
        beacon[..COMPANY_ID_LEN].copy_from_slice(&self.company_id.unwrap_or(0).to_le_bytes());
        beacon[COMPANY_ID_LEN..].copy_from_slice(&self.payload);
        Ok(DeviceStatus::decode(&beacon)?)
    }
}

/// Check whether a local name belongs to a frame.
pub fn is_device_name(name: &str) -> bool {
    name.starts_with(DEVICE_NAME_PREFIX)
}

/// Normalize manufacturer data to the 26-byte payload.
///
/// A 28-byte value still carries its company identifier and is stripped;
/// a 26-byte value (platforms that key manufacturer data by company id)
/// is taken as is.
fn split_manufacturer_data(data: &[u8]) -> Option<(Option<u16>, [u8; MANUFACTURER_PAYLOAD_LEN])> {
    let (company_id, rest) = match data.len() {
        STATUS_LEN => (
            Some(u16::from_le_bytes([data[0], data[1]])),
            &data[COMPANY_ID_LEN..],
        ),
        MANUFACTURER_PAYLOAD_LEN => (None, data),
        _ => return None,
    };

    let mut payload = [0u8; MANUFACTURER_PAYLOAD_LEN];
    payload.copy_from_slice(rest);
    Some((company_id, payload))
}

/// Filter one advertisement down to a candidate.
///
/// Returns `None` for advertisements that are not from a frame.
pub fn filter_advertisement(advertisement: &DeviceAdvertisement) -> Option<DeviceCandidate> {
    let name = advertisement.name.as_deref().filter(|n| is_device_name(n))?;
    let (company_id, payload) = split_manufacturer_data(&advertisement.manufacturer_data)?;

    Some(DeviceCandidate {
        address: advertisement.address.clone(),
        name: name.to_string(),
        company_id,
        payload,
        rssi: advertisement.rssi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status::{BeaconBuilder, FrameModel, StatusFlags};

    fn advertisement(name: &str, data: Vec<u8>) -> DeviceAdvertisement {
        DeviceAdvertisement {
            address: "D4:3B:04:11:22:33".to_string(),
            name: Some(name.to_string()),
            manufacturer_data: data,
            rssi: Some(-60),
        }
    }

    #[test]
    fn test_accepts_full_beacon() {
        let beacon = BeaconBuilder::new()
            .company_id(0x1234)
            .counter(12)
            .flags(StatusFlags::LAUNCHER_CMD_READY)
            .model("W3150")
            .build();
        let candidate = filter_advertisement(&advertisement("InkP-1234", beacon.to_vec())).unwrap();
        assert_eq!(candidate.name, "InkP-1234");
        assert_eq!(candidate.company_id, Some(0x1234));
        assert_eq!(&candidate.payload[..], &beacon[2..]);

        let status = candidate.status().unwrap();
        assert_eq!(status.freshness_counter, 12);
        assert_eq!(status.model, FrameModel::Frame31_5);
    }

    #[test]
    fn test_accepts_stripped_payload() {
        let beacon = BeaconBuilder::new().counter(3).build();
        let candidate = filter_advertisement(&advertisement("InkP-9", beacon[2..].to_vec())).unwrap();
        assert_eq!(candidate.company_id, None);
        assert_eq!(candidate.status().unwrap().freshness_counter, 3);
    }

    #[test]
    fn test_drops_other_names() {
        let beacon = BeaconBuilder::new().build().to_vec();
        assert!(filter_advertisement(&advertisement("OtherDevice", beacon.clone())).is_none());
        assert!(filter_advertisement(&advertisement("inkp-1234", beacon.clone())).is_none());

        let unnamed = DeviceAdvertisement {
            name: None,
            ..advertisement("InkP-1", beacon)
        };
        assert!(filter_advertisement(&unnamed).is_none());
    }

    #[test]
    fn test_drops_wrong_payload_length() {
        assert!(filter_advertisement(&advertisement("InkP-1234", vec![0u8; 20])).is_none());
        assert!(filter_advertisement(&advertisement("InkP-1234", vec![0u8; 27])).is_none());
        assert!(filter_advertisement(&advertisement("InkP-1234", Vec::new())).is_none());
    }
}
