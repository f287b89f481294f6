//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for InkPoster frame communication.
//! These must match the frame firmware exactly.

use uuid::Uuid;

// InkPoster control service (custom)
/// Primary control service UUID.
pub const INKPOSTER_SERVICE_UUID: Uuid = Uuid::from_u128(0x7062_18ee_d3d6_46ad_8080_6eefbacf7dbc);
/// Status characteristic UUID (Read, Notify). Carries the 28-byte status beacon.
pub const STATUS_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xaa5a_52bb_e560_42b5_be83_7b79f7627f6d);
/// Command characteristic UUID (Write). Receives authenticated command frames.
pub const COMMAND_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x1b5f_2d1a_8ff5_459e_a8de_73e13c051a13);

/// Standard Client Characteristic Configuration Descriptor UUID.
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Advertised local name prefix of InkPoster frames.
pub const DEVICE_NAME_PREFIX: &str = "InkP-";

/// Check if a service UUID is the InkPoster control service.
pub fn is_inkposter_service(uuid: &Uuid) -> bool {
    *uuid == INKPOSTER_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            INKPOSTER_SERVICE_UUID.to_string(),
            "706218ee-d3d6-46ad-8080-6eefbacf7dbc"
        );
        assert_eq!(
            STATUS_CHARACTERISTIC_UUID.to_string(),
            "aa5a52bb-e560-42b5-be83-7b79f7627f6d"
        );
        assert_eq!(
            COMMAND_CHARACTERISTIC_UUID.to_string(),
            "1b5f2d1a-8ff5-459e-a8de-73e13c051a13"
        );
        assert_eq!(CCCD_UUID.to_string(), "00002902-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn test_is_inkposter_service() {
        assert!(is_inkposter_service(&INKPOSTER_SERVICE_UUID));
        assert!(!is_inkposter_service(&STATUS_CHARACTERISTIC_UUID));
    }
}
