//! Authenticated command framing.
//!
//! Wire format: `kind(1) + payload(N) + mac(4)`, where `mac` is the first
//! four bytes of `HMAC-SHA256(key, counter_le16 + kind + payload)`.
//!
//! The freshness counter is authenticated but never transmitted; the frame
//! checks the mac against its own current counter.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::protocol::keys::ActiveKey;

type HmacSha256 = Hmac<Sha256>;

/// Frame kind for JSON command payloads.
pub const FRAME_KIND_JSON: u8 = 0x01;

/// Length of the truncated authenticator.
pub const MAC_LEN: usize = 4;

/// An authenticated command frame, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    bytes: Vec<u8>,
}

impl CommandFrame {
    /// Frame kind byte.
    pub fn kind(&self) -> u8 {
        self.bytes[0]
    }

    /// Payload carried by the frame.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[1..self.bytes.len() - MAC_LEN]
    }

    /// Truncated authenticator.
    pub fn authenticator(&self) -> [u8; MAC_LEN] {
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&self.bytes[self.bytes.len() - MAC_LEN..]);
        mac
    }

    /// Wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning its wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total length on the wire.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a frame carries at least a kind byte and a mac.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn keyed_mac(key: &[u8], counter: u16, kind_and_payload: &[u8]) -> HmacSha256 {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
    mac.update(&counter.to_le_bytes());
    mac.update(kind_and_payload);
    mac
}

/// Build an authenticated frame.
///
/// Pure: identical arguments always produce identical bytes.
pub fn build_frame(kind: u8, payload: &[u8], counter: u16, key: &ActiveKey) -> CommandFrame {
    let mut bytes = Vec::with_capacity(1 + payload.len() + MAC_LEN);
    bytes.push(kind);
    bytes.extend_from_slice(payload);

    let digest = keyed_mac(key.as_bytes(), counter, &bytes)
        .finalize()
        .into_bytes();
    bytes.extend_from_slice(&digest[..MAC_LEN]);

    CommandFrame { bytes }
}

/// Check a received frame against a counter and key, as the device does.
///
/// Returns `false` for frames too short to carry a kind byte and a mac.
pub fn verify_frame(frame: &[u8], counter: u16, key: &ActiveKey) -> bool {
    if frame.len() < 1 + MAC_LEN {
        return false;
    }
    let (body, mac) = frame.split_at(frame.len() - MAC_LEN);
    keyed_mac(key.as_bytes(), counter, body)
        .verify_truncated_left(mac)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::keys::DeviceKey;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn device_key() -> ActiveKey {
        ActiveKey::Device(DeviceKey::from_hex("00112233445566778899aabbccddeeff").unwrap())
    }

    #[test]
    fn test_known_vector_default_key() {
        let frame = build_frame(FRAME_KIND_JSON, br#"{"action":3}"#, 0x0007, &ActiveKey::Default);

        let mut expected = vec![0x01];
        expected.extend_from_slice(br#"{"action":3}"#);
        expected.extend_from_slice(&[0xa4, 0xec, 0x6e, 0x88]);

        assert_eq!(frame.as_bytes(), expected.as_slice());
        assert_eq!(frame.authenticator(), [0xa4, 0xec, 0x6e, 0x88]);
        assert_eq!(frame.kind(), FRAME_KIND_JSON);
        assert_eq!(frame.payload(), br#"{"action":3}"#);
        assert_eq!(frame.len(), 17);
    }

    #[test]
    fn test_known_vector_fetch() {
        let frame = build_frame(FRAME_KIND_JSON, br#"{"action":42}"#, 0, &ActiveKey::Default);
        assert_eq!(frame.authenticator(), [0x63, 0x19, 0x14, 0xd0]);
    }

    #[test]
    fn test_known_vector_device_key() {
        let frame = build_frame(FRAME_KIND_JSON, br#"{"action":3}"#, 7, &device_key());
        assert_eq!(frame.authenticator(), [0x9f, 0xee, 0x80, 0x2d]);
    }

    #[test]
    fn test_counter_not_on_wire() {
        let a = build_frame(FRAME_KIND_JSON, b"{}", 1, &ActiveKey::Default);
        let b = build_frame(FRAME_KIND_JSON, b"{}", 2, &ActiveKey::Default);
        assert_eq!(a.len(), b.len());
        assert_eq!(a.payload(), b.payload());
        assert_ne!(a.authenticator(), b.authenticator());
    }

    #[test]
    fn test_verify_frame() {
        let frame = build_frame(FRAME_KIND_JSON, br#"{"action":42}"#, 9, &device_key());
        assert!(verify_frame(frame.as_bytes(), 9, &device_key()));
        assert!(!verify_frame(frame.as_bytes(), 10, &device_key()));
        assert!(!verify_frame(frame.as_bytes(), 9, &ActiveKey::Default));
        assert!(!verify_frame(&[0x01, 0x02], 9, &device_key()));
    }

    proptest! {
        #[test]
        fn prop_build_is_deterministic(
            payload in proptest::collection::vec(any::<u8>(), 0..128),
            counter in any::<u16>(),
        ) {
            let a = build_frame(FRAME_KIND_JSON, &payload, counter, &device_key());
            let b = build_frame(FRAME_KIND_JSON, &payload, counter, &device_key());
            prop_assert_eq!(&a, &b);
            prop_assert!(verify_frame(a.as_bytes(), counter, &device_key()));
        }

        #[test]
        fn prop_single_change_alters_mac(
            payload in proptest::collection::vec(any::<u8>(), 1..128),
            counter in any::<u16>(),
            index in any::<proptest::sample::Index>(),
        ) {
            let base = build_frame(FRAME_KIND_JSON, &payload, counter, &device_key());

            let other_counter = build_frame(FRAME_KIND_JSON, &payload, counter.wrapping_add(1), &device_key());
            prop_assert_ne!(base.authenticator(), other_counter.authenticator());

            let other_key = build_frame(FRAME_KIND_JSON, &payload, counter, &ActiveKey::Default);
            prop_assert_ne!(base.authenticator(), other_key.authenticator());

            let mut flipped = payload.clone();
            let i = index.index(flipped.len());
            flipped[i] ^= 0x01;
            let other_payload = build_frame(FRAME_KIND_JSON, &flipped, counter, &device_key());
            prop_assert_ne!(base.authenticator(), other_payload.authenticator());
        }
    }
}
