//! Presence protocol constants and identity payload codec
//!
//! The wire payload is the UTF-8 encoding of the username. No length prefix,
//! no framing: the whole characteristic value is the payload.

use uuid::Uuid;

use crate::errors::{PresenceError, PresenceResult};
use crate::types::PeerIdentifier;

// ----------------------------------------------------------------------------
// Service and Characteristic UUIDs
// ----------------------------------------------------------------------------

/// App-wide peripheral identifier.
///
/// Reserved: nothing in this crate advertises, scans for or connects by it.
/// Advertising and scanning both use [`IDENTITY_SERVICE_UUID`]. It is
/// exported so other components of the same app can share the value.
pub const APP_PERIPHERAL_UUID: Uuid = Uuid::from_u128(0x5066D910_B842_46BD_B694_D94909CF0356);

/// The "user identity" service advertised by every peer
pub const IDENTITY_SERVICE_UUID: Uuid = Uuid::from_u128(0xB0804C45_31B1_4862_A173_CC794C09C332);

/// Readable characteristic holding the identity value
pub const IDENTITY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x76B48D0F_3ECD_4957_AA1C_DC52247CF0B6);

// ----------------------------------------------------------------------------
// Payload Codec
// ----------------------------------------------------------------------------

/// Encode a username as an identity characteristic value
pub fn encode_identity(username: &str) -> Vec<u8> {
    username.as_bytes().to_vec()
}

/// Decode an identity characteristic value read from `peer`
pub fn decode_identity(peer: &PeerIdentifier, value: &[u8]) -> PresenceResult<String> {
    String::from_utf8(value.to_vec()).map_err(|source| PresenceError::MalformedPayload {
        peer: peer.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_constants_match_app_identifiers() {
        assert_eq!(
            IDENTITY_SERVICE_UUID.to_string().to_uppercase(),
            "B0804C45-31B1-4862-A173-CC794C09C332"
        );
        assert_eq!(
            IDENTITY_CHARACTERISTIC_UUID.to_string().to_uppercase(),
            "76B48D0F-3ECD-4957-AA1C-DC52247CF0B6"
        );
        assert_eq!(
            APP_PERIPHERAL_UUID.to_string().to_uppercase(),
            "5066D910-B842-46BD-B694-D94909CF0356"
        );
    }

    #[test]
    fn test_identity_payload_is_raw_utf8() {
        let peer = PeerIdentifier::from("p1");
        let value = encode_identity("zoë");
        assert_eq!(value, "zoë".as_bytes());
        assert_eq!(decode_identity(&peer, &value).unwrap(), "zoë");
        assert_eq!(decode_identity(&peer, &[]).unwrap(), "");
    }

    #[test]
    fn test_malformed_payload_is_rejected() {
        let peer = PeerIdentifier::from("p1");
        let err = decode_identity(&peer, &[0x61, 0xFF, 0xFE]).unwrap_err();
        assert!(matches!(err, PresenceError::MalformedPayload { .. }));
        assert!(err.is_peer_local());
    }
}
