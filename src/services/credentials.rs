//! Credential derivation module
//!
//! Pure functions that derive the identifiers and keys the access protocol
//! exchanges: pairing nonces, radio handshake keys, tap credential UIDs,
//! session ids, and entity ids. Vehicle firmware derives the same values
//! independently, so the formulas here are wire contracts. Changing any of
//! them strands every provisioned vehicle.
//!
//! All hex output is uppercase. All hashes are SHA-256 over the UTF-8
//! concatenation of the inputs, truncated from the front.

use chrono::{DateTime, Utc};
use data_encoding::HEXUPPER;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Session id prefix for short-range radio sessions
pub const BLE_SESSION_PREFIX: &str = "BLE";

/// Session id prefix for multi-factor auth sessions
pub const AUTH_SESSION_PREFIX: &str = "AUTH";

/// Generate a pairing nonce: 16 random bytes as 32 uppercase hex characters.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    HEXUPPER.encode(&bytes)
}

/// Derive the radio handshake key for a session.
///
/// The key is the first 16 hex characters of SHA-256 over the user id, the
/// car id, and the nonce in its hex form. The vehicle receives the same
/// three inputs out of band and recomputes the key to authenticate the
/// radio write.
pub fn derive_hashkey(user_id: &str, car_id: &str, nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(car_id.as_bytes());
    hasher.update(nonce.as_bytes());
    let digest = hasher.finalize();
    let mut hex = HEXUPPER.encode(&digest);
    hex.truncate(16);
    hex
}

/// Derive a user's tap credential UID.
///
/// Deterministic per user: the first 32 hex characters of SHA-256 over the
/// user id and the deployment salt. Re-deriving for the same user always
/// yields the same UID, which is what makes tag re-registration idempotent.
pub fn derive_nfc_uid(user_id: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let mut hex = HEXUPPER.encode(&digest);
    hex.truncate(32);
    hex
}

/// Generate a session id: the prefix, an underscore, then 12 random bytes
/// as 24 uppercase hex characters.
pub fn generate_session_id(prefix: &str) -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    format!("{}_{}", prefix, HEXUPPER.encode(&bytes))
}

/// Derive a face template id from the enrollment image.
///
/// 'F' followed by the first 15 hex characters of SHA-256 over the image
/// bytes and the capture instant in epoch milliseconds. The timestamp keeps
/// ids distinct when the same image is submitted twice.
pub fn derive_face_id(image: &[u8], now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image);
    hasher.update(now.timestamp_millis().to_string().as_bytes());
    let digest = hasher.finalize();
    let mut hex = HEXUPPER.encode(&digest);
    hex.truncate(15);
    format!("F{}", hex)
}

/// Generate a user id: 'U' followed by 7 random bytes as 14 uppercase hex
/// characters.
pub fn generate_user_id() -> String {
    let mut bytes = [0u8; 7];
    OsRng.fill_bytes(&mut bytes);
    format!("U{}", HEXUPPER.encode(&bytes))
}

/// Check whether a string is shaped like a tap credential UID: exactly 32
/// hex characters, either case. Equality checks elsewhere stay
/// case-sensitive; this only guards the wire format.
pub fn is_valid_nfc_uid(uid: &str) -> bool {
    uid.len() == 32 && uid.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Generate a booking id: 'B' followed by the last 15 digits of the epoch
/// millisecond timestamp.
pub fn generate_booking_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    let tail = if millis.len() > 15 {
        &millis[millis.len() - 15..]
    } else {
        &millis[..]
    };
    format!("B{}", tail)
}
