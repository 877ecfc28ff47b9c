//! Tap-credential responder
//!
//! Phone-side card emulation for the tap factor. The vehicle reader selects
//! our application by AID and the responder answers with the locally cached
//! UID bytes. The reader forwards them to the server for the incremental
//! verify, so the bytes must decode from exactly the value
//! `services::derive_nfc_uid` produced at registration.
//!
//! The platform's contactless stack calls [`TapResponder::process_command`]
//! inline during the field exchange. The handler is synchronous and touches
//! nothing but the injected [`CredentialStore`]; any I/O here would blow the
//! tap deadline.

use data_encoding::HEXUPPER;

use crate::services::is_valid_nfc_uid;

/// Application identifier the reader selects (7 bytes).
pub const AID: [u8; 7] = [0xF0, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

/// SELECT-by-AID command header plus the AID length byte.
pub const SELECT_HEADER: [u8; 5] = [0x00, 0xA4, 0x04, 0x00, 0x07];

/// Status word: command processed.
pub const STATUS_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Status word: command rejected or unsupported.
pub const STATUS_FAILED: [u8; 2] = [0x6F, 0x00];

/// Source of the locally cached tap credential.
///
/// Injected at construction so the responder holds no ambient state.
/// Implementations must answer from memory; the handler runs on the
/// contactless stack's clock.
pub trait CredentialStore: Send + Sync {
    /// The provisioned UID for the current user, if any. 32 hex characters.
    fn nfc_uid(&self) -> Option<String>;
}

/// Why the reader link ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeactivationReason {
    /// The field dropped or the phone left the reader.
    LinkLoss,
    /// The reader selected another application.
    Deselected,
}

/// Emulated credential card. Stateless between taps.
pub struct TapResponder<S> {
    store: S,
}

impl<S: CredentialStore> TapResponder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Handle one command APDU and produce the response APDU.
    ///
    /// Only SELECT for our AID is answered. A matching SELECT returns the
    /// decoded UID bytes followed by `90 00`; everything else, including a
    /// missing or malformed stored credential, fails closed with `6F 00`.
    pub fn process_command(&self, command: &[u8]) -> Vec<u8> {
        if !is_select_for_aid(command) {
            tracing::debug!(len = command.len(), "Rejecting non-SELECT command");
            return STATUS_FAILED.to_vec();
        }
        let Some(uid) = self.store.nfc_uid() else {
            tracing::warn!("SELECT received but no tap credential is provisioned");
            return STATUS_FAILED.to_vec();
        };
        match decode_uid(&uid) {
            Some(mut response) => {
                tracing::debug!("Answering SELECT with provisioned credential");
                response.extend_from_slice(&STATUS_SUCCESS);
                response
            }
            None => {
                tracing::warn!("Stored tap credential is malformed, refusing SELECT");
                STATUS_FAILED.to_vec()
            }
        }
    }

    /// Note the end of a reader link. There is no per-tap state to reset.
    pub fn on_deactivated(&self, reason: DeactivationReason) {
        tracing::debug!(?reason, "Reader link deactivated");
    }
}

fn is_select_for_aid(command: &[u8]) -> bool {
    let prefix_len = SELECT_HEADER.len() + AID.len();
    command.len() >= prefix_len
        && command[..SELECT_HEADER.len()] == SELECT_HEADER
        && command[SELECT_HEADER.len()..prefix_len] == AID
}

fn decode_uid(uid: &str) -> Option<Vec<u8>> {
    if !is_valid_nfc_uid(uid) {
        return None;
    }
    HEXUPPER.decode(uid.to_ascii_uppercase().as_bytes()).ok()
}

// ============================================================================
// Tests
// ============================================================================
