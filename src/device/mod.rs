//! Device-side protocol components
//!
//! The parts of the access protocol that run on the phone rather than the
//! server: the short-range radio exchange that picks up a vehicle's hashkey
//! broadcast and delivers the access command, and the tap-credential
//! responder that answers the vehicle reader's SELECT with the provisioned
//! UID. Both share their wire constants and derivation formulas with the
//! server side, so they live in the same crate.

pub mod ble;
pub mod nfc;

pub use ble::{ExchangeEvent, ExchangeState, LinkEvent, RadioError, RadioExchange, RadioLink};
pub use nfc::{CredentialStore, DeactivationReason, TapResponder};
