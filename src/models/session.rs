//! Session models
//!
//! This module provides:
//! - `BleSession`, the short-range radio session carrying the hashkey secret
//! - `AuthSession`, the per-visit multi-factor verification record
//! - `AuthStatus` and `AuthStep` enums for session state and factor names
//!
//! Both session kinds expire ten minutes after creation (configurable).
//! Expired rows are never mutated or deleted by the protocol; every lookup
//! filters them out instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-range radio session holding the current hashkey for a (user, car)
/// pair. The vehicle broadcasts the hashkey; the phone matches it during the
/// scan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BleSession {
    /// Session identifier ("BLE_" + 24 uppercase hex chars)
    pub session_id: String,
    /// Session owner
    pub user_id: String,
    /// Target vehicle
    pub car_id: String,
    /// Derived radio credential (16 uppercase hex chars, 8 bytes)
    pub hashkey: String,
    /// Random value mixed into hashkey derivation (32 uppercase hex chars)
    pub nonce: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl BleSession {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Multi-factor authentication session.
///
/// Tracks which of the three factors have been verified for one car visit.
/// The incremental NFC step may only complete once `face_verified` and
/// `ble_verified` are both already true on the same row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Session identifier ("AUTH_" + 24 uppercase hex chars)
    pub session_id: String,
    /// The booking this session authorizes against
    pub booking_id: String,
    /// Session owner
    pub user_id: String,
    /// Target vehicle
    pub car_id: String,
    /// Face factor verified
    pub face_verified: bool,
    /// Short-range radio factor verified
    pub ble_verified: bool,
    /// Tap-credential factor verified
    pub nfc_verified: bool,
    /// Overall session state
    pub status: AuthStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl AuthSession {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Check if the session has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, AuthStatus::Completed | AuthStatus::Failed)
    }

    /// Factor flag for one step
    pub fn step_verified(&self, step: AuthStep) -> bool {
        match step {
            AuthStep::Face => self.face_verified,
            AuthStep::Ble => self.ble_verified,
            AuthStep::Nfc => self.nfc_verified,
        }
    }
}

/// Overall auth session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    /// Verification in progress
    Active,
    /// All three factors verified
    Completed,
    /// At least one factor reported failed
    Failed,
}

impl AuthStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStatus::Active => "active",
            AuthStatus::Completed => "completed",
            AuthStatus::Failed => "failed",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(AuthStatus::Active),
            "completed" => Some(AuthStatus::Completed),
            "failed" => Some(AuthStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The three authentication factors, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStep {
    /// Face photo match
    Face,
    /// Short-range radio handshake
    Ble,
    /// Tap-credential exchange
    Nfc,
}

impl AuthStep {
    /// Factor name as it appears in report payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthStep::Face => "face",
            AuthStep::Ble => "ble",
            AuthStep::Nfc => "nfc",
        }
    }
}

impl std::fmt::Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
