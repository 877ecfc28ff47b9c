//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity, the identity anchor of the access platform.
///
/// `face_id` and `nfc_uid` are populated by face enrollment; a user created
/// through plain registration carries neither until enrollment happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Opaque user token ("U" + 14 uppercase hex chars)
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Contact email (unique)
    pub email: String,
    /// Contact phone
    pub phone: String,
    /// Postal address
    pub address: Option<String>,
    /// Enrollment photo hash ("F" + 15 uppercase hex chars, unique)
    pub face_id: Option<String>,
    /// Derived contactless identifier (32 uppercase hex chars, unique)
    pub nfc_uid: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input for plain user registration
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: Option<String>,
}
