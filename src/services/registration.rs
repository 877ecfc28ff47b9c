//! Registration service
//!
//! Business logic for user onboarding and credential issuance:
//! - Plain user registration with contact details
//! - Face enrollment, which mints a full identity (user id, face template
//!   id, tap credential) from one JPEG image
//! - Tap credential issuance and retrieval
//!
//! The tap credential is derived, never client-supplied: re-registration
//! for the same user re-derives the same UID, so the operation is
//! idempotent per user while staying unique across users.

use crate::db::repositories::UserRepository;
use crate::models::User;
use crate::services::credentials::{derive_face_id, derive_nfc_uid, generate_user_id};
use anyhow::Context;
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::Rng;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

/// Largest accepted enrollment image, in bytes
const MAX_IMAGE_BYTES: usize = 1024 * 1024;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Korean mobile numbers, with or without dashes
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^01[0-9]-?[0-9]{3,4}-?[0-9]{4}$").expect("phone regex"));

/// Error types for registration service operations
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    /// A required contact field is missing or empty
    #[error("name, email, phone are required")]
    MissingFields,

    /// Email does not look like an address
    #[error("Invalid email format")]
    InvalidEmail,

    /// Phone is not a Korean mobile number
    #[error("Invalid phone format (010-1234-5678)")]
    InvalidPhone,

    /// Another user already registered this email
    #[error("Email already registered")]
    EmailExists,

    /// Enrollment image exceeds the size cap
    #[error("Image size must not exceed 1MB")]
    ImageTooLarge,

    /// Enrollment image is not a JPEG
    #[error("Image must be in JPEG format (got: {got})")]
    InvalidImage { got: String },

    /// This face template is already registered
    #[error("This face is already registered")]
    FaceExists,

    /// The derived tap credential collides with another user's
    #[error("This NFC UID is already registered")]
    UidExists,

    /// User does not exist
    #[error("User not found")]
    UserNotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Raw user registration request as received from the client.
///
/// Fields are optional so empty and missing values both surface as the
/// missing-fields error rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Identity minted by face enrollment
#[derive(Debug, Clone)]
pub struct FaceRegistration {
    pub user_id: String,
    pub face_id: String,
    pub nfc_uid: String,
}

/// Registration service for users and their credentials
pub struct RegistrationService {
    user_repo: Arc<dyn UserRepository>,
    nfc_salt: String,
}

impl RegistrationService {
    /// Create a new registration service.
    ///
    /// `nfc_salt` is the deployment-wide salt mixed into tap credential
    /// derivation; vehicles must be provisioned with UIDs derived from the
    /// same salt.
    pub fn new(user_repo: Arc<dyn UserRepository>, nfc_salt: impl Into<String>) -> Self {
        Self {
            user_repo,
            nfc_salt: nfc_salt.into(),
        }
    }

    /// Register a user from contact details.
    ///
    /// No credentials are issued here; `face_id` and `nfc_uid` stay unset
    /// until the enrollment endpoints run. The email uniqueness check is a
    /// read-before-write, matching the registration flow's tolerance for a
    /// race that the unique index still catches.
    ///
    /// # Errors
    ///
    /// - `MissingFields` if name, email, or phone is absent or empty
    /// - `InvalidEmail` / `InvalidPhone` on format violations
    /// - `EmailExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn register_user(&self, request: UserRequest) -> Result<User, RegistrationError> {
        let name = non_empty(&request.name).ok_or(RegistrationError::MissingFields)?;
        let email = non_empty(&request.email).ok_or(RegistrationError::MissingFields)?;
        let phone = non_empty(&request.phone).ok_or(RegistrationError::MissingFields)?;

        if !EMAIL_RE.is_match(email) {
            return Err(RegistrationError::InvalidEmail);
        }
        if !PHONE_RE.is_match(phone) {
            return Err(RegistrationError::InvalidPhone);
        }

        if self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(RegistrationError::EmailExists);
        }

        let now = Utc::now();
        let user = User {
            user_id: generate_user_id(),
            name: name.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            address: request.address.clone().filter(|a| !a.is_empty()),
            face_id: None,
            nfc_uid: None,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        Ok(created)
    }

    /// Enroll a face image, minting a complete identity.
    ///
    /// Validates the image (JPEG magic, size cap), derives the face
    /// template id and tap credential, and inserts a user row with
    /// placeholder contact details. The face template's unique index
    /// rejects enrolling the same face twice.
    ///
    /// # Errors
    ///
    /// - `ImageTooLarge` if the image exceeds 1 MiB
    /// - `InvalidImage` if the image does not start with the JPEG magic
    /// - `FaceExists` if this face template is already registered
    /// - `InternalError` for database errors
    pub async fn register_face(&self, image: &[u8]) -> Result<FaceRegistration, RegistrationError> {
        if image.len() > MAX_IMAGE_BYTES {
            return Err(RegistrationError::ImageTooLarge);
        }

        if image.len() < 2 || image[0] != 0xFF || image[1] != 0xD8 {
            let got = if image.is_empty() {
                "empty".to_string()
            } else if image.len() < 2 {
                format!("{:#04x}", image[0])
            } else {
                format!("{:#04x} {:#04x}", image[0], image[1])
            };
            return Err(RegistrationError::InvalidImage { got });
        }

        let now = Utc::now();
        let user_id = generate_user_id();
        let face_id = derive_face_id(image, now);
        let nfc_uid = derive_nfc_uid(&user_id, &self.nfc_salt);

        // Contact details are placeholders until the user fills them in
        let name = format!("User_{}", &user_id[1..6]);
        let email = format!("{}@hypermob.com", user_id.to_lowercase());
        let phone = format!(
            "010-{}-{}",
            OsRng.gen_range(1000..10000),
            OsRng.gen_range(1000..10000)
        );

        let user = User {
            user_id: user_id.clone(),
            name,
            email,
            phone,
            address: None,
            face_id: Some(face_id.clone()),
            nfc_uid: Some(nfc_uid.clone()),
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.user_repo.create(&user).await {
            if is_unique_violation(&err) {
                return Err(RegistrationError::FaceExists);
            }
            return Err(RegistrationError::InternalError(
                err.context("Failed to create enrolled user"),
            ));
        }

        Ok(FaceRegistration {
            user_id,
            face_id,
            nfc_uid,
        })
    }

    /// Derive and store the tap credential for an existing user.
    ///
    /// The UID is a pure function of the user id and the deployment salt,
    /// so repeating the call for the same user rewrites the same value and
    /// succeeds. A collision with a different user's stored UID is rejected
    /// by the unique index.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user does not exist
    /// - `UidExists` if another user already holds the derived UID
    /// - `InternalError` for database errors
    pub async fn register_nfc(&self, user_id: &str) -> Result<String, RegistrationError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(RegistrationError::UserNotFound)?;

        let nfc_uid = derive_nfc_uid(user_id, &self.nfc_salt);

        if let Err(err) = self.user_repo.set_nfc_uid(user_id, &nfc_uid).await {
            if is_unique_violation(&err) {
                return Err(RegistrationError::UidExists);
            }
            return Err(RegistrationError::InternalError(
                err.context("Failed to store tap credential"),
            ));
        }

        Ok(nfc_uid)
    }

    /// Fetch a user for tap credential retrieval
    pub async fn get_user(&self, user_id: &str) -> Result<User, RegistrationError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(RegistrationError::UserNotFound)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Walk an error chain looking for a database unique-index violation
fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .map(|e| matches!(e, sqlx::Error::Database(db) if db.is_unique_violation()))
            .unwrap_or(false)
    })
}
