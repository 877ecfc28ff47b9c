//! API state and error plumbing
//!
//! Contains:
//! - `AppState`, the shared service handles passed to every handler
//! - `ApiError`, the single error type handlers return
//!
//! Every error response uses the platform's flat wire shape
//! `{"error": code, "message": text, "details": {...}}` with `details`
//! omitted when there is no structured context. The HTTP status is derived
//! from the code string, so handlers never juggle status codes by hand.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::repositories::{
    SqlxBookingRepository, SqlxCarRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    BookingError, BookingService, RegistrationError, RegistrationService, SessionError,
    SessionService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub session_service: Arc<SessionService>,
    pub booking_service: Arc<BookingService>,
    pub registration_service: Arc<RegistrationService>,
    /// Vehicle assumed when a hashkey request names none
    pub default_car_id: String,
}

impl AppState {
    /// Wire the full service stack on top of one database pool
    pub fn new(pool: DynDatabasePool, auth: &AuthConfig) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let booking_repo = SqlxBookingRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let car_repo = SqlxCarRepository::boxed(pool.clone());

        let session_service = Arc::new(SessionService::with_session_ttl(
            user_repo.clone(),
            booking_repo.clone(),
            session_repo,
            auth.session_ttl_minutes,
        ));
        let booking_service = Arc::new(BookingService::new(booking_repo, car_repo));
        let registration_service = Arc::new(RegistrationService::new(
            user_repo,
            auth.nfc_salt.clone(),
        ));

        Self {
            pool,
            session_service,
            booking_service,
            registration_service,
            default_car_id: auth.default_car_id.clone(),
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    /// Internal error with the cause preserved in `details.error`
    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Internal error handling request: {:#}", err);
        Self::with_details(
            "internal_error",
            "Internal server error",
            serde_json::json!({ "error": err.to_string() }),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "missing_user_id" | "missing_parameter" | "missing_parameters" | "missing_fields"
            | "invalid_fields" | "invalid_request" | "invalid_status" | "invalid_email"
            | "invalid_phone" | "invalid_nfc_uid" | "nfc_uid_mismatch"
            | "previous_steps_incomplete" | "invalid_content_type" | "missing_image"
            | "file_too_large" | "invalid_image" => StatusCode::BAD_REQUEST,
            "user_not_found" | "session_not_found" | "no_active_booking" | "booking_not_found"
            | "vehicle_not_found" | "not_found" => StatusCode::NOT_FOUND,
            "email_exists" | "face_already_exists" | "nfc_uid_already_exists"
            | "vehicle_not_available" | "booking_conflict" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::UserNotFound => Self::new("user_not_found", message),
            SessionError::NoActiveBooking => Self::new("no_active_booking", message),
            SessionError::SessionNotFound | SessionError::ActiveSessionNotFound => {
                Self::new("session_not_found", message)
            }
            SessionError::InvalidUidFormat => Self::new("invalid_nfc_uid", message),
            SessionError::UidMismatch => Self::new("nfc_uid_mismatch", message),
            SessionError::StepsIncomplete { completed } => Self::with_details(
                "previous_steps_incomplete",
                message,
                serde_json::json!({ "completed_steps": completed }),
            ),
            SessionError::InternalError(err) => Self::internal(err),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::InvalidRequest(_) => Self::new("invalid_request", message),
            BookingError::VehicleNotFound => Self::new("vehicle_not_found", message),
            BookingError::VehicleUnavailable { current_status } => Self::with_details(
                "vehicle_not_available",
                message,
                serde_json::json!({ "current_status": current_status }),
            ),
            BookingError::Conflict { conflicts } => Self::with_details(
                "booking_conflict",
                message,
                serde_json::json!({ "conflicting_bookings": conflicts }),
            ),
            BookingError::NotFound => Self::new("booking_not_found", message),
            BookingError::InvalidStatus => Self::new("invalid_status", message),
            BookingError::InternalError(err) => Self::internal(err),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        let message = err.to_string();
        match err {
            RegistrationError::MissingFields => Self::new("missing_fields", message),
            RegistrationError::InvalidEmail => Self::new("invalid_email", message),
            RegistrationError::InvalidPhone => Self::new("invalid_phone", message),
            RegistrationError::EmailExists => Self::new("email_exists", message),
            RegistrationError::ImageTooLarge => Self::new("file_too_large", message),
            RegistrationError::InvalidImage { .. } => Self::new("invalid_image", message),
            RegistrationError::FaceExists => Self::new("face_already_exists", message),
            RegistrationError::UidExists => Self::new("nfc_uid_already_exists", message),
            RegistrationError::UserNotFound => Self::new("user_not_found", message),
            RegistrationError::InternalError(err) => Self::internal(err),
        }
    }
}

/// Malformed or missing JSON bodies surface in the standard error shape
/// instead of axum's plain-text rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new("invalid_request", rejection.body_text())
    }
}

// ============================================================================
// Tests
// ============================================================================
