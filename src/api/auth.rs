//! Authentication session API endpoints
//!
//! The staged unlock flow:
//! - GET `/auth/session` bootstraps an auth session (booking gate included)
//! - the app then reports factor outcomes, either all at once via
//!   POST `/auth/result` or step by step ending with POST `/auth/nfc/verify`
//! - GET `/auth/ble` serves the vehicle side, which only needs the hashkey
//!
//! NFC credential management rides on the same router: POST `/auth/nfc`
//! derives and stores a user's tap credential, GET `/auth/nfc/uid` returns
//! it for device-side caching.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::non_empty;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::iso_millis;

#[derive(Debug, Deserialize)]
pub struct BleQuery {
    pub user_id: Option<String>,
    pub car_id: Option<String>,
}

/// GET /auth/ble - issue or reuse the radio handshake for a (user, car) pair
///
/// The car_id falls back to the configured default so factory firmware can
/// fetch a hashkey before it knows its own fleet assignment.
pub async fn get_ble_session(
    State(state): State<AppState>,
    Query(query): Query<BleQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = non_empty(&query.user_id)
        .ok_or_else(|| ApiError::new("missing_user_id", "user_id is required"))?;
    let car_id = non_empty(&query.car_id).unwrap_or(&state.default_car_id);

    let session = state
        .session_service
        .issue_handshake(user_id, car_id)
        .await?;

    Ok(Json(json!({
        "hashkey": session.hashkey,
        "expires_at": iso_millis(session.expires_at),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: Option<String>,
    pub car_id: Option<String>,
}

/// GET /auth/session - bootstrap an auth session for a vehicle visit
pub async fn create_auth_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Value>, ApiError> {
    let (user_id, car_id) = match (non_empty(&query.user_id), non_empty(&query.car_id)) {
        (Some(user_id), Some(car_id)) => (user_id, car_id),
        _ => {
            return Err(ApiError::new(
                "missing_parameters",
                "car_id and user_id are required",
            ))
        }
    };

    let bootstrap = state.session_service.bootstrap(user_id, car_id).await?;

    Ok(Json(json!({
        "session_id": bootstrap.session.session_id,
        "hashkey": bootstrap.hashkey,
        "nfc_uid": bootstrap.nfc_uid,
        "status": bootstrap.session.status,
    })))
}

/// Factor flags arrive as raw JSON values so that non-boolean payloads can
/// be rejected with `invalid_fields` instead of a deserialization error.
#[derive(Debug, Deserialize)]
pub struct AuthResultRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub car_id: Option<String>,
    #[serde(default)]
    pub face_verified: Option<Value>,
    #[serde(default)]
    pub ble_verified: Option<Value>,
    #[serde(default)]
    pub nfc_verified: Option<Value>,
}

/// POST /auth/result - bulk report of all three factor outcomes
pub async fn report_auth_result(
    State(state): State<AppState>,
    payload: Result<Json<AuthResultRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;

    let (session_id, car_id) = match (non_empty(&req.session_id), non_empty(&req.car_id)) {
        (Some(session_id), Some(car_id)) => (session_id, car_id),
        _ => {
            return Err(ApiError::new(
                "missing_fields",
                "session_id and car_id are required",
            ))
        }
    };

    let face = req.face_verified.as_ref().and_then(Value::as_bool);
    let ble = req.ble_verified.as_ref().and_then(Value::as_bool);
    let nfc = req.nfc_verified.as_ref().and_then(Value::as_bool);
    let (face, ble, nfc) = match (face, ble, nfc) {
        (Some(face), Some(ble), Some(nfc)) => (face, ble, nfc),
        _ => {
            return Err(ApiError::new(
                "invalid_fields",
                "face_verified, ble_verified, nfc_verified must be boolean",
            ))
        }
    };

    let outcome = state
        .session_service
        .report_result(session_id, car_id, face, ble, nfc)
        .await?;

    let response = if outcome.passed {
        json!({
            "status": "MFA_SUCCESS",
            "message": "All auth steps completed",
            "session_id": outcome.session_id,
            "timestamp": iso_millis(outcome.timestamp),
        })
    } else {
        json!({
            "status": "MFA_FAILED",
            "message": "Some auth steps failed",
            "failed_steps": outcome.failed_steps,
            "session_id": outcome.session_id,
            "timestamp": iso_millis(outcome.timestamp),
        })
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct NfcVerifyRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nfc_uid: Option<String>,
    #[serde(default)]
    pub car_id: Option<String>,
}

/// POST /auth/nfc/verify - complete the tap factor of the staged flow
pub async fn verify_nfc(
    State(state): State<AppState>,
    payload: Result<Json<NfcVerifyRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;

    let (user_id, nfc_uid, car_id) = match (
        non_empty(&req.user_id),
        non_empty(&req.nfc_uid),
        non_empty(&req.car_id),
    ) {
        (Some(user_id), Some(nfc_uid), Some(car_id)) => (user_id, nfc_uid, car_id),
        _ => {
            return Err(ApiError::new(
                "missing_fields",
                "user_id, nfc_uid, and car_id are required",
            ))
        }
    };

    let outcome = state
        .session_service
        .verify_tap(user_id, nfc_uid, car_id)
        .await?;

    Ok(Json(json!({
        "status": "completed",
        "message": "All auth steps completed",
        "session_id": outcome.session_id,
        "timestamp": iso_millis(outcome.timestamp),
    })))
}

#[derive(Debug, Deserialize)]
pub struct NfcRegisterRequest {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /auth/nfc - derive and store the tap credential for a user
///
/// The credential is computed server-side from the user id and the
/// configured salt; clients never supply UID material.
pub async fn register_nfc(
    State(state): State<AppState>,
    payload: Result<Json<NfcRegisterRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;

    let user_id = non_empty(&req.user_id)
        .ok_or_else(|| ApiError::new("missing_fields", "user_id is required"))?;

    state.registration_service.register_nfc(user_id).await?;

    Ok(Json(json!({ "status": "ok" })))
}

#[derive(Debug, Deserialize)]
pub struct NfcUidQuery {
    pub user_id: Option<String>,
}

/// GET /auth/nfc/uid - fetch the stored tap credential for device caching
pub async fn get_nfc_uid(
    State(state): State<AppState>,
    Query(query): Query<NfcUidQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = non_empty(&query.user_id)
        .ok_or_else(|| ApiError::new("missing_user_id", "user_id is required"))?;

    let user = state.registration_service.get_user(user_id).await?;

    Ok(Json(json!({
        "user_id": user.user_id,
        "nfc_uid": user.nfc_uid,
        "status": "ok",
    })))
}

// ============================================================================
// Tests
// ============================================================================
