//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints for the Keyway access
//! platform. It includes:
//! - Auth session endpoints (hashkey issue, session bootstrap, result
//!   reporting, NFC verification and credential management)
//! - User registration endpoints (plain and face enrollment)
//! - Booking endpoints
//! - Health check

pub mod auth;
pub mod bookings;
pub mod common;
pub mod health;
pub mod middleware;
pub mod responses;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState};

/// Largest accepted face enrollment request body. The registration service
/// enforces the 1 MiB image cap; this only bounds what gets read at all.
const FACE_UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    // Every client is a vehicle or a phone app, so CORS stays permissive
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/auth/ble", get(auth::get_ble_session))
        .route("/auth/session", get(auth::create_auth_session))
        .route("/auth/result", post(auth::report_auth_result))
        .route("/auth/nfc", post(auth::register_nfc))
        .route("/auth/nfc/uid", get(auth::get_nfc_uid))
        .route("/auth/nfc/verify", post(auth::verify_nfc))
        .route(
            "/auth/face",
            post(users::register_face).layer(DefaultBodyLimit::max(FACE_UPLOAD_BODY_LIMIT)),
        )
        .route("/users", post(users::create_user))
        .route(
            "/bookings",
            post(bookings::create_booking).get(bookings::list_bookings),
        )
        .route(
            "/bookings/{booking_id}",
            get(bookings::get_booking).patch(bookings::update_booking),
        )
        .fallback(route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Unmatched routes answer in the standard error shape
async fn route_not_found() -> ApiError {
    ApiError::new("not_found", "Route not found")
}
