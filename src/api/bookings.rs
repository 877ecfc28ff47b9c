//! Booking API endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::common::non_empty;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::{iso_millis, BookingResponse};
use crate::models::Booking;
use crate::services::BookingRequest;

/// POST /bookings - create a booking
///
/// Conflict check and vehicle claim run inside one transaction; see the
/// booking repository for the locking details.
pub async fn create_booking(
    State(state): State<AppState>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;

    let booking = state.booking_service.create(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": BookingResponse::from(booking),
        })),
    ))
}

/// GET /bookings/{booking_id} - fetch one booking
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = state.booking_service.get(&booking_id).await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub user_id: Option<String>,
}

/// GET /bookings?user_id= - list a user's bookings, newest first
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = non_empty(&query.user_id)
        .ok_or_else(|| ApiError::new("missing_parameter", "user_id parameter is required"))?;

    let bookings = state.booking_service.list_for_user(user_id).await?;
    let count = bookings.len();

    Ok(Json(json!({
        "status": "success",
        "data": {
            "bookings": bookings,
            "count": count,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    #[serde(default)]
    pub status: Option<String>,
}

/// PATCH /bookings/{booking_id} - cancel a booking and release the vehicle
pub async fn update_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<String>,
    payload: Result<Json<UpdateBookingRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;

    let booking = state
        .booking_service
        .cancel(&booking_id, req.status.as_deref())
        .await?;

    Ok(Json(json!({
        "booking_id": booking.booking_id,
        "status": booking.status,
        "updated_at": iso_millis(booking.updated_at),
    })))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::config::AuthConfig;
    use crate::db::repositories::{CarRepository, SqlxCarRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::CarStatus;
    use axum_test::TestServer;
    use chrono::{Duration, Utc};

    async fn setup() -> (AppState, TestServer) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, &AuthConfig::default());
        let server =
            TestServer::new(build_router(state.clone())).expect("Failed to start test server");
        (state, server)
    }

    fn window(start_hours: i64, end_hours: i64) -> (String, String) {
        let now = Utc::now();
        (
            (now + Duration::hours(start_hours)).to_rfc3339(),
            (now + Duration::hours(end_hours)).to_rfc3339(),
        )
    }

    async fn create_booking_via_api(server: &TestServer, start_hours: i64, end_hours: i64) -> Value {
        let (start_time, end_time) = window(start_hours, end_hours);
        let response = server
            .post("/bookings")
            .json(&json!({
                "user_id": "U00000000000001",
                "car_id": "CAR123",
                "start_time": start_time,
                "end_time": end_time,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    async fn release_car(state: &AppState, car_id: &str) {
        SqlxCarRepository::new(state.pool.clone())
            .set_status(car_id, CarStatus::Available)
            .await
            .expect("Failed to release car");
    }

    #[tokio::test]
    async fn test_create_booking() {
        let (_state, server) = setup().await;

        let body = create_booking_via_api(&server, 1, 4).await;
        assert_eq!(body["status"], "success");
        let data = &body["data"];
        assert!(data["booking_id"].as_str().unwrap().starts_with('B'));
        assert_eq!(data["user_id"], "U00000000000001");
        assert_eq!(data["car_id"], "CAR123");
        assert_eq!(data["status"], "approved");
        assert!(data.get("updated_at").is_none());
    }

    #[tokio::test]
    async fn test_create_booking_rejects_past_start() {
        let (_state, server) = setup().await;
        let (start_time, end_time) = window(-2, 4);

        let response = server
            .post("/bookings")
            .json(&json!({
                "user_id": "U00000000000001",
                "car_id": "CAR123",
                "start_time": start_time,
                "end_time": end_time,
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["message"], "Cannot book past time");
    }

    #[tokio::test]
    async fn test_create_booking_requires_fields() {
        let (_state, server) = setup().await;

        let response = server
            .post("/bookings")
            .json(&json!({ "user_id": "U00000000000001" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(
            body["message"],
            "Missing required fields (user_id, car_id, start_time, end_time)"
        );
    }

    #[tokio::test]
    async fn test_create_booking_unknown_vehicle() {
        let (_state, server) = setup().await;
        let (start_time, end_time) = window(1, 4);

        let response = server
            .post("/bookings")
            .json(&json!({
                "user_id": "U00000000000001",
                "car_id": "CAR999",
                "start_time": start_time,
                "end_time": end_time,
            }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "vehicle_not_found");
    }

    #[tokio::test]
    async fn test_create_booking_reports_unavailable_vehicle() {
        let (_state, server) = setup().await;
        create_booking_via_api(&server, 1, 4).await;

        let (start_time, end_time) = window(6, 8);
        let response = server
            .post("/bookings")
            .json(&json!({
                "user_id": "U00000000000002",
                "car_id": "CAR123",
                "start_time": start_time,
                "end_time": end_time,
            }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "vehicle_not_available");
        assert_eq!(body["details"]["current_status"], "rented");
    }

    #[tokio::test]
    async fn test_create_booking_reports_conflicts() {
        let (state, server) = setup().await;
        let first = create_booking_via_api(&server, 1, 4).await;
        release_car(&state, "CAR123").await;

        let (start_time, end_time) = window(2, 6);
        let response = server
            .post("/bookings")
            .json(&json!({
                "user_id": "U00000000000002",
                "car_id": "CAR123",
                "start_time": start_time,
                "end_time": end_time,
            }))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "booking_conflict");
        assert_eq!(body["message"], "Booking conflict exists");
        let conflicts = body["details"]["conflicting_bookings"].as_array().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0]["booking_id"], first["data"]["booking_id"]);
    }

    #[tokio::test]
    async fn test_get_booking() {
        let (_state, server) = setup().await;
        let created = create_booking_via_api(&server, 1, 4).await;
        let booking_id = created["data"]["booking_id"].as_str().unwrap();

        let response = server.get(&format!("/bookings/{}", booking_id)).await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["booking_id"], booking_id);
        assert_eq!(body["status"], "approved");
        assert!(body.get("updated_at").is_some());
    }

    #[tokio::test]
    async fn test_get_booking_not_found() {
        let (_state, server) = setup().await;

        let response = server.get("/bookings/B000000000000000").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "booking_not_found");
        assert_eq!(body["message"], "Booking not found");
    }

    #[tokio::test]
    async fn test_list_bookings_requires_user_id() {
        let (_state, server) = setup().await;

        let response = server.get("/bookings").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "missing_parameter");
        assert_eq!(body["message"], "user_id parameter is required");
    }

    #[tokio::test]
    async fn test_list_bookings() {
        let (_state, server) = setup().await;
        let created = create_booking_via_api(&server, 1, 4).await;

        let response = server
            .get("/bookings")
            .add_query_param("user_id", "U00000000000001")
            .await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["count"], 1);
        assert_eq!(
            body["data"]["bookings"][0]["booking_id"],
            created["data"]["booking_id"]
        );
    }

    #[tokio::test]
    async fn test_cancel_booking_releases_vehicle() {
        let (state, server) = setup().await;
        let created = create_booking_via_api(&server, 1, 4).await;
        let booking_id = created["data"]["booking_id"].as_str().unwrap();

        let response = server
            .patch(&format!("/bookings/{}", booking_id))
            .json(&json!({ "status": "cancelled" }))
            .await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["booking_id"], booking_id);
        assert_eq!(body["status"], "cancelled");
        assert!(body["updated_at"].as_str().unwrap().ends_with('Z'));

        let car = SqlxCarRepository::new(state.pool.clone())
            .get_by_id("CAR123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(car.status, CarStatus::Available);
    }

    #[tokio::test]
    async fn test_cancel_booking_rejects_other_statuses() {
        let (_state, server) = setup().await;
        let created = create_booking_via_api(&server, 1, 4).await;
        let booking_id = created["data"]["booking_id"].as_str().unwrap();

        let response = server
            .patch(&format!("/bookings/{}", booking_id))
            .json(&json!({ "status": "completed" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_status");
        assert_eq!(body["message"], "Invalid status (only \"cancelled\" allowed)");
    }

    #[tokio::test]
    async fn test_cancel_unknown_booking() {
        let (_state, server) = setup().await;

        let response = server
            .patch("/bookings/B000000000000000")
            .json(&json!({ "status": "cancelled" }))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"], "booking_not_found");
    }
}
