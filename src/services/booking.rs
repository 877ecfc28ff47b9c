//! Booking service
//!
//! Business logic for vehicle bookings: request validation, conflict-checked
//! creation, lookups, and cancellation. Creation runs inside a repository
//! transaction because it must atomically check the vehicle, scan for
//! overlapping bookings, insert, and flip the vehicle to rented.
//! Cancellation is two sequential writes with no such atomicity requirement.

use crate::db::repositories::{BookingAttempt, BookingConflict, BookingRepository, CarRepository};
use crate::models::{Booking, BookingStatus, CarStatus, CreateBookingInput};
use crate::services::credentials::generate_booking_id;
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Longest allowed booking window
const MAX_BOOKING_DAYS: i64 = 7;

/// Error types for booking service operations
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Request failed validation; the message names the violated rule
    #[error("{0}")]
    InvalidRequest(String),

    /// Target vehicle does not exist
    #[error("Vehicle not found")]
    VehicleNotFound,

    /// Target vehicle exists but is not available
    #[error("Vehicle not available")]
    VehicleUnavailable {
        /// The vehicle's current status, echoed to the caller
        current_status: String,
    },

    /// Requested window overlaps existing bookings
    #[error("Booking conflict exists")]
    Conflict {
        /// The bookings that block the requested window
        conflicts: Vec<BookingConflict>,
    },

    /// Booking does not exist
    #[error("Booking not found")]
    NotFound,

    /// Cancellation requested with anything other than "cancelled"
    #[error("Invalid status (only \"cancelled\" allowed)")]
    InvalidStatus,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Raw booking request as received from the client.
///
/// All fields are optional so that missing-field and format errors surface
/// as validation messages instead of deserialization failures. An empty
/// string counts as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub car_id: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

/// Booking service for creating and managing vehicle bookings
pub struct BookingService {
    booking_repo: Arc<dyn BookingRepository>,
    car_repo: Arc<dyn CarRepository>,
}

impl BookingService {
    /// Create a new booking service with the given repositories
    pub fn new(booking_repo: Arc<dyn BookingRepository>, car_repo: Arc<dyn CarRepository>) -> Self {
        Self {
            booking_repo,
            car_repo,
        }
    }

    /// Create a booking.
    ///
    /// Validation runs first and reports the earliest violated rule. The
    /// creation itself is transactional: vehicle existence and availability,
    /// the conflict scan, the insert, and the vehicle status flip all commit
    /// or roll back together, so two racing requests for the same window
    /// can never both succeed.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` with the violated rule's message
    /// - `VehicleNotFound` if the car does not exist
    /// - `VehicleUnavailable` if the car is not available, with its status
    /// - `Conflict` if the window overlaps existing approved or active
    ///   bookings, listing them
    /// - `InternalError` for database errors
    pub async fn create(&self, request: BookingRequest) -> Result<Booking, BookingError> {
        let input = validate_booking_request(&request, Utc::now())?;

        let now = Utc::now();
        let booking = Booking {
            booking_id: generate_booking_id(now),
            user_id: input.user_id,
            car_id: input.car_id,
            status: BookingStatus::Approved,
            start_time: input.start_time,
            end_time: input.end_time,
            created_at: now,
            updated_at: now,
        };

        let attempt = self
            .booking_repo
            .create_checked(&booking)
            .await
            .context("Failed to create booking")?;

        match attempt {
            BookingAttempt::Created(created) => Ok(created),
            BookingAttempt::VehicleNotFound => Err(BookingError::VehicleNotFound),
            BookingAttempt::VehicleUnavailable { current_status } => {
                Err(BookingError::VehicleUnavailable { current_status })
            }
            BookingAttempt::Conflict { conflicts } => Err(BookingError::Conflict { conflicts }),
        }
    }

    /// Get a booking by id
    pub async fn get(&self, booking_id: &str) -> Result<Booking, BookingError> {
        self.booking_repo
            .get_by_id(booking_id)
            .await
            .context("Failed to get booking")?
            .ok_or(BookingError::NotFound)
    }

    /// List a user's bookings, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        let bookings = self
            .booking_repo
            .list_by_user(user_id)
            .await
            .context("Failed to list bookings")?;

        Ok(bookings)
    }

    /// Cancel a booking and return the vehicle to the fleet.
    ///
    /// The only accepted target status is "cancelled"; a missing or other
    /// status is rejected. There is no gate on the booking's current status,
    /// so cancelling twice succeeds and any state may be cancelled. The
    /// booking update and the vehicle status flip are two independent
    /// writes.
    ///
    /// # Errors
    ///
    /// - `InvalidStatus` unless the requested status is exactly "cancelled"
    /// - `NotFound` if the booking does not exist
    /// - `InternalError` for database errors
    pub async fn cancel(
        &self,
        booking_id: &str,
        requested_status: Option<&str>,
    ) -> Result<Booking, BookingError> {
        match requested_status {
            Some("cancelled") => {}
            _ => return Err(BookingError::InvalidStatus),
        }

        let mut booking = self
            .booking_repo
            .get_by_id(booking_id)
            .await
            .context("Failed to get booking")?
            .ok_or(BookingError::NotFound)?;

        let now = Utc::now();
        self.booking_repo
            .set_status(booking_id, BookingStatus::Cancelled, now)
            .await
            .context("Failed to cancel booking")?;

        self.car_repo
            .set_status(&booking.car_id, CarStatus::Available)
            .await
            .context("Failed to release vehicle")?;

        booking.status = BookingStatus::Cancelled;
        booking.updated_at = now;
        Ok(booking)
    }
}

/// Validate a raw booking request against the creation rules, in order:
/// required fields, time format, window direction, no past start, and the
/// maximum window length. Returns the typed input on success.
fn validate_booking_request(
    request: &BookingRequest,
    now: DateTime<Utc>,
) -> Result<CreateBookingInput, BookingError> {
    let user_id = non_empty(&request.user_id);
    let car_id = non_empty(&request.car_id);
    let start_raw = non_empty(&request.start_time);
    let end_raw = non_empty(&request.end_time);

    let (user_id, car_id, start_raw, end_raw) = match (user_id, car_id, start_raw, end_raw) {
        (Some(u), Some(c), Some(s), Some(e)) => (u, c, s, e),
        _ => {
            return Err(BookingError::InvalidRequest(
                "Missing required fields (user_id, car_id, start_time, end_time)".to_string(),
            ))
        }
    };

    let (start_time, end_time) = match (parse_booking_time(start_raw), parse_booking_time(end_raw))
    {
        (Some(s), Some(e)) => (s, e),
        _ => {
            return Err(BookingError::InvalidRequest(
                "Invalid time format (ISO 8601 format required)".to_string(),
            ))
        }
    };

    if end_time <= start_time {
        return Err(BookingError::InvalidRequest(
            "End time must be after start time".to_string(),
        ));
    }

    if start_time < now {
        return Err(BookingError::InvalidRequest(
            "Cannot book past time".to_string(),
        ));
    }

    if end_time - start_time > chrono::Duration::days(MAX_BOOKING_DAYS) {
        return Err(BookingError::InvalidRequest(
            "Booking period is limited to 7 days maximum".to_string(),
        ));
    }

    Ok(CreateBookingInput {
        user_id: user_id.to_string(),
        car_id: car_id.to_string(),
        start_time,
        end_time,
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Parse a booking timestamp. Accepts RFC 3339 with an offset, or a
/// zone-less `YYYY-MM-DDTHH:MM:SS` form which is taken as UTC.
fn parse_booking_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
