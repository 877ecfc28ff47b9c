//! Shared API response types
//!
//! This module contains common response structures used across multiple API
//! endpoints to ensure consistency and reduce code duplication.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::models::Booking;

/// Render a timestamp the way the platform's clients expect it:
/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Booking summary returned by booking creation
///
/// Timestamps are rendered as strings, and `updated_at` is not part of the
/// creation response.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: String,
    pub user_id: String,
    pub car_id: String,
    pub status: String,
    pub start_time: String,
    pub end_time: String,
    pub created_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: booking.booking_id,
            user_id: booking.user_id,
            car_id: booking.car_id,
            status: booking.status.to_string(),
            start_time: iso_millis(booking.start_time),
            end_time: iso_millis(booking.end_time),
            created_at: iso_millis(booking.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_iso_millis_format() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 45).unwrap();
        assert_eq!(iso_millis(at), "2025-03-01T12:30:45.000Z");
    }
}
