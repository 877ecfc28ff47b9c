//! Booking model
//!
//! This module provides:
//! - `Booking` entity representing a vehicle rental window
//! - `BookingStatus` enum for the rental lifecycle
//! - Input type for booking creation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Booking entity, the authorization scope for an auth session.
///
/// An auth session may only be created against a booking whose status is
/// `approved` or `active` and whose window covers "now" or starts within
/// the next 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier ("B" + 15 digits derived from creation time)
    pub booking_id: String,
    /// Booking owner
    pub user_id: String,
    /// Booked vehicle
    pub car_id: String,
    /// Rental lifecycle status
    pub status: BookingStatus,
    /// Rental window start
    pub start_time: DateTime<Utc>,
    /// Rental window end
    pub end_time: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Submitted, not yet approved
    Requested,
    /// Approved, window not necessarily started
    Approved,
    /// Rental in progress
    Active,
    /// Rental finished
    Completed,
    /// Cancelled by the user
    Cancelled,
}

impl BookingStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Requested => "requested",
            BookingStatus::Approved => "approved",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "requested" => Some(BookingStatus::Requested),
            "approved" => Some(BookingStatus::Approved),
            "active" => Some(BookingStatus::Active),
            "completed" => Some(BookingStatus::Completed),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a new booking
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingInput {
    pub user_id: String,
    pub car_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}
