//! Car model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Car entity
///
/// Only the columns the booking transaction touches live here; fleet
/// management is out of scope for this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Car {
    /// Vehicle identifier
    pub car_id: String,
    /// Vehicle model name
    pub model: Option<String>,
    /// Availability status
    pub status: CarStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Car availability status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarStatus {
    /// Free to book
    Available,
    /// Currently booked out
    Rented,
    /// Out of service
    Maintenance,
}

impl CarStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CarStatus::Available => "available",
            CarStatus::Rented => "rented",
            CarStatus::Maintenance => "maintenance",
        }
    }

    /// Parse status from database string representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(CarStatus::Available),
            "rented" => Some(CarStatus::Rented),
            "maintenance" => Some(CarStatus::Maintenance),
            _ => None,
        }
    }
}

impl std::fmt::Display for CarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
