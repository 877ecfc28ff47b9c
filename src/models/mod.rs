//! Data models for Keyway
//!
//! This module contains all the core data structures used throughout
//! the application.

pub mod booking;
pub mod car;
pub mod session;
pub mod user;

pub use booking::{Booking, BookingStatus, CreateBookingInput};
pub use car::{Car, CarStatus};
pub use session::{AuthSession, AuthStatus, AuthStep, BleSession};
pub use user::{CreateUserInput, User};
