//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the persistence operations for one entity.

pub mod booking;
pub mod car;
pub mod session;
pub mod user;

pub use booking::{
    BookingAttempt, BookingConflict, BookingRepository, SqlxBookingRepository,
};
pub use car::{CarRepository, SqlxCarRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
