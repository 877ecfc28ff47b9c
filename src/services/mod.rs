//! Services layer - Business logic
//!
//! This module contains all business logic services for the Keyway access
//! platform. Services are responsible for:
//! - Implementing protocol rules (booking gate, factor ordering, expiry)
//! - Coordinating between repositories
//! - Handling validation and error cases

pub mod booking;
pub mod credentials;
pub mod registration;
pub mod session;

pub use booking::{BookingError, BookingRequest, BookingService};
pub use credentials::{
    derive_face_id, derive_hashkey, derive_nfc_uid, generate_booking_id, generate_nonce,
    generate_session_id, generate_user_id, is_valid_nfc_uid,
};
pub use registration::{FaceRegistration, RegistrationError, RegistrationService, UserRequest};
pub use session::{MfaOutcome, SessionBootstrap, SessionError, SessionService, TapOutcome};
