//! Session service
//!
//! Business logic for the multi-factor access protocol:
//! - Radio handshake issuance with reuse of fresh sessions
//! - Auth session bootstrap, gated on a qualifying booking
//! - Bulk result reporting from the vehicle
//! - Incremental tap-credential verification with step ordering
//!
//! Every lookup the service performs excludes expired rows. Expired
//! sessions are never transitioned or deleted by the protocol itself;
//! `cleanup_expired` exists as a separate maintenance operation.

use crate::db::repositories::{BookingRepository, SessionRepository, UserRepository};
use crate::models::{AuthSession, AuthStatus, AuthStep, BleSession};
use crate::services::credentials::{
    derive_hashkey, generate_nonce, generate_session_id, is_valid_nfc_uid, AUTH_SESSION_PREFIX,
    BLE_SESSION_PREFIX,
};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Default session lifetime in minutes, for both session kinds
const DEFAULT_SESSION_TTL_MINUTES: i64 = 10;

/// How far ahead a booking may start and still admit an auth session
const BOOKING_LOOKAHEAD_HOURS: i64 = 24;

/// Error types for session service operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// User does not exist, or has no stored tap credential where one is required
    #[error("User not found")]
    UserNotFound,

    /// No booking qualifies the user for a session on this car
    #[error("No active or upcoming booking found for this user and car (within 24 hours)")]
    NoActiveBooking,

    /// Bulk report targeted a session that does not exist for this car
    #[error("Session not found")]
    SessionNotFound,

    /// Tap verification found no live session for the (user, car) pair
    #[error("No active session found for this user_id and car_id")]
    ActiveSessionNotFound,

    /// Presented tap credential is not 32 hex characters
    #[error("NFC UID must be 32 hex characters")]
    InvalidUidFormat,

    /// Presented tap credential differs from the stored one
    #[error("NFC UID does not match")]
    UidMismatch,

    /// Earlier factors have not all passed yet
    #[error("Face or BLE authentication is not yet completed")]
    StepsIncomplete {
        /// The factors that have already passed, in face/ble order
        completed: Vec<AuthStep>,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Everything the session bootstrap hands back to the phone
#[derive(Debug, Clone)]
pub struct SessionBootstrap {
    /// The freshly created auth session
    pub session: AuthSession,
    /// Handshake key from the effective radio session
    pub hashkey: String,
    /// The user's stored tap credential, if one is registered
    pub nfc_uid: Option<String>,
}

/// Outcome of a bulk result report
#[derive(Debug, Clone)]
pub struct MfaOutcome {
    pub session_id: String,
    /// True when all three factors were reported verified
    pub passed: bool,
    /// Factor names that were reported false, in face/ble/nfc order
    pub failed_steps: Vec<AuthStep>,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of a successful incremental tap verification
#[derive(Debug, Clone)]
pub struct TapOutcome {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Session service coordinating users, bookings, and both session tables
pub struct SessionService {
    user_repo: Arc<dyn UserRepository>,
    booking_repo: Arc<dyn BookingRepository>,
    session_repo: Arc<dyn SessionRepository>,
    ttl_minutes: i64,
}

impl SessionService {
    /// Create a new session service with the default session lifetime
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            booking_repo,
            session_repo,
            ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
        }
    }

    /// Create a new session service with a custom session lifetime
    pub fn with_session_ttl(
        user_repo: Arc<dyn UserRepository>,
        booking_repo: Arc<dyn BookingRepository>,
        session_repo: Arc<dyn SessionRepository>,
        ttl_minutes: i64,
    ) -> Self {
        Self {
            user_repo,
            booking_repo,
            session_repo,
            ttl_minutes,
        }
    }

    /// Issue a radio handshake for a (user, car) pair.
    ///
    /// Returns the most recent non-expired radio session if one exists,
    /// otherwise generates a nonce, derives the handshake key, and inserts a
    /// new session. The returned hashkey is valid for the remainder of its
    /// lifetime at return time.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user does not exist
    /// - `InternalError` for database errors
    pub async fn issue_handshake(
        &self,
        user_id: &str,
        car_id: &str,
    ) -> Result<BleSession, SessionError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        self.get_or_create_handshake(user_id, car_id, Utc::now())
            .await
    }

    /// Bootstrap an auth session for a (user, car) pair.
    ///
    /// Order matters: the booking gate runs before any session row is
    /// written, so a request without a qualifying booking leaves no trace in
    /// either session table. A booking qualifies when its status is approved
    /// or active, it starts within the next 24 hours, and it has not ended.
    ///
    /// On success a radio session is reused or created, and a new auth
    /// session is inserted with all factor flags false.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user does not exist
    /// - `NoActiveBooking` if no booking qualifies
    /// - `InternalError` for database errors
    pub async fn bootstrap(
        &self,
        user_id: &str,
        car_id: &str,
    ) -> Result<SessionBootstrap, SessionError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        let now = Utc::now();
        let booking = self
            .booking_repo
            .find_active(
                user_id,
                car_id,
                now + Duration::hours(BOOKING_LOOKAHEAD_HOURS),
                now,
            )
            .await
            .context("Failed to look up booking")?
            .ok_or(SessionError::NoActiveBooking)?;

        let handshake = self.get_or_create_handshake(user_id, car_id, now).await?;

        let session = AuthSession {
            session_id: generate_session_id(AUTH_SESSION_PREFIX),
            booking_id: booking.booking_id,
            user_id: user_id.to_string(),
            car_id: car_id.to_string(),
            face_verified: false,
            ble_verified: false,
            nfc_verified: false,
            status: AuthStatus::Active,
            created_at: now,
            expires_at: now + Duration::minutes(self.ttl_minutes),
            updated_at: now,
        };

        let created = self
            .session_repo
            .create_auth(&session)
            .await
            .context("Failed to create auth session")?;

        tracing::info!(
            user_id,
            car_id,
            session_id = %created.session_id,
            "Auth session created"
        );

        Ok(SessionBootstrap {
            session: created,
            hashkey: handshake.hashkey,
            nfc_uid: user.nfc_uid,
        })
    }

    /// Apply a bulk result report to a session.
    ///
    /// The report is an authoritative snapshot: all three flags are written
    /// exactly as given, with no ordering requirement and no status gate, so
    /// re-reporting overwrites an earlier outcome. The session status
    /// becomes completed when all three flags are true, failed otherwise.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` if no live session matches the id and car
    /// - `InternalError` for database errors
    pub async fn report_result(
        &self,
        session_id: &str,
        car_id: &str,
        face_verified: bool,
        ble_verified: bool,
        nfc_verified: bool,
    ) -> Result<MfaOutcome, SessionError> {
        let now = Utc::now();
        let session = self
            .session_repo
            .find_auth_for_car(session_id, car_id, now)
            .await
            .context("Failed to look up auth session")?
            .ok_or(SessionError::SessionNotFound)?;

        let passed = face_verified && ble_verified && nfc_verified;
        let status = if passed {
            AuthStatus::Completed
        } else {
            AuthStatus::Failed
        };

        let mut failed_steps = Vec::new();
        if !face_verified {
            failed_steps.push(AuthStep::Face);
        }
        if !ble_verified {
            failed_steps.push(AuthStep::Ble);
        }
        if !nfc_verified {
            failed_steps.push(AuthStep::Nfc);
        }

        self.session_repo
            .apply_result(
                &session.session_id,
                face_verified,
                ble_verified,
                nfc_verified,
                status,
                now,
            )
            .await
            .context("Failed to apply auth result")?;

        tracing::info!(
            session_id = %session.session_id,
            car_id,
            passed,
            "Auth result recorded"
        );

        Ok(MfaOutcome {
            session_id: session.session_id,
            passed,
            failed_steps,
            timestamp: now,
        })
    }

    /// Verify the tap credential as the final factor of the staged flow.
    ///
    /// The credential check runs against the user record before any session
    /// is consulted, so a spoofed UID fails even when no session exists.
    /// Ordering is a hard precondition: the tap factor can only complete
    /// after face and radio verification have both passed.
    ///
    /// # Errors
    ///
    /// - `InvalidUidFormat` if the presented UID is not 32 hex characters
    /// - `UserNotFound` if the user does not exist or has no stored credential
    /// - `UidMismatch` if the presented UID differs from the stored one
    /// - `ActiveSessionNotFound` if no live session exists for the pair
    /// - `StepsIncomplete` if face or radio verification is still missing
    /// - `InternalError` for database errors
    pub async fn verify_tap(
        &self,
        user_id: &str,
        nfc_uid: &str,
        car_id: &str,
    ) -> Result<TapOutcome, SessionError> {
        if !is_valid_nfc_uid(nfc_uid) {
            return Err(SessionError::InvalidUidFormat);
        }

        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to look up user")?
            .ok_or(SessionError::UserNotFound)?;

        let stored = user.nfc_uid.ok_or(SessionError::UserNotFound)?;
        if stored != nfc_uid {
            return Err(SessionError::UidMismatch);
        }

        let now = Utc::now();
        let session = self
            .session_repo
            .find_latest_auth(user_id, car_id, now)
            .await
            .context("Failed to look up auth session")?
            .ok_or(SessionError::ActiveSessionNotFound)?;

        if !session.face_verified || !session.ble_verified {
            let mut completed = Vec::new();
            if session.face_verified {
                completed.push(AuthStep::Face);
            }
            if session.ble_verified {
                completed.push(AuthStep::Ble);
            }
            return Err(SessionError::StepsIncomplete { completed });
        }

        self.session_repo
            .mark_nfc_verified(&session.session_id, now)
            .await
            .context("Failed to mark tap factor verified")?;

        Ok(TapOutcome {
            session_id: session.session_id,
            timestamp: now,
        })
    }

    /// Delete all expired session rows from both tables.
    ///
    /// Maintenance operation, not part of the protocol. Returns the number
    /// of rows deleted.
    pub async fn cleanup_expired(&self) -> Result<u64, SessionError> {
        let count = self
            .session_repo
            .delete_expired(Utc::now())
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    /// Return the freshest live radio session, or insert a new one.
    ///
    /// Two concurrent callers may both miss the lookup and both insert; the
    /// later read then settles on the most recent row. Both keys stay valid
    /// for their lifetime, so the race costs one extra row, nothing more.
    async fn get_or_create_handshake(
        &self,
        user_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<BleSession, SessionError> {
        if let Some(existing) = self
            .session_repo
            .find_fresh_ble(user_id, car_id, now)
            .await
            .context("Failed to look up radio session")?
        {
            return Ok(existing);
        }

        let nonce = generate_nonce();
        let hashkey = derive_hashkey(user_id, car_id, &nonce);
        let session = BleSession {
            session_id: generate_session_id(BLE_SESSION_PREFIX),
            user_id: user_id.to_string(),
            car_id: car_id.to_string(),
            hashkey,
            nonce,
            created_at: now,
            expires_at: now + Duration::minutes(self.ttl_minutes),
        };

        let created = self
            .session_repo
            .create_ble(&session)
            .await
            .context("Failed to create radio session")?;

        Ok(created)
    }
}
