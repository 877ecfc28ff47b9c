//! Session repository
//!
//! Database operations for short-range radio sessions and multi-factor auth
//! sessions. Every lookup excludes expired rows; callers pass the comparison
//! instant so expiry stays testable. Expired rows are never updated, they
//! simply become unreachable.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{AuthSession, AuthStatus, BleSession};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait covering both session tables
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Find the most recent non-expired radio session for a (user, car) pair
    async fn find_fresh_ble(
        &self,
        user_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BleSession>>;

    /// Insert a new radio session
    async fn create_ble(&self, session: &BleSession) -> Result<BleSession>;

    /// Insert a new auth session
    async fn create_auth(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Find a non-expired auth session by id, scoped to one car
    async fn find_auth_for_car(
        &self,
        session_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSession>>;

    /// Find the most recent non-expired auth session for a (user, car) pair.
    /// Terminal sessions are still returned; only expiry filters.
    async fn find_latest_auth(
        &self,
        user_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSession>>;

    /// Overwrite all three factor flags and the status on one auth session
    async fn apply_result(
        &self,
        session_id: &str,
        face_verified: bool,
        ble_verified: bool,
        nfc_verified: bool,
        status: AuthStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Set the tap factor verified and complete the session
    async fn mark_nfc_verified(&self, session_id: &str, updated_at: DateTime<Utc>) -> Result<()>;

    /// Delete expired rows from both session tables, returning the count.
    /// Maintenance operation; the protocol itself never deletes.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn find_fresh_ble(
        &self,
        user_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BleSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_fresh_ble_sqlite(self.pool.as_sqlite().unwrap(), user_id, car_id, now).await
            }
            DatabaseDriver::Mysql => {
                find_fresh_ble_mysql(self.pool.as_mysql().unwrap(), user_id, car_id, now).await
            }
        }
    }

    async fn create_ble(&self, session: &BleSession) -> Result<BleSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_ble_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => create_ble_mysql(self.pool.as_mysql().unwrap(), session).await,
        }
    }

    async fn create_auth(&self, session: &AuthSession) -> Result<AuthSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_auth_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                create_auth_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn find_auth_for_car(
        &self,
        session_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_auth_for_car_sqlite(self.pool.as_sqlite().unwrap(), session_id, car_id, now)
                    .await
            }
            DatabaseDriver::Mysql => {
                find_auth_for_car_mysql(self.pool.as_mysql().unwrap(), session_id, car_id, now)
                    .await
            }
        }
    }

    async fn find_latest_auth(
        &self,
        user_id: &str,
        car_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AuthSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_latest_auth_sqlite(self.pool.as_sqlite().unwrap(), user_id, car_id, now).await
            }
            DatabaseDriver::Mysql => {
                find_latest_auth_mysql(self.pool.as_mysql().unwrap(), user_id, car_id, now).await
            }
        }
    }

    async fn apply_result(
        &self,
        session_id: &str,
        face_verified: bool,
        ble_verified: bool,
        nfc_verified: bool,
        status: AuthStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                apply_result_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    session_id,
                    face_verified,
                    ble_verified,
                    nfc_verified,
                    status,
                    updated_at,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                apply_result_mysql(
                    self.pool.as_mysql().unwrap(),
                    session_id,
                    face_verified,
                    ble_verified,
                    nfc_verified,
                    status,
                    updated_at,
                )
                .await
            }
        }
    }

    async fn mark_nfc_verified(&self, session_id: &str, updated_at: DateTime<Utc>) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                mark_nfc_verified_sqlite(self.pool.as_sqlite().unwrap(), session_id, updated_at)
                    .await
            }
            DatabaseDriver::Mysql => {
                mark_nfc_verified_mysql(self.pool.as_mysql().unwrap(), session_id, updated_at)
                    .await
            }
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                delete_expired_sqlite(self.pool.as_sqlite().unwrap(), now).await
            }
            DatabaseDriver::Mysql => delete_expired_mysql(self.pool.as_mysql().unwrap(), now).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn find_fresh_ble_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<BleSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, user_id, car_id, hashkey, nonce, created_at, expires_at
        FROM ble_sessions
        WHERE user_id = ? AND car_id = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find radio session")?;

    Ok(row.map(|row| row_to_ble_sqlite(&row)))
}

async fn create_ble_sqlite(pool: &SqlitePool, session: &BleSession) -> Result<BleSession> {
    sqlx::query(
        r#"
        INSERT INTO ble_sessions (session_id, user_id, car_id, hashkey, nonce, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.session_id)
    .bind(&session.user_id)
    .bind(&session.car_id)
    .bind(&session.hashkey)
    .bind(&session.nonce)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .context("Failed to create radio session")?;

    Ok(session.clone())
}

async fn create_auth_sqlite(pool: &SqlitePool, session: &AuthSession) -> Result<AuthSession> {
    sqlx::query(
        r#"
        INSERT INTO auth_sessions
        (session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
         status, created_at, expires_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.session_id)
    .bind(&session.booking_id)
    .bind(&session.user_id)
    .bind(&session.car_id)
    .bind(session.face_verified)
    .bind(session.ble_verified)
    .bind(session.nfc_verified)
    .bind(session.status.as_str())
    .bind(session.created_at)
    .bind(session.expires_at)
    .bind(session.updated_at)
    .execute(pool)
    .await
    .context("Failed to create auth session")?;

    Ok(session.clone())
}

async fn find_auth_for_car_sqlite(
    pool: &SqlitePool,
    session_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
               status, created_at, expires_at, updated_at
        FROM auth_sessions
        WHERE session_id = ? AND car_id = ? AND expires_at > ?
        "#,
    )
    .bind(session_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find auth session")?;

    match row {
        Some(row) => Ok(Some(row_to_auth_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn find_latest_auth_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
               status, created_at, expires_at, updated_at
        FROM auth_sessions
        WHERE user_id = ? AND car_id = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find latest auth session")?;

    match row {
        Some(row) => Ok(Some(row_to_auth_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn apply_result_sqlite(
    pool: &SqlitePool,
    session_id: &str,
    face_verified: bool,
    ble_verified: bool,
    nfc_verified: bool,
    status: AuthStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE auth_sessions
        SET face_verified = ?, ble_verified = ?, nfc_verified = ?, status = ?, updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(face_verified)
    .bind(ble_verified)
    .bind(nfc_verified)
    .bind(status.as_str())
    .bind(updated_at)
    .bind(session_id)
    .execute(pool)
    .await
    .context("Failed to apply auth result")?;

    Ok(())
}

async fn mark_nfc_verified_sqlite(
    pool: &SqlitePool,
    session_id: &str,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE auth_sessions
        SET nfc_verified = TRUE, status = 'completed', updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(updated_at)
    .bind(session_id)
    .execute(pool)
    .await
    .context("Failed to mark tap factor verified")?;

    Ok(())
}

async fn delete_expired_sqlite(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
    let ble = sqlx::query("DELETE FROM ble_sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired radio sessions")?;

    let auth = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired auth sessions")?;

    Ok(ble.rows_affected() + auth.rows_affected())
}

fn row_to_ble_sqlite(row: &sqlx::sqlite::SqliteRow) -> BleSession {
    BleSession {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        hashkey: row.get("hashkey"),
        nonce: row.get("nonce"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn row_to_auth_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<AuthSession> {
    let status_str: String = row.get("status");
    let status = AuthStatus::from_str(&status_str)
        .with_context(|| format!("Invalid auth session status in database: {}", status_str))?;

    Ok(AuthSession {
        session_id: row.get("session_id"),
        booking_id: row.get("booking_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        face_verified: row.get("face_verified"),
        ble_verified: row.get("ble_verified"),
        nfc_verified: row.get("nfc_verified"),
        status,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn find_fresh_ble_mysql(
    pool: &MySqlPool,
    user_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<BleSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, user_id, car_id, hashkey, nonce, created_at, expires_at
        FROM ble_sessions
        WHERE user_id = ? AND car_id = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find radio session")?;

    Ok(row.map(|row| row_to_ble_mysql(&row)))
}

async fn create_ble_mysql(pool: &MySqlPool, session: &BleSession) -> Result<BleSession> {
    sqlx::query(
        r#"
        INSERT INTO ble_sessions (session_id, user_id, car_id, hashkey, nonce, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.session_id)
    .bind(&session.user_id)
    .bind(&session.car_id)
    .bind(&session.hashkey)
    .bind(&session.nonce)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await
    .context("Failed to create radio session")?;

    Ok(session.clone())
}

async fn create_auth_mysql(pool: &MySqlPool, session: &AuthSession) -> Result<AuthSession> {
    sqlx::query(
        r#"
        INSERT INTO auth_sessions
        (session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
         status, created_at, expires_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.session_id)
    .bind(&session.booking_id)
    .bind(&session.user_id)
    .bind(&session.car_id)
    .bind(session.face_verified)
    .bind(session.ble_verified)
    .bind(session.nfc_verified)
    .bind(session.status.as_str())
    .bind(session.created_at)
    .bind(session.expires_at)
    .bind(session.updated_at)
    .execute(pool)
    .await
    .context("Failed to create auth session")?;

    Ok(session.clone())
}

async fn find_auth_for_car_mysql(
    pool: &MySqlPool,
    session_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
               status, created_at, expires_at, updated_at
        FROM auth_sessions
        WHERE session_id = ? AND car_id = ? AND expires_at > ?
        "#,
    )
    .bind(session_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find auth session")?;

    match row {
        Some(row) => Ok(Some(row_to_auth_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn find_latest_auth_mysql(
    pool: &MySqlPool,
    user_id: &str,
    car_id: &str,
    now: DateTime<Utc>,
) -> Result<Option<AuthSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, booking_id, user_id, car_id, face_verified, ble_verified, nfc_verified,
               status, created_at, expires_at, updated_at
        FROM auth_sessions
        WHERE user_id = ? AND car_id = ? AND expires_at > ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(now)
    .fetch_optional(pool)
    .await
    .context("Failed to find latest auth session")?;

    match row {
        Some(row) => Ok(Some(row_to_auth_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn apply_result_mysql(
    pool: &MySqlPool,
    session_id: &str,
    face_verified: bool,
    ble_verified: bool,
    nfc_verified: bool,
    status: AuthStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE auth_sessions
        SET face_verified = ?, ble_verified = ?, nfc_verified = ?, status = ?, updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(face_verified)
    .bind(ble_verified)
    .bind(nfc_verified)
    .bind(status.as_str())
    .bind(updated_at)
    .bind(session_id)
    .execute(pool)
    .await
    .context("Failed to apply auth result")?;

    Ok(())
}

async fn mark_nfc_verified_mysql(
    pool: &MySqlPool,
    session_id: &str,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE auth_sessions
        SET nfc_verified = TRUE, status = 'completed', updated_at = ?
        WHERE session_id = ?
        "#,
    )
    .bind(updated_at)
    .bind(session_id)
    .execute(pool)
    .await
    .context("Failed to mark tap factor verified")?;

    Ok(())
}

async fn delete_expired_mysql(pool: &MySqlPool, now: DateTime<Utc>) -> Result<u64> {
    let ble = sqlx::query("DELETE FROM ble_sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired radio sessions")?;

    let auth = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to delete expired auth sessions")?;

    Ok(ble.rows_affected() + auth.rows_affected())
}

fn row_to_ble_mysql(row: &sqlx::mysql::MySqlRow) -> BleSession {
    BleSession {
        session_id: row.get("session_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        hashkey: row.get("hashkey"),
        nonce: row.get("nonce"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

fn row_to_auth_mysql(row: &sqlx::mysql::MySqlRow) -> Result<AuthSession> {
    let status_str: String = row.get("status");
    let status = AuthStatus::from_str(&status_str)
        .with_context(|| format!("Invalid auth session status in database: {}", status_str))?;

    Ok(AuthSession {
        session_id: row.get("session_id"),
        booking_id: row.get("booking_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        face_verified: row.get("face_verified"),
        ble_verified: row.get("ble_verified"),
        nfc_verified: row.get("nfc_verified"),
        status,
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSessionRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        seed_base_rows(&pool).await;
        let repo = SqlxSessionRepository::new(pool.clone());
        (pool, repo)
    }

    async fn seed_base_rows(pool: &DynDatabasePool) {
        pool.execute(
            "INSERT INTO users (user_id, name, email, phone) \
             VALUES ('U00000000000001', 'Test User', 'sessions@example.com', '010-1234-5678')",
        )
        .await
        .expect("Failed to seed user");
        pool.execute(
            "INSERT INTO cars (car_id, model, status) VALUES ('CAR700', 'Test Model', 'available')",
        )
        .await
        .expect("Failed to seed car");
        pool.execute(
            "INSERT INTO bookings (booking_id, user_id, car_id, status, start_time, end_time) \
             VALUES ('B000000000000700', 'U00000000000001', 'CAR700', 'approved', \
                     '2026-01-01 00:00:00', '2099-01-01 00:00:00')",
        )
        .await
        .expect("Failed to seed booking");
    }

    fn ble_session(session_id: &str, expires_in_minutes: i64) -> BleSession {
        let now = Utc::now();
        BleSession {
            session_id: session_id.to_string(),
            user_id: "U00000000000001".to_string(),
            car_id: "CAR700".to_string(),
            hashkey: "0123456789ABCDEF".to_string(),
            nonce: "0123456789ABCDEF0123456789ABCDEF".to_string(),
            created_at: now,
            expires_at: now + Duration::minutes(expires_in_minutes),
        }
    }

    fn auth_session(session_id: &str, expires_in_minutes: i64) -> AuthSession {
        let now = Utc::now();
        AuthSession {
            session_id: session_id.to_string(),
            booking_id: "B000000000000700".to_string(),
            user_id: "U00000000000001".to_string(),
            car_id: "CAR700".to_string(),
            face_verified: false,
            ble_verified: false,
            nfc_verified: false,
            status: AuthStatus::Active,
            created_at: now,
            expires_at: now + Duration::minutes(expires_in_minutes),
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_find_fresh_ble() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_ble(&ble_session("BLE_000000000000000000000001", 10))
            .await
            .expect("Failed to create session");

        let found = repo
            .find_fresh_ble("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert_eq!(found.session_id, "BLE_000000000000000000000001");
        assert_eq!(found.hashkey, "0123456789ABCDEF");
    }

    #[tokio::test]
    async fn test_find_fresh_ble_ignores_expired() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_ble(&ble_session("BLE_000000000000000000000002", -5))
            .await
            .expect("Failed to create session");

        let found = repo
            .find_fresh_ble("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_fresh_ble_picks_most_recent() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_ble(&ble_session("BLE_000000000000000000000003", 10))
            .await
            .expect("Failed to create session");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        repo.create_ble(&ble_session("BLE_000000000000000000000004", 10))
            .await
            .expect("Failed to create session");

        let found = repo
            .find_fresh_ble("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert_eq!(found.session_id, "BLE_000000000000000000000004");
    }

    #[tokio::test]
    async fn test_create_auth_and_find_for_car() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_auth(&auth_session("AUTH_00000000000000000000001", 10))
            .await
            .expect("Failed to create session");

        let found = repo
            .find_auth_for_car("AUTH_00000000000000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert_eq!(found.status, AuthStatus::Active);
        assert!(!found.face_verified);

        let wrong_car = repo
            .find_auth_for_car("AUTH_00000000000000000000001", "CAR999", Utc::now())
            .await
            .expect("Failed to find session");
        assert!(wrong_car.is_none());
    }

    #[tokio::test]
    async fn test_find_auth_for_car_excludes_expired() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_auth(&auth_session("AUTH_00000000000000000000002", -5))
            .await
            .expect("Failed to create session");

        let found = repo
            .find_auth_for_car("AUTH_00000000000000000000002", "CAR700", Utc::now())
            .await
            .expect("Failed to find session");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_find_latest_auth_returns_terminal_sessions() {
        let (_pool, repo) = setup_test_repo().await;
        let mut session = auth_session("AUTH_00000000000000000000003", 10);
        session.status = AuthStatus::Completed;
        session.face_verified = true;
        session.ble_verified = true;
        session.nfc_verified = true;
        repo.create_auth(&session).await.expect("Failed to create session");

        // The latest-session lookup filters only by expiry, not status
        let found = repo
            .find_latest_auth("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert_eq!(found.status, AuthStatus::Completed);
    }

    #[tokio::test]
    async fn test_apply_result_overwrites_flags() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_auth(&auth_session("AUTH_00000000000000000000004", 10))
            .await
            .expect("Failed to create session");

        repo.apply_result(
            "AUTH_00000000000000000000004",
            true,
            true,
            false,
            AuthStatus::Failed,
            Utc::now(),
        )
        .await
        .expect("Failed to apply result");

        let found = repo
            .find_auth_for_car("AUTH_00000000000000000000004", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert!(found.face_verified);
        assert!(found.ble_verified);
        assert!(!found.nfc_verified);
        assert_eq!(found.status, AuthStatus::Failed);
    }

    #[tokio::test]
    async fn test_mark_nfc_verified_completes_session() {
        let (_pool, repo) = setup_test_repo().await;
        let mut session = auth_session("AUTH_00000000000000000000005", 10);
        session.face_verified = true;
        session.ble_verified = true;
        repo.create_auth(&session).await.expect("Failed to create session");

        repo.mark_nfc_verified("AUTH_00000000000000000000005", Utc::now())
            .await
            .expect("Failed to mark verified");

        let found = repo
            .find_latest_auth("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session")
            .expect("Session not found");
        assert!(found.nfc_verified);
        assert_eq!(found.status, AuthStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_expired_spares_fresh_rows() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create_ble(&ble_session("BLE_000000000000000000000005", -5))
            .await
            .expect("Failed to create session");
        repo.create_ble(&ble_session("BLE_000000000000000000000006", 10))
            .await
            .expect("Failed to create session");
        repo.create_auth(&auth_session("AUTH_00000000000000000000006", -5))
            .await
            .expect("Failed to create session");

        let deleted = repo
            .delete_expired(Utc::now())
            .await
            .expect("Failed to delete expired");
        assert_eq!(deleted, 2);

        let fresh = repo
            .find_fresh_ble("U00000000000001", "CAR700", Utc::now())
            .await
            .expect("Failed to find session");
        assert!(fresh.is_some());
    }
}
