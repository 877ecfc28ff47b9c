//! Booking repository
//!
//! Database operations for bookings.
//!
//! Booking creation is the one write path guarded by an explicit transaction:
//! the car row is locked, overlapping bookings are scanned, and the insert
//! plus the car status flip happen atomically. MySQL uses `SELECT ... FOR
//! UPDATE`; SQLite takes the database write lock up front with
//! `BEGIN IMMEDIATE`, which serializes concurrent creates the same way.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Booking, BookingStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{MySql, MySqlPool, Row, SqliteConnection, SqlitePool, Transaction};
use std::sync::Arc;

/// Outcome of a conflict-checked booking creation
#[derive(Debug)]
pub enum BookingAttempt {
    /// Booking inserted and car marked rented
    Created(Booking),
    /// No car row with the requested id
    VehicleNotFound,
    /// Car exists but is not available
    VehicleUnavailable {
        /// Status the car currently holds
        current_status: String,
    },
    /// At least one approved or active booking overlaps the window
    Conflict {
        /// The overlapping bookings
        conflicts: Vec<BookingConflict>,
    },
}

/// Summary of a booking that blocked creation
#[derive(Debug, Clone, Serialize)]
pub struct BookingConflict {
    pub booking_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Booking repository trait
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Create a booking after locking the car row and checking for overlaps
    async fn create_checked(&self, booking: &Booking) -> Result<BookingAttempt>;

    /// Get booking by ID
    async fn get_by_id(&self, booking_id: &str) -> Result<Option<Booking>>;

    /// List a user's bookings, newest first
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>>;

    /// Find the most recent approved or active booking whose window overlaps
    /// [`ends_after`, `starts_before`]
    async fn find_active(
        &self,
        user_id: &str,
        car_id: &str,
        starts_before: DateTime<Utc>,
        ends_after: DateTime<Utc>,
    ) -> Result<Option<Booking>>;

    /// Update a booking's status
    async fn set_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// SQLx-based booking repository implementation
pub struct SqlxBookingRepository {
    pool: DynDatabasePool,
}

impl SqlxBookingRepository {
    /// Create a new SQLx booking repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BookingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BookingRepository for SqlxBookingRepository {
    async fn create_checked(&self, booking: &Booking) -> Result<BookingAttempt> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_checked_sqlite(self.pool.as_sqlite().unwrap(), booking).await
            }
            DatabaseDriver::Mysql => {
                create_checked_mysql(self.pool.as_mysql().unwrap(), booking).await
            }
        }
    }

    async fn get_by_id(&self, booking_id: &str) -> Result<Option<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_booking_by_id_sqlite(self.pool.as_sqlite().unwrap(), booking_id).await
            }
            DatabaseDriver::Mysql => {
                get_booking_by_id_mysql(self.pool.as_mysql().unwrap(), booking_id).await
            }
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_bookings_by_user_sqlite(self.pool.as_sqlite().unwrap(), user_id).await
            }
            DatabaseDriver::Mysql => {
                list_bookings_by_user_mysql(self.pool.as_mysql().unwrap(), user_id).await
            }
        }
    }

    async fn find_active(
        &self,
        user_id: &str,
        car_id: &str,
        starts_before: DateTime<Utc>,
        ends_after: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_active_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    user_id,
                    car_id,
                    starts_before,
                    ends_after,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                find_active_mysql(
                    self.pool.as_mysql().unwrap(),
                    user_id,
                    car_id,
                    starts_before,
                    ends_after,
                )
                .await
            }
        }
    }

    async fn set_status(
        &self,
        booking_id: &str,
        status: BookingStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_booking_status_sqlite(
                    self.pool.as_sqlite().unwrap(),
                    booking_id,
                    status,
                    updated_at,
                )
                .await
            }
            DatabaseDriver::Mysql => {
                set_booking_status_mysql(
                    self.pool.as_mysql().unwrap(),
                    booking_id,
                    status,
                    updated_at,
                )
                .await
            }
        }
    }
}

const CONFLICT_SCAN: &str = r#"
    SELECT booking_id, start_time, end_time
    FROM bookings
    WHERE car_id = ?
    AND status IN ('approved', 'active')
    AND (
        (start_time <= ? AND end_time > ?)
        OR (start_time < ? AND end_time >= ?)
        OR (start_time >= ? AND end_time <= ?)
    )
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_checked_sqlite(pool: &SqlitePool, booking: &Booking) -> Result<BookingAttempt> {
    let mut conn = pool
        .acquire()
        .await
        .context("Failed to acquire connection for booking creation")?;

    // Take the write lock immediately so a concurrent create cannot scan
    // for conflicts until this transaction finishes
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .context("Failed to begin booking transaction")?;

    let result = create_checked_sqlite_tx(&mut conn, booking).await;

    match result {
        Ok(BookingAttempt::Created(created)) => {
            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .context("Failed to commit booking transaction")?;
            Ok(BookingAttempt::Created(created))
        }
        other => {
            // Read-only outcomes and errors both release the write lock
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            other
        }
    }
}

async fn create_checked_sqlite_tx(
    conn: &mut SqliteConnection,
    booking: &Booking,
) -> Result<BookingAttempt> {
    let car_row = sqlx::query("SELECT status FROM cars WHERE car_id = ?")
        .bind(&booking.car_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load car for booking")?;

    let car_row = match car_row {
        Some(row) => row,
        None => return Ok(BookingAttempt::VehicleNotFound),
    };

    let current_status: String = car_row.get("status");
    if current_status != "available" {
        return Ok(BookingAttempt::VehicleUnavailable { current_status });
    }

    let conflict_rows = sqlx::query(CONFLICT_SCAN)
        .bind(&booking.car_id)
        .bind(booking.start_time)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.end_time)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to scan for booking conflicts")?;

    if !conflict_rows.is_empty() {
        let conflicts = conflict_rows
            .iter()
            .map(|row| BookingConflict {
                booking_id: row.get("booking_id"),
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
            })
            .collect();
        return Ok(BookingAttempt::Conflict { conflicts });
    }

    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO bookings (booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&booking.booking_id)
    .bind(&booking.user_id)
    .bind(&booking.car_id)
    .bind(booking.status.as_str())
    .bind(booking.start_time)
    .bind(booking.end_time)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert booking")?;

    sqlx::query("UPDATE cars SET status = 'rented', updated_at = ? WHERE car_id = ?")
        .bind(now)
        .bind(&booking.car_id)
        .execute(&mut *conn)
        .await
        .context("Failed to mark car rented")?;

    Ok(BookingAttempt::Created(Booking {
        booking_id: booking.booking_id.clone(),
        user_id: booking.user_id.clone(),
        car_id: booking.car_id.clone(),
        status: booking.status,
        start_time: booking.start_time,
        end_time: booking.end_time,
        created_at: now,
        updated_at: now,
    }))
}

async fn get_booking_by_id_sqlite(pool: &SqlitePool, booking_id: &str) -> Result<Option<Booking>> {
    let row = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE booking_id = ?
        "#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get booking by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_booking_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn list_bookings_by_user_sqlite(pool: &SqlitePool, user_id: &str) -> Result<Vec<Booking>> {
    let rows = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE user_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list bookings")?;

    let mut bookings = Vec::new();
    for row in rows {
        bookings.push(row_to_booking_sqlite(&row)?);
    }

    Ok(bookings)
}

async fn find_active_sqlite(
    pool: &SqlitePool,
    user_id: &str,
    car_id: &str,
    starts_before: DateTime<Utc>,
    ends_after: DateTime<Utc>,
) -> Result<Option<Booking>> {
    let row = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE user_id = ? AND car_id = ?
        AND status IN ('approved', 'active')
        AND start_time <= ? AND end_time >= ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(starts_before)
    .bind(ends_after)
    .fetch_optional(pool)
    .await
    .context("Failed to find active booking")?;

    match row {
        Some(row) => Ok(Some(row_to_booking_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn set_booking_status_sqlite(
    pool: &SqlitePool,
    booking_id: &str,
    status: BookingStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE booking_id = ?")
        .bind(status.as_str())
        .bind(updated_at)
        .bind(booking_id)
        .execute(pool)
        .await
        .context("Failed to update booking status")?;

    Ok(())
}

fn row_to_booking_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Booking> {
    let status_str: String = row.get("status");
    let status = BookingStatus::from_str(&status_str)
        .with_context(|| format!("Invalid booking status in database: {}", status_str))?;

    Ok(Booking {
        booking_id: row.get("booking_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        status,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_checked_mysql(pool: &MySqlPool, booking: &Booking) -> Result<BookingAttempt> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin booking transaction")?;

    let result = create_checked_mysql_tx(&mut tx, booking).await;

    match result {
        Ok(BookingAttempt::Created(created)) => {
            tx.commit()
                .await
                .context("Failed to commit booking transaction")?;
            Ok(BookingAttempt::Created(created))
        }
        other => {
            let _ = tx.rollback().await;
            other
        }
    }
}

async fn create_checked_mysql_tx(
    tx: &mut Transaction<'_, MySql>,
    booking: &Booking,
) -> Result<BookingAttempt> {
    let car_row = sqlx::query("SELECT status FROM cars WHERE car_id = ? FOR UPDATE")
        .bind(&booking.car_id)
        .fetch_optional(&mut **tx)
        .await
        .context("Failed to lock car for booking")?;

    let car_row = match car_row {
        Some(row) => row,
        None => return Ok(BookingAttempt::VehicleNotFound),
    };

    let current_status: String = car_row.get("status");
    if current_status != "available" {
        return Ok(BookingAttempt::VehicleUnavailable { current_status });
    }

    let conflict_rows = sqlx::query(CONFLICT_SCAN)
        .bind(&booking.car_id)
        .bind(booking.start_time)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(booking.end_time)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .fetch_all(&mut **tx)
        .await
        .context("Failed to scan for booking conflicts")?;

    if !conflict_rows.is_empty() {
        let conflicts = conflict_rows
            .iter()
            .map(|row| BookingConflict {
                booking_id: row.get("booking_id"),
                start_time: row.get("start_time"),
                end_time: row.get("end_time"),
            })
            .collect();
        return Ok(BookingAttempt::Conflict { conflicts });
    }

    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO bookings (booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&booking.booking_id)
    .bind(&booking.user_id)
    .bind(&booking.car_id)
    .bind(booking.status.as_str())
    .bind(booking.start_time)
    .bind(booking.end_time)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await
    .context("Failed to insert booking")?;

    sqlx::query("UPDATE cars SET status = 'rented', updated_at = ? WHERE car_id = ?")
        .bind(now)
        .bind(&booking.car_id)
        .execute(&mut **tx)
        .await
        .context("Failed to mark car rented")?;

    Ok(BookingAttempt::Created(Booking {
        booking_id: booking.booking_id.clone(),
        user_id: booking.user_id.clone(),
        car_id: booking.car_id.clone(),
        status: booking.status,
        start_time: booking.start_time,
        end_time: booking.end_time,
        created_at: now,
        updated_at: now,
    }))
}

async fn get_booking_by_id_mysql(pool: &MySqlPool, booking_id: &str) -> Result<Option<Booking>> {
    let row = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE booking_id = ?
        "#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get booking by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_booking_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn list_bookings_by_user_mysql(pool: &MySqlPool, user_id: &str) -> Result<Vec<Booking>> {
    let rows = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE user_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to list bookings")?;

    let mut bookings = Vec::new();
    for row in rows {
        bookings.push(row_to_booking_mysql(&row)?);
    }

    Ok(bookings)
}

async fn find_active_mysql(
    pool: &MySqlPool,
    user_id: &str,
    car_id: &str,
    starts_before: DateTime<Utc>,
    ends_after: DateTime<Utc>,
) -> Result<Option<Booking>> {
    let row = sqlx::query(
        r#"
        SELECT booking_id, user_id, car_id, status, start_time, end_time, created_at, updated_at
        FROM bookings
        WHERE user_id = ? AND car_id = ?
        AND status IN ('approved', 'active')
        AND start_time <= ? AND end_time >= ?
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(car_id)
    .bind(starts_before)
    .bind(ends_after)
    .fetch_optional(pool)
    .await
    .context("Failed to find active booking")?;

    match row {
        Some(row) => Ok(Some(row_to_booking_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn set_booking_status_mysql(
    pool: &MySqlPool,
    booking_id: &str,
    status: BookingStatus,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE booking_id = ?")
        .bind(status.as_str())
        .bind(updated_at)
        .bind(booking_id)
        .execute(pool)
        .await
        .context("Failed to update booking status")?;

    Ok(())
}

fn row_to_booking_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Booking> {
    let status_str: String = row.get("status");
    let status = BookingStatus::from_str(&status_str)
        .with_context(|| format!("Invalid booking status in database: {}", status_str))?;

    Ok(Booking {
        booking_id: row.get("booking_id"),
        user_id: row.get("user_id"),
        car_id: row.get("car_id"),
        status,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
