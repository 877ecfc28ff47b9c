//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, user_id: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Store the tap-credential identifier for a user
    async fn set_nfc_uid(&self, user_id: &str, nfc_uid: &str) -> Result<()>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_user_sqlite(self.pool.as_sqlite().unwrap(), user).await
            }
            DatabaseDriver::Mysql => create_user_mysql(self.pool.as_mysql().unwrap(), user).await,
        }
    }

    async fn get_by_id(&self, user_id: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_id_sqlite(self.pool.as_sqlite().unwrap(), user_id).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_id_mysql(self.pool.as_mysql().unwrap(), user_id).await
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_email_sqlite(self.pool.as_sqlite().unwrap(), email).await
            }
            DatabaseDriver::Mysql => {
                get_user_by_email_mysql(self.pool.as_mysql().unwrap(), email).await
            }
        }
    }

    async fn set_nfc_uid(&self, user_id: &str, nfc_uid: &str) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_nfc_uid_sqlite(self.pool.as_sqlite().unwrap(), user_id, nfc_uid).await
            }
            DatabaseDriver::Mysql => {
                set_nfc_uid_mysql(self.pool.as_mysql().unwrap(), user_id, nfc_uid).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.address)
    .bind(&user.face_id)
    .bind(&user.nfc_uid)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        user_id: user.user_id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        address: user.address.clone(),
        face_id: user.face_id.clone(),
        nfc_uid: user.nfc_uid.clone(),
        created_at: now,
        updated_at: now,
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at
        FROM users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    Ok(row.map(|row| row_to_user_sqlite(&row)))
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.map(|row| row_to_user_sqlite(&row)))
}

async fn set_nfc_uid_sqlite(pool: &SqlitePool, user_id: &str, nfc_uid: &str) -> Result<()> {
    sqlx::query("UPDATE users SET nfc_uid = ?, updated_at = ? WHERE user_id = ?")
        .bind(nfc_uid)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to set NFC UID")?;

    Ok(())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        face_id: row.get("face_id"),
        nfc_uid: row.get("nfc_uid"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.address)
    .bind(&user.face_id)
    .bind(&user.nfc_uid)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        user_id: user.user_id.clone(),
        name: user.name.clone(),
        email: user.email.clone(),
        phone: user.phone.clone(),
        address: user.address.clone(),
        face_id: user.face_id.clone(),
        nfc_uid: user.nfc_uid.clone(),
        created_at: now,
        updated_at: now,
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, user_id: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at
        FROM users
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by ID")?;

    Ok(row.map(|row| row_to_user_mysql(&row)))
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, name, email, phone, address, face_id, nfc_uid, created_at, updated_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by email")?;

    Ok(row.map(|row| row_to_user_mysql(&row)))
}

async fn set_nfc_uid_mysql(pool: &MySqlPool, user_id: &str, nfc_uid: &str) -> Result<()> {
    sqlx::query("UPDATE users SET nfc_uid = ?, updated_at = ? WHERE user_id = ?")
        .bind(nfc_uid)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to set NFC UID")?;

    Ok(())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        address: row.get("address"),
        face_id: row.get("face_id"),
        nfc_uid: row.get("nfc_uid"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
