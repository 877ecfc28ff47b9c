//! Database migrations module
//!
//! This module provides code-based database migrations for the Keyway access
//! platform. All migrations are embedded directly in Rust code as SQL strings,
//! supporting both SQLite and MySQL databases for single-binary deployment.
//!
//! # Usage
//!
//! ```ignore
//! use keyway::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! # Architecture
//!
//! Each migration is defined as a `Migration` struct containing:
//! - `version`: Unique version number for ordering
//! - `name`: Human-readable migration name
//! - `up_sqlite`: SQL for SQLite database
//! - `up_mysql`: SQL for MySQL database

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    /// Migration version number
    pub version: i64,
    /// Migration name/description
    pub name: String,
    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

/// All migrations for the Keyway platform.
/// These are embedded in the binary for single-binary deployment.
///
/// All timestamp columns are written by application code so that values
/// compare consistently; the SQL defaults are a fallback only.
pub const MIGRATIONS: &[Migration] = &[
    // Migration 1: Create users table
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL,
                address TEXT,
                face_id VARCHAR(16) UNIQUE,
                nfc_uid VARCHAR(32) UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_face_id ON users(face_id);
            CREATE INDEX IF NOT EXISTS idx_users_nfc_uid ON users(nfc_uid);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id VARCHAR(32) PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255) NOT NULL UNIQUE,
                phone VARCHAR(20) NOT NULL,
                address TEXT,
                face_id VARCHAR(16) UNIQUE,
                nfc_uid VARCHAR(32) UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_users_email ON users(email);
            CREATE INDEX idx_users_face_id ON users(face_id);
            CREATE INDEX idx_users_nfc_uid ON users(nfc_uid);
        "#,
    },
    // Migration 2: Create cars table with the demo vehicle
    Migration {
        version: 2,
        name: "create_cars",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS cars (
                car_id VARCHAR(32) PRIMARY KEY,
                model VARCHAR(100),
                status VARCHAR(20) NOT NULL DEFAULT 'available',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_cars_status ON cars(status);
            INSERT OR IGNORE INTO cars (car_id, model, status)
            VALUES ('CAR123', 'Demo Vehicle', 'available');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS cars (
                car_id VARCHAR(32) PRIMARY KEY,
                model VARCHAR(100),
                status VARCHAR(20) NOT NULL DEFAULT 'available',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
            CREATE INDEX idx_cars_status ON cars(status);
            INSERT IGNORE INTO cars (car_id, model, status)
            VALUES ('CAR123', 'Demo Vehicle', 'available');
        "#,
    },
    // Migration 3: Create bookings table
    // No constraint on user_id: booking creation does not look up the user
    Migration {
        version: 3,
        name: "create_bookings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS bookings (
                booking_id VARCHAR(32) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'requested',
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (car_id) REFERENCES cars(car_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_bookings_user_id ON bookings(user_id);
            CREATE INDEX IF NOT EXISTS idx_bookings_car_status ON bookings(car_id, status);
            CREATE INDEX IF NOT EXISTS idx_bookings_times ON bookings(start_time, end_time);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS bookings (
                booking_id VARCHAR(32) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'requested',
                start_time TIMESTAMP NOT NULL,
                end_time TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (car_id) REFERENCES cars(car_id) ON DELETE CASCADE
            );
            CREATE INDEX idx_bookings_user_id ON bookings(user_id);
            CREATE INDEX idx_bookings_car_status ON bookings(car_id, status);
            CREATE INDEX idx_bookings_times ON bookings(start_time, end_time);
        "#,
    },
    // Migration 4: Create ble_sessions table
    // No constraint on car_id: radio sessions may target the demo vehicle id
    // before a fleet row exists for it
    Migration {
        version: 4,
        name: "create_ble_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS ble_sessions (
                session_id VARCHAR(40) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                hashkey VARCHAR(16) NOT NULL,
                nonce VARCHAR(32) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_ble_sessions_user_car ON ble_sessions(user_id, car_id);
            CREATE INDEX IF NOT EXISTS idx_ble_sessions_expires_at ON ble_sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS ble_sessions (
                session_id VARCHAR(40) PRIMARY KEY,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                hashkey VARCHAR(16) NOT NULL,
                nonce VARCHAR(32) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );
            CREATE INDEX idx_ble_sessions_user_car ON ble_sessions(user_id, car_id);
            CREATE INDEX idx_ble_sessions_expires_at ON ble_sessions(expires_at);
        "#,
    },
    // Migration 5: Create auth_sessions table
    Migration {
        version: 5,
        name: "create_auth_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                session_id VARCHAR(40) PRIMARY KEY,
                booking_id VARCHAR(32) NOT NULL,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                face_verified BOOLEAN NOT NULL DEFAULT FALSE,
                ble_verified BOOLEAN NOT NULL DEFAULT FALSE,
                nfc_verified BOOLEAN NOT NULL DEFAULT FALSE,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (booking_id) REFERENCES bookings(booking_id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_user_car ON auth_sessions(user_id, car_id);
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_car_id ON auth_sessions(car_id);
            CREATE INDEX IF NOT EXISTS idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS auth_sessions (
                session_id VARCHAR(40) PRIMARY KEY,
                booking_id VARCHAR(32) NOT NULL,
                user_id VARCHAR(32) NOT NULL,
                car_id VARCHAR(32) NOT NULL,
                face_verified BOOLEAN NOT NULL DEFAULT FALSE,
                ble_verified BOOLEAN NOT NULL DEFAULT FALSE,
                nfc_verified BOOLEAN NOT NULL DEFAULT FALSE,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                expires_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (booking_id) REFERENCES bookings(booking_id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(user_id) ON DELETE CASCADE
            );
            CREATE INDEX idx_auth_sessions_user_car ON auth_sessions(user_id, car_id);
            CREATE INDEX idx_auth_sessions_car_id ON auth_sessions(car_id);
            CREATE INDEX idx_auth_sessions_expires_at ON auth_sessions(expires_at);
        "#,
    },
];

/// Run all pending migrations.
///
/// Creates the `_migrations` tracking table if needed, then applies every
/// migration that has not been recorded yet, in version order.
///
/// # Returns
///
/// Number of migrations applied
///
/// # Errors
///
/// Returns an error if any migration fails to apply
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

/// Create the migrations tracking table if it doesn't exist
async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

/// Get list of already applied migrations
async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.as_sqlite().unwrap()).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.as_mysql().unwrap()).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::new();
    for row in rows {
        records.push(MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        });
    }

    Ok(records)
}

/// Apply a single migration
async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => {
            apply_migration_sqlite(pool.as_sqlite().unwrap(), migration).await
        }
        DatabaseDriver::Mysql => apply_migration_mysql(pool.as_mysql().unwrap(), migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    // Execute migration SQL (may contain multiple statements)
    for statement in split_sql_statements(migration.up_sqlite) {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
        }
    }

    // Record the migration
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    // Execute migration SQL (may contain multiple statements)
    for statement in split_sql_statements(migration.up_mysql) {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
        }
    }

    // Record the migration
    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    if sql.len() > 100 {
        format!("{}...", &sql[..100])
    } else {
        sql.to_string()
    }
}

/// Split SQL into individual statements, handling comments properly
fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut current_start = 0;
    let mut in_statement = false;

    for (i, c) in sql.char_indices() {
        match c {
            ';' => {
                if in_statement {
                    let stmt = sql[current_start..i].trim();
                    if !stmt.is_empty() && !is_comment_only(stmt) {
                        statements.push(stmt);
                    }
                    in_statement = false;
                }
                current_start = i + 1;
            }
            _ if !c.is_whitespace() && !in_statement => {
                current_start = i;
                in_statement = true;
            }
            _ => {}
        }
    }

    // Handle last statement without trailing semicolon
    if in_statement {
        let stmt = sql[current_start..].trim();
        if !stmt.is_empty() && !is_comment_only(stmt) {
            statements.push(stmt);
        }
    }

    statements
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    for line in s.lines() {
        let trimmed = line.trim();
        if !trimmed.is_empty() && !trimmed.starts_with("--") {
            return false;
        }
    }
    true
}
