//! Car repository
//!
//! Database operations for the vehicle fleet. Booking creation locks and
//! updates car rows inside its own transaction; this repository covers the
//! non-transactional reads and the status flip on cancellation.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Car, CarStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Car repository trait
#[async_trait]
pub trait CarRepository: Send + Sync {
    /// Create a new car
    async fn create(&self, car: &Car) -> Result<Car>;

    /// Get car by ID
    async fn get_by_id(&self, car_id: &str) -> Result<Option<Car>>;

    /// Update a car's availability status
    async fn set_status(&self, car_id: &str, status: CarStatus) -> Result<()>;
}

/// SQLx-based car repository implementation
pub struct SqlxCarRepository {
    pool: DynDatabasePool,
}

impl SqlxCarRepository {
    /// Create a new SQLx car repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CarRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CarRepository for SqlxCarRepository {
    async fn create(&self, car: &Car) -> Result<Car> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_car_sqlite(self.pool.as_sqlite().unwrap(), car).await,
            DatabaseDriver::Mysql => create_car_mysql(self.pool.as_mysql().unwrap(), car).await,
        }
    }

    async fn get_by_id(&self, car_id: &str) -> Result<Option<Car>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_car_by_id_sqlite(self.pool.as_sqlite().unwrap(), car_id).await
            }
            DatabaseDriver::Mysql => {
                get_car_by_id_mysql(self.pool.as_mysql().unwrap(), car_id).await
            }
        }
    }

    async fn set_status(&self, car_id: &str, status: CarStatus) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                set_car_status_sqlite(self.pool.as_sqlite().unwrap(), car_id, status).await
            }
            DatabaseDriver::Mysql => {
                set_car_status_mysql(self.pool.as_mysql().unwrap(), car_id, status).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_car_sqlite(pool: &SqlitePool, car: &Car) -> Result<Car> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO cars (car_id, model, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&car.car_id)
    .bind(&car.model)
    .bind(car.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create car")?;

    Ok(Car {
        car_id: car.car_id.clone(),
        model: car.model.clone(),
        status: car.status,
        created_at: now,
        updated_at: now,
    })
}

async fn get_car_by_id_sqlite(pool: &SqlitePool, car_id: &str) -> Result<Option<Car>> {
    let row = sqlx::query(
        r#"
        SELECT car_id, model, status, created_at, updated_at
        FROM cars
        WHERE car_id = ?
        "#,
    )
    .bind(car_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get car by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_car_sqlite(&row)?)),
        None => Ok(None),
    }
}

async fn set_car_status_sqlite(pool: &SqlitePool, car_id: &str, status: CarStatus) -> Result<()> {
    sqlx::query("UPDATE cars SET status = ?, updated_at = ? WHERE car_id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(car_id)
        .execute(pool)
        .await
        .context("Failed to update car status")?;

    Ok(())
}

fn row_to_car_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Car> {
    let status_str: String = row.get("status");
    let status = CarStatus::from_str(&status_str)
        .with_context(|| format!("Invalid car status in database: {}", status_str))?;

    Ok(Car {
        car_id: row.get("car_id"),
        model: row.get("model"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_car_mysql(pool: &MySqlPool, car: &Car) -> Result<Car> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO cars (car_id, model, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&car.car_id)
    .bind(&car.model)
    .bind(car.status.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create car")?;

    Ok(Car {
        car_id: car.car_id.clone(),
        model: car.model.clone(),
        status: car.status,
        created_at: now,
        updated_at: now,
    })
}

async fn get_car_by_id_mysql(pool: &MySqlPool, car_id: &str) -> Result<Option<Car>> {
    let row = sqlx::query(
        r#"
        SELECT car_id, model, status, created_at, updated_at
        FROM cars
        WHERE car_id = ?
        "#,
    )
    .bind(car_id)
    .fetch_optional(pool)
    .await
    .context("Failed to get car by ID")?;

    match row {
        Some(row) => Ok(Some(row_to_car_mysql(&row)?)),
        None => Ok(None),
    }
}

async fn set_car_status_mysql(pool: &MySqlPool, car_id: &str, status: CarStatus) -> Result<()> {
    sqlx::query("UPDATE cars SET status = ?, updated_at = ? WHERE car_id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(car_id)
        .execute(pool)
        .await
        .context("Failed to update car status")?;

    Ok(())
}

fn row_to_car_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Car> {
    let status_str: String = row.get("status");
    let status = CarStatus::from_str(&status_str)
        .with_context(|| format!("Invalid car status in database: {}", status_str))?;

    Ok(Car {
        car_id: row.get("car_id"),
        model: row.get("model"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCarRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxCarRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_car(car_id: &str) -> Car {
        let now = Utc::now();
        Car {
            car_id: car_id.to_string(),
            model: Some("Ioniq 5".to_string()),
            status: CarStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_car() {
        let (_pool, repo) = setup_test_repo().await;

        repo.create(&test_car("CAR900")).await.expect("Failed to create car");

        let found = repo
            .get_by_id("CAR900")
            .await
            .expect("Failed to get car")
            .expect("Car not found");
        assert_eq!(found.model.as_deref(), Some("Ioniq 5"));
        assert_eq!(found.status, CarStatus::Available);
    }

    #[tokio::test]
    async fn test_get_car_not_found() {
        let (_pool, repo) = setup_test_repo().await;

        let found = repo.get_by_id("CAR999").await.expect("Failed to get car");

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_demo_vehicle_available_after_migrations() {
        let (_pool, repo) = setup_test_repo().await;

        let demo = repo
            .get_by_id("CAR123")
            .await
            .expect("Failed to get car")
            .expect("Demo vehicle should be seeded");
        assert_eq!(demo.status, CarStatus::Available);
    }

    #[tokio::test]
    async fn test_set_status() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_car("CAR901")).await.expect("Failed to create car");

        repo.set_status("CAR901", CarStatus::Rented)
            .await
            .expect("Failed to set status");

        let found = repo
            .get_by_id("CAR901")
            .await
            .expect("Failed to get car")
            .expect("Car not found");
        assert_eq!(found.status, CarStatus::Rented);
    }
}
