//! Health check endpoint

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::api::middleware::AppState;
use crate::api::responses::iso_millis;

/// GET /health - liveness probe with database reachability
///
/// Returns 200 with `database: "connected"` when a ping round-trips, 503
/// with `database: "disconnected"` otherwise.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.pool.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": iso_millis(Utc::now()),
                "database": "connected",
            })),
        ),
        Err(err) => {
            tracing::error!("Health check could not reach the database: {:#}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "error",
                    "timestamp": iso_millis(Utc::now()),
                    "database": "disconnected",
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::config::AuthConfig;
    use crate::db::{create_test_pool, migrations};
    use axum_test::TestServer;
    use serde_json::Value;

    #[tokio::test]
    async fn test_health_reports_connected_database() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, &AuthConfig::default());
        let server =
            TestServer::new(build_router(state)).expect("Failed to start test server");

        let response = server.get("/health").await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected");
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
