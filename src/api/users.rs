//! User registration API endpoints
//!
//! Two ways into the platform:
//! - POST `/users`: plain registration with contact details, no credentials
//! - POST `/auth/face`: face enrollment, which mints a user together with
//!   the derived `face_id` and `nfc_uid` in one step

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};
use crate::services::UserRequest;

/// POST /users - plain user registration
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(req) = payload?;

    let user = state.registration_service.register_user(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user_id": user.user_id,
            "name": user.name,
            "email": user.email,
            "status": "created",
        })),
    ))
}

/// POST /auth/face - enroll a face image and mint a user with derived ids
///
/// Expects multipart/form-data with the image under a field named `image`.
/// Any other content type is rejected before the body is read.
pub async fn register_face(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|_| {
        ApiError::new(
            "invalid_content_type",
            "Content-Type must be multipart/form-data",
        )
    })?;

    let mut image: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_failed)? {
        if field.name() == Some("image") {
            image = Some(field.bytes().await.map_err(multipart_failed)?);
            break;
        }
    }
    let image = image.ok_or_else(|| ApiError::new("missing_image", "Image file is required"))?;

    let registration = state.registration_service.register_face(&image).await?;

    Ok(Json(json!({
        "user_id": registration.user_id,
        "face_id": registration.face_id,
        "nfc_uid": registration.nfc_uid,
        "status": "ok",
    })))
}

fn multipart_failed(err: MultipartError) -> ApiError {
    ApiError::internal(anyhow::Error::new(err).context("Failed to read multipart body"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_router;
    use crate::config::AuthConfig;
    use crate::db::{create_test_pool, migrations};
    use crate::services::derive_nfc_uid;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;

    async fn setup() -> (AppState, TestServer) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, &AuthConfig::default());
        let server =
            TestServer::new(build_router(state.clone())).expect("Failed to start test server");
        (state, server)
    }

    fn jpeg_bytes() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(b"face-image-payload");
        bytes
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_state, server) = setup().await;

        let response = server
            .post("/users")
            .json(&json!({
                "name": "Kim",
                "email": "kim@example.com",
                "phone": "010-1234-5678",
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: Value = response.json();
        assert!(body["user_id"].as_str().unwrap().starts_with('U'));
        assert_eq!(body["name"], "Kim");
        assert_eq!(body["email"], "kim@example.com");
        assert_eq!(body["status"], "created");
    }

    #[tokio::test]
    async fn test_create_user_rejects_bad_email() {
        let (_state, server) = setup().await;

        let response = server
            .post("/users")
            .json(&json!({
                "name": "Kim",
                "email": "not-an-email",
                "phone": "010-1234-5678",
            }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_email");
        assert_eq!(body["message"], "Invalid email format");
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let (_state, server) = setup().await;
        let payload = json!({
            "name": "Kim",
            "email": "kim@example.com",
            "phone": "010-1234-5678",
        });

        server.post("/users").json(&payload).await.assert_status(StatusCode::CREATED);

        let response = server.post("/users").json(&payload).await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["error"], "email_exists");
    }

    #[tokio::test]
    async fn test_create_user_requires_fields() {
        let (_state, server) = setup().await;

        let response = server
            .post("/users")
            .json(&json!({ "name": "Kim", "email": "", "phone": "010-1234-5678" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "missing_fields");
        assert_eq!(body["message"], "name, email, phone are required");
    }

    #[tokio::test]
    async fn test_register_face_mints_identity() {
        let (state, server) = setup().await;

        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(jpeg_bytes())
                .file_name("face.jpg")
                .mime_type("image/jpeg"),
        );
        let response = server.post("/auth/face").multipart(form).await;
        response.assert_status(StatusCode::OK);
        let body: Value = response.json();

        let user_id = body["user_id"].as_str().unwrap();
        assert!(user_id.starts_with('U'));
        assert!(body["face_id"].as_str().unwrap().starts_with('F'));
        assert_eq!(
            body["nfc_uid"].as_str().unwrap(),
            derive_nfc_uid(user_id, "NFC_SALT_2025")
        );
        assert_eq!(body["status"], "ok");

        let stored = state.registration_service.get_user(user_id).await.unwrap();
        assert_eq!(stored.face_id.as_deref(), body["face_id"].as_str());
    }

    #[tokio::test]
    async fn test_register_face_rejects_json_body() {
        let (_state, server) = setup().await;

        let response = server
            .post("/auth/face")
            .json(&json!({ "image": "aGVsbG8=" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_content_type");
        assert_eq!(body["message"], "Content-Type must be multipart/form-data");
    }

    #[tokio::test]
    async fn test_register_face_requires_image_field() {
        let (_state, server) = setup().await;

        let form = MultipartForm::new().add_part(
            "photo",
            Part::bytes(jpeg_bytes())
                .file_name("face.jpg")
                .mime_type("image/jpeg"),
        );
        let response = server.post("/auth/face").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "missing_image");
        assert_eq!(body["message"], "Image file is required");
    }

    #[tokio::test]
    async fn test_register_face_rejects_non_jpeg() {
        let (_state, server) = setup().await;

        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(b"PNG-ish".to_vec())
                .file_name("face.png")
                .mime_type("image/png"),
        );
        let response = server.post("/auth/face").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "invalid_image");
    }

    #[tokio::test]
    async fn test_register_face_rejects_oversized_image() {
        let (_state, server) = setup().await;

        let mut bytes = vec![0xFF, 0xD8];
        bytes.resize(1024 * 1024 + 1, 0u8);
        let form = MultipartForm::new().add_part(
            "image",
            Part::bytes(bytes).file_name("face.jpg").mime_type("image/jpeg"),
        );
        let response = server.post("/auth/face").multipart(form).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["error"], "file_too_large");
        assert_eq!(body["message"], "Image size must not exceed 1MB");
    }
}
