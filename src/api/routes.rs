use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Files
        .route(
            "/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/convert", post(handlers::convert_file))
        .route("/conversions", get(handlers::list_conversions))
        .route("/download/:name", get(handlers::download_file))
        .route("/download-zip", post(handlers::download_zip))
        // Cleanup
        .route("/cleanup-session", post(handlers::cleanup_session))
        .route("/cleanup", post(handlers::cleanup))
        // Internal
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::testutil::{jpeg_bytes, test_state, test_state_with_limit};

    const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

    fn multipart_upload(file_name: &str, data: &[u8], session_id: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(id) = session_id {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{id}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_convert_download() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = create_router(Arc::clone(&state))
            .oneshot(multipart_upload("photo.jpg", &jpeg_bytes(8, 6), Some("session-a")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let upload = json_body(response).await;
        assert_eq!(upload["data"]["sessionId"], "session-a");
        assert_eq!(upload["data"]["displayName"], "photo.jpg");
        assert_eq!(
            upload["data"]["availableConversions"],
            serde_json::json!(["jpeg_to_png", "jpeg_to_svg"])
        );
        let storage_name = upload["data"]["storageName"].as_str().unwrap().to_string();

        let response = create_router(Arc::clone(&state))
            .oneshot(json_post(
                "/convert",
                serde_json::json!({
                    "storageName": storage_name,
                    "conversionIdentifier": "jpeg_to_png",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let converted = json_body(response).await;
        assert_eq!(converted["data"]["displayName"], "photo.png");
        let download_url = converted["data"]["downloadUrl"].as_str().unwrap().to_string();

        let response = create_router(Arc::clone(&state))
            .oneshot(Request::get(&download_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"photo.png\""
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let image = image::load_from_memory(&bytes).unwrap();
        assert_eq!((image.width(), image.height()), (8, 6));

        let response = create_router(state)
            .oneshot(Request::get(&download_url).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\nabc\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(body["data"]["message"], "No file provided");
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let limit = 16 * 1024;
        let app = create_router(test_state_with_limit(&dir, limit));

        let data = vec![0u8; limit as usize + MULTIPART_OVERHEAD + 200 * 1024];
        let response = app
            .oneshot(multipart_upload("big.wav", &data, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "fail");
        assert_eq!(
            body["data"]["message"],
            format!("File exceeds maximum upload size of {limit} bytes")
        );
        assert_eq!(std::fs::read_dir(dir.path().join("uploads")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_just_over_limit_is_payload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let limit = 16 * 1024;
        let app = create_router(test_state_with_limit(&dir, limit));

        let data = vec![0u8; limit as usize + 1];
        let response = app
            .oneshot(multipart_upload("big.wav", &data, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_convert_error_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let upload = state
            .files
            .receive_upload(
                None,
                Some(crate::lifecycle::IncomingFile {
                    file_name: Some("drawing.svg".to_string()),
                    data: bytes::Bytes::from_static(b"<svg/>"),
                }),
            )
            .await
            .unwrap();

        let cases = [
            (upload.storage_name.as_str(), "svg_to_gif", StatusCode::BAD_REQUEST),
            (upload.storage_name.as_str(), "svg_to_png", StatusCode::NOT_IMPLEMENTED),
            ("missing_drawing.svg", "svg_to_png", StatusCode::NOT_FOUND),
            ("../etc/passwd", "svg_to_png", StatusCode::BAD_REQUEST),
        ];
        for (storage_name, identifier, expected) in cases {
            let response = create_router(Arc::clone(&state))
                .oneshot(json_post(
                    "/convert",
                    serde_json::json!({
                        "unique_filename": storage_name,
                        "conversion_type": identifier,
                    }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), expected, "{storage_name} / {identifier}");
        }
    }

    #[tokio::test]
    async fn test_download_zip_requires_names() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(json_post(
                "/download-zip",
                serde_json::json!({ "outputStorageNames": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cleanup_session_counts_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        for name in ["a.mp3", "b.wav"] {
            let response = create_router(Arc::clone(&state))
                .oneshot(multipart_upload(name, b"not really audio", Some("s-1")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = create_router(Arc::clone(&state))
            .oneshot(json_post(
                "/cleanup-session",
                serde_json::json!({ "session_id": "s-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["deletedCount"], 2);
    }

    #[tokio::test]
    async fn test_bad_requests_name_the_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let response = create_router(Arc::clone(&state))
            .oneshot(json_post(
                "/convert",
                serde_json::json!({ "conversionIdentifier": "jpeg_to_png" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let message = json_body(response).await["data"]["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.starts_with("Invalid request body: "), "{message}");
        assert!(message.contains("storageName"), "{message}");

        let response = create_router(state)
            .oneshot(Request::get("/conversions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let message = json_body(response).await["data"]["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.contains("fileName"), "{message}");
    }

    #[tokio::test]
    async fn test_list_conversions() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let response = app
            .oneshot(
                Request::get("/conversions?fileName=Report.PDF")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["data"]["conversions"],
            serde_json::json!(["pdf_to_word", "pdf_to_png"])
        );
    }
}
