pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::adapters::http::state::HttpState;
use crate::adapters::http::ws::ws_handler;

pub fn router(state: HttpState, static_dir: &str, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/upload_video", post(routes::upload_video))
        .route("/upload_video/:camera_id", post(routes::upload_video_for_camera))
        .route("/video_feed/:video_name", get(routes::video_feed))
        .route("/video_feed/:camera_id/:video_name", get(routes::video_feed_for_camera))
        .route("/webcam_feed", get(routes::webcam_feed))
        .route("/webcam_feed/:camera_id", get(routes::webcam_feed_for_camera))
        .route("/snapshots/:image_id", get(routes::get_snapshot))
        .route("/latest_snapshot/:camera_id", get(routes::latest_snapshot))
        .route("/capture_frame/:camera_id", post(routes::capture_frame))
        .route("/analyze_and_save_frame", post(routes::analyze_and_save_frame))
        .route("/verify", post(routes::verify_upload))
        .route("/verify/:image_id", post(routes::verify_snapshot))
        .route("/api/cameras", get(routes::list_cameras))
        .route("/ws/stream", get(ws_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::tests::{fixture, png_bytes};
    use crate::domain::detection::{BBox, Detection};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(f: &crate::application::services::tests::Fixture) -> Router {
        let state = HttpState { monitor: Arc::new(f.svc.clone()) };
        router(state, "static", 8 * 1024 * 1024)
    }

    fn multipart(field: &str, file_name: &str, data: &[u8]) -> (String, Vec<u8>) {
        let boundary = "XBOUNDARYX";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    async fn json_body(res: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let f = fixture(1, false, vec![]).await;
        let res = app(&f)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn snapshot_errors_are_json() {
        let f = fixture(1, false, vec![]).await;
        let missing = format!("/snapshots/{}.jpg", uuid::Uuid::new_v4());
        let res = app(&f).oneshot(Request::get(missing).body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["error_code"], "NOT_FOUND");

        let res = app(&f)
            .oneshot(Request::get("/snapshots/not-an-id").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn camera_upload_then_foreign_feed_is_forbidden() {
        let f = fixture(1, false, vec![]).await;
        let (ct, body) = multipart("video", "clip.mp4", b"video-bytes");
        let res = app(&f)
            .oneshot(
                Request::post("/upload_video/cam1")
                    .header(header::CONTENT_TYPE, ct)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["camera_id"], "cam1");
        assert_eq!(v["original_filename"], "clip.mp4");
        let filename = v["filename"].as_str().unwrap().to_string();

        let res = app(&f)
            .oneshot(Request::get(format!("/video_feed/cam2/{filename}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn video_feed_streams_multipart() {
        let f = fixture(2, false, vec![]).await;
        let saved = f.svc.save_upload("clip.mp4", None, b"v").await.unwrap();
        let res = app(&f)
            .oneshot(Request::get(format!("/video_feed/{}", saved.filename)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "multipart/x-mixed-replace; boundary=frame");
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
    }

    #[tokio::test]
    async fn analyze_returns_detection_and_image_id() {
        let hit = Detection::new("smoke", 0.95, BBox::new(0.0, 0.0, 4.0, 4.0));
        let f = fixture(1, false, vec![hit]).await;
        let (ct, body) = multipart("file", "frame.png", &png_bytes());
        let res = app(&f)
            .oneshot(
                Request::post("/analyze_and_save_frame")
                    .header(header::CONTENT_TYPE, ct)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let v = json_body(res).await;
        assert_eq!(v["detection"]["class"], "smoke");
        assert!(v["imageId"].as_str().unwrap().ends_with(".jpg"));
    }

    #[tokio::test]
    async fn unopenable_feed_is_service_unavailable() {
        let f = fixture(1, true, vec![]).await;
        let res = app(&f)
            .oneshot(Request::get("/webcam_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
