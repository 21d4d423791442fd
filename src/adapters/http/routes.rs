use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::convert::Infallible;
use tokio_stream::StreamExt;

use crate::adapters::http::{error::ApiError, state::HttpState};
use crate::application::{
    dto::{
        AnalyzeResponse, CameraUploadResponse, CamerasResponse, HealthResponse, SnapshotRefResponse,
        UploadResponse, VerifyResponse,
    },
    services::FrameStream,
    stream_service::MULTIPART_CONTENT_TYPE,
};
use crate::domain::errors::DomainError;

type ApiResult<T> = Result<T, ApiError>;

/// Primer campo de fichero con el nombre dado: `(nombre original, contenido)`.
async fn read_file_field(mut multipart: Multipart, name: &str) -> ApiResult<(String, Bytes)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(name) {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field.bytes().await?;
            return Ok((file_name, data));
        }
    }
    Err(DomainError::InvalidInput(format!("missing multipart field `{name}`")).into())
}

fn stream_response(stream: FrameStream) -> Response {
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));
    ([(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)], body).into_response()
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

pub async fn upload_video(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let (name, data) = read_file_field(multipart, "video").await?;
    let saved = st.monitor.save_upload(&name, None, &data).await?;
    Ok(Json(UploadResponse { filename: saved.filename }))
}

pub async fn upload_video_for_camera(
    State(st): State<HttpState>,
    Path(camera_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<Json<CameraUploadResponse>> {
    let (name, data) = read_file_field(multipart, "video").await?;
    Ok(Json(st.monitor.save_upload(&name, Some(&camera_id), &data).await?))
}

pub async fn video_feed(State(st): State<HttpState>, Path(video_name): Path<String>) -> ApiResult<Response> {
    Ok(stream_response(st.monitor.video_feed(&video_name).await?))
}

pub async fn video_feed_for_camera(
    State(st): State<HttpState>,
    Path((camera_id, video_name)): Path<(String, String)>,
) -> ApiResult<Response> {
    Ok(stream_response(st.monitor.camera_video_feed(&camera_id, &video_name).await?))
}

pub async fn webcam_feed(State(st): State<HttpState>) -> ApiResult<Response> {
    Ok(stream_response(st.monitor.webcam_feed(None).await?))
}

pub async fn webcam_feed_for_camera(
    State(st): State<HttpState>,
    Path(camera_id): Path<String>,
) -> ApiResult<Response> {
    Ok(stream_response(st.monitor.webcam_feed(Some(&camera_id)).await?))
}

pub async fn get_snapshot(State(st): State<HttpState>, Path(image_id): Path<String>) -> ApiResult<Response> {
    let jpeg = st.monitor.snapshot(&image_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

pub async fn latest_snapshot(
    State(st): State<HttpState>,
    Path(camera_id): Path<String>,
) -> ApiResult<Json<SnapshotRefResponse>> {
    let image_id = st.monitor.latest_snapshot().await?;
    Ok(Json(SnapshotRefResponse { image_id, camera_id }))
}

pub async fn capture_frame(
    State(st): State<HttpState>,
    Path(camera_id): Path<String>,
) -> ApiResult<Json<SnapshotRefResponse>> {
    let image_id = st.monitor.capture_frame(&camera_id).await?;
    Ok(Json(SnapshotRefResponse { image_id, camera_id }))
}

pub async fn analyze_and_save_frame(
    State(st): State<HttpState>,
    multipart: Multipart,
) -> ApiResult<Json<AnalyzeResponse>> {
    let (_, data) = read_file_field(multipart, "file").await?;
    Ok(Json(st.monitor.analyze_frame(&data).await?))
}

pub async fn verify_upload(State(st): State<HttpState>, multipart: Multipart) -> ApiResult<Json<VerifyResponse>> {
    let (_, data) = read_file_field(multipart, "image").await?;
    Ok(Json(st.monitor.verify_upload(&data).await?.into()))
}

pub async fn verify_snapshot(
    State(st): State<HttpState>,
    Path(image_id): Path<String>,
) -> ApiResult<Json<VerifyResponse>> {
    Ok(Json(st.monitor.verify_snapshot(&image_id).await?.into()))
}

pub async fn list_cameras(State(st): State<HttpState>) -> Json<CamerasResponse> {
    Json(CamerasResponse { cameras: st.monitor.cameras() })
}
