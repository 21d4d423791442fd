mod adapters;
mod application;
mod config;
mod domain;

use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::{
    backend::alert_client::HttpAlertSink,
    gemini::client::GeminiVerifier,
    http::{router, state::HttpState},
    onnx::yolo_engine::OnnxYoloEngine,
    storage::{snapshot_store::FsSnapshotStore, upload_store::FsUploadStore},
    video::VideoSourceFactory,
};
use crate::application::{
    detection_service::{DetectionAdapter, OfflineDetector},
    dispatch_service::AlertDispatcher,
    ports::DetectorPort,
    services::{MonitorPorts, MonitorService},
    stream_service::StreamSettings,
    throttle::{CameraRegistry, DecisionEngine},
    verification_service::{FailoverRotator, VerificationService},
};
use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs: RUST_LOG o `info` por defecto
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;
    info!("🔧 Inicializando adaptadores de infraestructura...");

    // 1. Detector: sin modelo el servicio sigue emitiendo vídeo, sin alertas.
    let detector: Box<dyn DetectorPort> = match OnnxYoloEngine::load(&cfg.inference) {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            error!("❌ No se pudo cargar el modelo {}: {:#}", cfg.inference.model.onnx_path, e);
            Box::new(OfflineDetector { reason: e.to_string() })
        }
    };
    let detector = DetectionAdapter::spawn(detector, cfg.detection_timeout);

    // 2. Decisión y estado por cámara
    let registry = Arc::new(CameraRegistry::new(cfg.default_camera_id.clone(), cfg.camera_ids.clone()));
    let engine = Arc::new(DecisionEngine::new(cfg.alert_policy.clone(), registry));

    // 3. Almacenamiento y entrega de alertas
    let snapshots = Arc::new(FsSnapshotStore::new(&cfg.snapshot_dir).await?);
    let uploads = Arc::new(FsUploadStore::new(&cfg.temp_dir).await?);
    let sink = Arc::new(HttpAlertSink::new(&cfg.alert_url, &cfg.service_key, cfg.dispatch_timeout)?);
    let dispatcher = AlertDispatcher::new(
        snapshots.clone(),
        sink,
        tokio::runtime::Handle::current(),
        cfg.embed_snapshot,
    );

    // 4. Verificación remota
    if cfg.gemini_api_keys.is_empty() {
        warn!("⚠️ GEMINI_API_KEYS vacío: toda verificación devolverá el veredicto por defecto");
    }
    let rotator = Arc::new(FailoverRotator::new(cfg.gemini_api_keys.clone(), cfg.gemini_models.clone()));
    let gemini = Arc::new(GeminiVerifier::new(&cfg.gemini_base_url, cfg.verify_timeout)?);
    let verifier = Arc::new(VerificationService::new(rotator, gemini));

    // 5. Servicio de aplicación
    let videos = Arc::new(VideoSourceFactory::new(cfg.video_backend, &cfg.ffmpeg_bin, cfg.jpeg_quality));
    let settings = StreamSettings {
        jpeg_quality: cfg.jpeg_quality,
        scheduler: cfg.scheduler.clone(),
        ..Default::default()
    };
    let monitor = Arc::new(MonitorService::new(
        MonitorPorts { videos, uploads, snapshots, detector, engine, dispatcher, verifier },
        settings,
        cfg.webcam_device,
    ));

    // 6. Router y servidor
    let app = router(HttpState { monitor }, &cfg.static_dir, cfg.max_upload_bytes);
    let addr = cfg.bind_addr();

    info!("🚀 Servicio de detección iniciado en http://{}", addr);
    info!(
        alert_url = %cfg.alert_url,
        backend = ?cfg.video_backend,
        "📂 Subidas en '{}', snapshots en '{}', estáticos en '{}'",
        cfg.temp_dir, cfg.snapshot_dir, cfg.static_dir
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
