use bytes::Bytes;
use image::ImageFormat;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    application::{
        annotate::encode_jpeg,
        detection_service::DetectionAdapter,
        dispatch_service::AlertDispatcher,
        dto::{AnalyzeResponse, CameraUploadResponse},
        ports::{SnapshotStorePort, UploadStorePort, VideoSourcePort},
        stream_service::{CameraLoop, SourceGuard, StreamSettings},
        throttle::{CameraHandle, DecisionEngine},
        verification_service::VerificationService,
    },
    domain::{
        camera::{camera_id_from_filename, CameraStatus, VideoSource},
        errors::{DomainError, DomainResult},
        stream::FrameMeta,
        verification::VerificationResult,
    },
};

pub type FrameStream = ReceiverStream<Bytes>;

/// Dependencias del servicio, ya construidas por `main`.
pub struct MonitorPorts {
    pub videos: Arc<dyn VideoSourcePort>,
    pub uploads: Arc<dyn UploadStorePort>,
    pub snapshots: Arc<dyn SnapshotStorePort>,
    pub detector: DetectionAdapter,
    pub engine: Arc<DecisionEngine>,
    pub dispatcher: AlertDispatcher,
    pub verifier: Arc<VerificationService>,
}

/// Casos de uso del servicio de vigilancia: streams por cámara, análisis
/// puntual, snapshots y verificación.
#[derive(Clone)]
pub struct MonitorService {
    videos: Arc<dyn VideoSourcePort>,
    uploads: Arc<dyn UploadStorePort>,
    snapshots: Arc<dyn SnapshotStorePort>,
    detector: DetectionAdapter,
    engine: Arc<DecisionEngine>,
    dispatcher: AlertDispatcher,
    verifier: Arc<VerificationService>,
    meta_tx: broadcast::Sender<FrameMeta>,
    settings: StreamSettings,
    webcam_device: u32,
}

impl MonitorService {
    pub fn new(ports: MonitorPorts, settings: StreamSettings, webcam_device: u32) -> Self {
        let (meta_tx, _) = broadcast::channel(16);
        Self {
            videos: ports.videos,
            uploads: ports.uploads,
            snapshots: ports.snapshots,
            detector: ports.detector,
            engine: ports.engine,
            dispatcher: ports.dispatcher,
            verifier: ports.verifier,
            meta_tx,
            settings,
            webcam_device,
        }
    }

    // ---- subidas ----

    pub async fn save_upload(
        &self,
        original_name: &str,
        camera_id: Option<&str>,
        bytes: &[u8],
    ) -> DomainResult<CameraUploadResponse> {
        let clean = sanitize_file_name(original_name)?;
        let filename = match camera_id {
            Some(id) => {
                validate_camera_id(id)?;
                // la cámara queda registrada desde la subida
                self.engine.registry().register(id);
                format!("{id}_{}_{clean}", Uuid::new_v4())
            }
            None => format!("{}_{clean}", Uuid::new_v4()),
        };
        let path = self.uploads.store(&filename, bytes).await?;
        info!(file = %path.display(), bytes = bytes.len(), "📥 Vídeo recibido");
        Ok(CameraUploadResponse {
            filename,
            camera_id: camera_id.unwrap_or_default().to_string(),
            original_filename: original_name.to_string(),
        })
    }

    // ---- streams ----

    /// Vídeo subido; la cámara se deduce del prefijo del nombre.
    pub async fn video_feed(&self, video_name: &str) -> DomainResult<FrameStream> {
        let path = self.uploads.resolve(video_name).await?;
        let derived = camera_id_from_filename(video_name);
        let (camera_id, camera) = self.engine.registry().resolve(derived.as_deref());
        self.open_stream(VideoSource::File { path, transient: true }, camera_id, camera).await
    }

    /// Vídeo subido para una cámara concreta; debe llevar su prefijo.
    pub async fn camera_video_feed(&self, camera_id: &str, video_name: &str) -> DomainResult<FrameStream> {
        validate_camera_id(camera_id)?;
        let path = self.uploads.resolve(video_name).await?;
        if !video_name.starts_with(&format!("{camera_id}_")) {
            return Err(DomainError::Forbidden("Video does not belong to this camera".into()));
        }
        let camera = self.engine.registry().register(camera_id);
        self.open_stream(VideoSource::File { path, transient: true }, camera_id.to_string(), camera)
            .await
    }

    pub async fn webcam_feed(&self, camera_id: Option<&str>) -> DomainResult<FrameStream> {
        let (camera_id, camera) = match camera_id {
            Some(id) => {
                validate_camera_id(id)?;
                (id.to_string(), self.engine.registry().register(id))
            }
            None => self.engine.registry().resolve(None),
        };
        self.open_stream(VideoSource::Device(self.webcam_device), camera_id, camera).await
    }

    async fn open_stream(
        &self,
        source: VideoSource,
        camera_id: String,
        camera: CameraHandle,
    ) -> DomainResult<FrameStream> {
        // El guard existe antes de abrir: si la apertura falla, el temporal se borra igual.
        let mut guard = SourceGuard::new(
            source.describe(),
            source.transient_artifact().map(Path::to_path_buf),
        );

        let videos = self.videos.clone();
        let opened = tokio::task::spawn_blocking(move || videos.open(&source))
            .await
            .map_err(|e| DomainError::OperationFailed(format!("open task: {e}")))?;

        match opened {
            Ok(src) => guard.attach(src),
            Err(e) => {
                warn!(camera = %camera_id, source = %guard.label(), "❌ No se pudo abrir la fuente: {}", e);
                return Err(e);
            }
        }

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let camera_loop = CameraLoop::new(
            camera_id,
            camera,
            guard,
            self.detector.clone(),
            self.engine.clone(),
            self.dispatcher.clone(),
            self.meta_tx.clone(),
            self.settings.clone(),
        );
        tokio::task::spawn_blocking(move || camera_loop.run(tx));

        Ok(ReceiverStream::new(rx))
    }

    // ---- frames sueltos ----

    /// Analiza una imagen sin ventana de silencio. Guarda snapshot sólo si hay
    /// una detección que supera el umbral.
    pub async fn analyze_frame(&self, image_bytes: &[u8]) -> DomainResult<AnalyzeResponse> {
        let rgb = image::load_from_memory(image_bytes)
            .map_err(|e| DomainError::InvalidInput(format!("Could not decode image: {e}")))?
            .to_rgb8();

        let detector = self.detector.clone();
        let for_detection = rgb.clone();
        let batch = tokio::task::spawn_blocking(move || detector.detect(for_detection))
            .await
            .map_err(|e| DomainError::OperationFailed(format!("detect task: {e}")))??;

        let Some(best) = self.engine.select_best(&batch.detections).cloned() else {
            info!(found = batch.detections.len(), "Sin detecciones por encima del umbral");
            return Ok(AnalyzeResponse { detection: None, image_id: None });
        };

        let jpeg = encode_jpeg(&rgb, self.settings.jpeg_quality)?;
        let image_id = self.snapshots.save(&jpeg).await?;
        info!(
            class = %best.class_label,
            confidence = best.confidence,
            image_id = %image_id,
            "🔥 Detección en frame analizado"
        );
        Ok(AnalyzeResponse { detection: Some((&best).into()), image_id: Some(image_id) })
    }

    /// Captura un frame en vivo y lo guarda sin pasar por la decisión de alerta.
    pub async fn capture_frame(&self, camera_id: &str) -> DomainResult<String> {
        let videos = self.videos.clone();
        let device = VideoSource::Device(self.webcam_device);
        let frame = tokio::task::spawn_blocking(move || -> DomainResult<_> {
            let mut src = videos.open(&device)?;
            src.next_frame()
        })
        .await
        .map_err(|e| DomainError::OperationFailed(format!("capture task: {e}")))??
        .ok_or_else(|| DomainError::ResourceUnavailable("Failed to capture frame from camera".into()))?;

        let image_id = self.snapshots.save(&frame.jpeg).await?;
        info!(camera = camera_id, image_id = %image_id, "📸 Frame capturado");
        Ok(image_id)
    }

    pub async fn snapshot(&self, image_id: &str) -> DomainResult<Vec<u8>> {
        self.snapshots.load(image_id).await
    }

    pub async fn latest_snapshot(&self) -> DomainResult<String> {
        self.snapshots
            .latest()
            .await?
            .ok_or_else(|| DomainError::NotFound("No snapshots found".into()))
    }

    // ---- verificación ----

    pub async fn verify_upload(&self, image_bytes: &[u8]) -> DomainResult<VerificationResult> {
        let jpeg = normalize_jpeg(image_bytes, self.settings.jpeg_quality)?;
        Ok(self.verifier.verify(&jpeg).await)
    }

    pub async fn verify_snapshot(&self, image_id: &str) -> DomainResult<VerificationResult> {
        let jpeg = self.snapshots.load(image_id).await?;
        Ok(self.verifier.verify(&jpeg).await)
    }

    // ---- estado ----

    pub fn cameras(&self) -> Vec<CameraStatus> {
        self.engine.registry().statuses(Instant::now())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FrameMeta> {
        self.meta_tx.subscribe()
    }
}

/// Acepta cualquier formato decodificable; lo que no sea JPEG se recodifica.
fn normalize_jpeg(bytes: &[u8], quality: u8) -> DomainResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| DomainError::InvalidInput(format!("Could not decode image: {e}")))?;
    if matches!(image::guess_format(bytes), Ok(ImageFormat::Jpeg)) {
        return Ok(bytes.to_vec());
    }
    encode_jpeg(&img.to_rgb8(), quality)
}

/// Último componente del nombre, con caracteres fuera de `[A-Za-z0-9._-]` sustituidos.
pub fn sanitize_file_name(name: &str) -> DomainResult<String> {
    let base = name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or_default().trim();
    let clean: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        return Err(DomainError::InvalidInput(format!("invalid file name: {name:?}")));
    }
    Ok(clean)
}

pub fn validate_camera_id(id: &str) -> DomainResult<()> {
    let ok = !id.is_empty()
        && id.len() < 100
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if ok {
        Ok(())
    } else {
        Err(DomainError::InvalidInput(format!("invalid camera id: {id:?}")))
    }
}
