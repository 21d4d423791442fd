use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;

use crate::domain::{
    alert::Alert,
    camera::VideoSource,
    detection::Detection,
    errors::DomainResult,
    stream::Frame,
    verification::AttemptOutcome,
};

/// Capacidad de detección externa (modelo YOLO u otro).
pub trait DetectorPort: Send {
    fn detect(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>>;
}

/// Lector secuencial de frames. `Ok(None)` marca el fin del stream.
/// Soltar el valor libera el dispositivo o fichero subyacente.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> DomainResult<Option<Frame>>;
}

pub trait VideoSourcePort: Send + Sync {
    fn open(&self, source: &VideoSource) -> DomainResult<Box<dyn FrameSource>>;
}

#[async_trait]
pub trait SnapshotStorePort: Send + Sync {
    /// Guarda la imagen y devuelve su identificador único.
    async fn save(&self, jpeg: &[u8]) -> DomainResult<String>;
    async fn load(&self, image_id: &str) -> DomainResult<Vec<u8>>;
    async fn latest(&self) -> DomainResult<Option<String>>;
}

/// Vídeos subidos, pendientes de emitirse. Los nombres llegan ya únicos.
#[async_trait]
pub trait UploadStorePort: Send + Sync {
    async fn store(&self, file_name: &str, bytes: &[u8]) -> DomainResult<PathBuf>;
    /// Ruta de un vídeo existente; `NotFound` si no está.
    async fn resolve(&self, file_name: &str) -> DomainResult<PathBuf>;
}

#[async_trait]
pub trait AlertSinkPort: Send + Sync {
    /// Entrega la alerta y devuelve el código HTTP de la respuesta.
    async fn send(&self, alert: &Alert) -> DomainResult<u16>;
}

#[async_trait]
pub trait VerificationBackendPort: Send + Sync {
    /// Un único intento con la combinación credencial/modelo indicada.
    async fn classify(&self, credential: &str, model: &str, image_jpeg: &[u8]) -> AttemptOutcome;
}
