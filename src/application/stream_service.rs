use bytes::Bytes;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::application::{
    annotate::{draw_detections, draw_lever_overlay, encode_jpeg, resize_for_inference},
    detection_service::DetectionAdapter,
    dispatch_service::AlertDispatcher,
    ports::FrameSource,
    scheduler::{AdaptiveScheduler, SchedulerParams},
    throttle::{CameraHandle, DecisionEngine},
};
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    stream::{summarize_detections, Frame, FrameMeta},
};

pub const BOUNDARY: &str = "frame";
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Parte autodelimitada del stream multipart.
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let head = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut out = Vec::with_capacity(head.len() + jpeg.len() + 2);
    out.extend_from_slice(head.as_bytes());
    out.extend_from_slice(jpeg);
    out.extend_from_slice(b"\r\n");
    Bytes::from(out)
}

/// Adquisición con ámbito: al soltarse libera la fuente de vídeo y borra el
/// artefacto temporal. `Drop` corre una sola vez en cualquier salida
/// (fin normal, desconexión, error o pánico).
pub struct SourceGuard {
    label: String,
    source: Option<Box<dyn FrameSource>>,
    artifact: Option<PathBuf>,
}

impl SourceGuard {
    pub fn new(label: impl Into<String>, artifact: Option<PathBuf>) -> Self {
        Self { label: label.into(), source: None, artifact }
    }

    pub fn attach(&mut self, source: Box<dyn FrameSource>) {
        self.source = Some(source);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn next_frame(&mut self) -> DomainResult<Option<Frame>> {
        match self.source.as_mut() {
            Some(src) => src.next_frame(),
            None => Err(DomainError::ResourceUnavailable(format!("{} is not open", self.label))),
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        if self.source.take().is_some() {
            info!("Fuente de vídeo liberada: {}", self.label);
        }
        if let Some(path) = self.artifact.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => info!("[CLEANUP] Fichero temporal eliminado: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("[CLEANUP] No se pudo eliminar {}: {}", path.display(), e),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub jpeg_quality: u8,
    pub channel_capacity: usize,
    pub max_read_failures: u32,
    pub scheduler: SchedulerParams,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            channel_capacity: 2,
            max_read_failures: 30,
            scheduler: SchedulerParams::default(),
        }
    }
}

/// Pipeline secuencial de una cámara: lectura → salto/escala → inferencia →
/// decisión → envío desacoplado → emisión.
pub struct CameraLoop {
    camera_id: String,
    camera: CameraHandle,
    guard: SourceGuard,
    detector: DetectionAdapter,
    engine: Arc<DecisionEngine>,
    dispatcher: AlertDispatcher,
    scheduler: AdaptiveScheduler,
    meta_tx: broadcast::Sender<FrameMeta>,
    settings: StreamSettings,
    last_annotated: Option<RgbImage>,
    fps_est: f32,
    last_emit: Instant,
}

impl CameraLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera_id: String,
        camera: CameraHandle,
        guard: SourceGuard,
        detector: DetectionAdapter,
        engine: Arc<DecisionEngine>,
        dispatcher: AlertDispatcher,
        meta_tx: broadcast::Sender<FrameMeta>,
        settings: StreamSettings,
    ) -> Self {
        let scheduler = AdaptiveScheduler::new(settings.scheduler.clone());
        Self {
            camera_id,
            camera,
            guard,
            detector,
            engine,
            dispatcher,
            scheduler,
            meta_tx,
            settings,
            last_annotated: None,
            fps_est: 0.0,
            last_emit: Instant::now(),
        }
    }

    /// Bloqueante: ejecutar en `spawn_blocking` o en un hilo propio.
    /// Termina al acabar la fuente, al cerrarse el canal o tras demasiados
    /// fallos de lectura seguidos; el guard se suelta al salir.
    pub fn run(mut self, tx: mpsc::Sender<Bytes>) {
        info!(camera = %self.camera_id, source = %self.guard.label(), "▶️ Bucle de cámara iniciado");
        let mut read_failures = 0u32;
        let mut emitted = 0u64;

        loop {
            if tx.is_closed() {
                info!(camera = %self.camera_id, "Cliente desconectado, deteniendo lectura");
                break;
            }

            let frame = match self.guard.next_frame() {
                Ok(Some(frame)) => {
                    read_failures = 0;
                    frame
                }
                Ok(None) => {
                    info!(camera = %self.camera_id, "Fin del stream de vídeo");
                    break;
                }
                Err(e) => {
                    read_failures += 1;
                    warn!(camera = %self.camera_id, "Error capturando frame: {}", e);
                    if read_failures >= self.settings.max_read_failures {
                        error!(camera = %self.camera_id, "Demasiados fallos de lectura, abortando");
                        break;
                    }
                    continue;
                }
            };

            let jpeg = match self.process(frame) {
                Ok(jpeg) => jpeg,
                Err(e) => {
                    warn!(camera = %self.camera_id, "Frame descartado: {}", e);
                    continue;
                }
            };

            if tx.blocking_send(multipart_chunk(&jpeg)).is_err() {
                info!(camera = %self.camera_id, "Cliente desconectado");
                break;
            }
            emitted += 1;
        }

        info!(camera = %self.camera_id, frames = emitted, "⏹️ Bucle de cámara finalizado");
    }

    fn process(&mut self, frame: Frame) -> DomainResult<Vec<u8>> {
        let levers = self.scheduler.levers();

        if !self.scheduler.should_infer(frame.index, self.last_annotated.is_some()) {
            if let Some(last) = &self.last_annotated {
                let mut display = last.clone();
                draw_lever_overlay(&mut display, levers, self.scheduler.params());
                self.tick_fps();
                return encode_jpeg(&display, self.settings.jpeg_quality);
            }
        }

        let (detections, infer_ms) = self.infer(&frame.rgb, levers.scale_factor);

        let alert = match self.engine.evaluate(Some(self.camera_id.as_str()), &detections, Instant::now()) {
            Some(approved) => {
                info!(
                    camera = %approved.camera_id,
                    class = %approved.detection.class_label,
                    confidence = approved.detection.confidence,
                    "🚨 Alerta aprobada"
                );
                // Se guarda el frame fuente, no la versión anotada.
                let _ = self.dispatcher.dispatch(approved, frame.jpeg);
                true
            }
            None => false,
        };

        if !detections.is_empty() {
            debug!(camera = %self.camera_id, "Detecciones: {}", summarize_detections(&detections));
        }

        let (width, height) = frame.rgb.dimensions();
        let mut display = frame.rgb;
        draw_detections(&mut display, &detections);
        self.last_annotated = Some(display.clone());

        let levers = self.scheduler.levers();
        draw_lever_overlay(&mut display, levers, self.scheduler.params());
        self.tick_fps();

        if self.meta_tx.receiver_count() > 0 {
            let _ = self.meta_tx.send(FrameMeta {
                camera_id: self.camera_id.clone(),
                frame_index: frame.index,
                width,
                height,
                infer_ms,
                fps_est: self.fps_est,
                levers,
                detections,
                alert,
            });
        }

        encode_jpeg(&display, self.settings.jpeg_quality)
    }

    /// Inferencia sobre una copia (reducida si procede); las cajas vuelven
    /// en coordenadas del frame original.
    fn infer(&mut self, rgb: &RgbImage, scale: f32) -> (Vec<Detection>, Option<f32>) {
        let input = if scale < 1.0 { resize_for_inference(rgb, scale) } else { rgb.clone() };
        let factor_x = rgb.width() as f32 / input.width() as f32;
        let factor_y = rgb.height() as f32 / input.height() as f32;

        match self.detector.detect(input) {
            Ok(batch) => {
                self.record_latency(batch.latency);
                let detections = if scale < 1.0 {
                    batch.detections.iter().map(|d| d.remapped(factor_x, factor_y)).collect()
                } else {
                    batch.detections
                };
                (detections, Some(batch.latency.as_secs_f32() * 1000.0))
            }
            Err(DomainError::Timeout(t)) => {
                warn!(camera = %self.camera_id, "Inferencia excedió {:?}, frame sin decisión", t);
                self.record_latency(t);
                (Vec::new(), None)
            }
            Err(e) => {
                debug!(camera = %self.camera_id, "Detección no disponible: {}", e);
                (Vec::new(), None)
            }
        }
    }

    fn record_latency(&mut self, latency: std::time::Duration) {
        let before = self.scheduler.levers();
        let after = self.scheduler.record(latency);
        self.camera.lock().levers = after;
        if before != after {
            debug!(
                camera = %self.camera_id,
                skip = after.skip_count,
                scale = after.scale_factor,
                rate = ?self.scheduler.achieved_rate(),
                "Palancas ajustadas"
            );
        }
    }

    fn tick_fps(&mut self) {
        let dt = self.last_emit.elapsed().as_secs_f32().max(0.001);
        self.last_emit = Instant::now();
        self.fps_est = 0.9 * self.fps_est + 0.1 * (1.0 / dt);
    }
}
