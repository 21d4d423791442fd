use crossbeam::channel::{bounded, RecvTimeoutError, SendTimeoutError, Sender};
use image::RgbImage;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::application::ports::DetectorPort;
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
};

/// Resultado de una pasada de inferencia.
#[derive(Debug, Clone)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
    pub latency: Duration,
}

type Reply = Result<(Vec<Detection>, Duration), String>;

struct Job {
    image: RgbImage,
    reply: Sender<Reply>,
}

/// Adaptador de detección. El detector vive en un hilo propio; cada llamada
/// espera como mucho `timeout`, de modo que una inferencia atascada nunca
/// bloquea el bucle de una cámara.
#[derive(Clone)]
pub struct DetectionAdapter {
    jobs: Sender<Job>,
    timeout: Duration,
}

impl DetectionAdapter {
    pub fn spawn(mut detector: Box<dyn DetectorPort>, timeout: Duration) -> Self {
        let (tx, rx) = bounded::<Job>(8);

        let spawned = std::thread::Builder::new()
            .name("detector".into())
            .spawn(move || {
                info!("Detector: hilo de inferencia iniciado.");
                for job in rx.iter() {
                    let start = Instant::now();
                    let res = detector
                        .detect(&job.image)
                        .map(|d| (d, start.elapsed()))
                        .map_err(|e| e.to_string());
                    // Si el llamante ya abandonó por timeout, el resultado se descarta.
                    let _ = job.reply.send(res);
                }
                info!("Detector: canal cerrado, hilo terminado.");
            });

        if let Err(e) = spawned {
            error!("No se pudo lanzar el hilo del detector: {}", e);
        }

        Self { jobs: tx, timeout }
    }

    /// La imagen se recibe por valor: el frame original del llamante no se toca.
    pub fn detect(&self, image: RgbImage) -> DomainResult<DetectionBatch> {
        let start = Instant::now();
        let (reply_tx, reply_rx) = bounded::<Reply>(1);

        match self.jobs.send_timeout(Job { image, reply: reply_tx }, self.timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Detector saturado, cola llena durante {:?}", self.timeout);
                return Err(DomainError::Timeout(self.timeout));
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                return Err(DomainError::DetectionUnavailable("worker stopped".into()));
            }
        }

        let remaining = self.timeout.saturating_sub(start.elapsed());
        match reply_rx.recv_timeout(remaining) {
            Ok(Ok((detections, latency))) => Ok(DetectionBatch { detections, latency }),
            Ok(Err(msg)) => Err(DomainError::DetectionUnavailable(msg)),
            Err(RecvTimeoutError::Timeout) => Err(DomainError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(DomainError::DetectionUnavailable(
                "worker dropped the request".into(),
            )),
        }
    }
}

/// Detector sustituto cuando el modelo no carga: cada llamada falla y los
/// streams siguen emitiendo frames sin decisión.
pub struct OfflineDetector {
    pub reason: String,
}

impl DetectorPort for OfflineDetector {
    fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        anyhow::bail!("model offline: {}", self.reason)
    }
}
