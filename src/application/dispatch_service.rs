use base64::{prelude::BASE64_STANDARD, Engine};
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::ports::{AlertSinkPort, SnapshotStorePort};
use crate::domain::alert::{Alert, ApprovedAlert, DispatchOutcome};

/// Tubería snapshot + envío. Cada alerta aprobada se procesa en una tarea
/// desacoplada: el bucle de vídeo nunca espera ni falla por ella, y no hay
/// reintentos (el estado de silencio ya quedó marcado).
#[derive(Clone)]
pub struct AlertDispatcher {
    store: Arc<dyn SnapshotStorePort>,
    sink: Arc<dyn AlertSinkPort>,
    runtime: tokio::runtime::Handle,
    embed_snapshot: bool,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn SnapshotStorePort>,
        sink: Arc<dyn AlertSinkPort>,
        runtime: tokio::runtime::Handle,
        embed_snapshot: bool,
    ) -> Self {
        Self { store, sink, runtime, embed_snapshot }
    }

    /// Lanza la entrega en segundo plano. Se puede llamar desde hilos bloqueantes.
    pub fn dispatch(&self, approved: ApprovedAlert, source_jpeg: Vec<u8>) -> JoinHandle<DispatchOutcome> {
        let this = self.clone();
        self.runtime.spawn(async move { this.deliver(approved, source_jpeg).await })
    }

    pub async fn deliver(&self, approved: ApprovedAlert, source_jpeg: Vec<u8>) -> DispatchOutcome {
        let camera_id = approved.camera_id.clone();

        let image_id = match self.store.save(&source_jpeg).await {
            Ok(id) => id,
            Err(e) => {
                error!(camera = %camera_id, "❌ Failed to save snapshot: {}", e);
                return DispatchOutcome::SnapshotFailed(e.to_string());
            }
        };

        let image_base64 = self.embed_snapshot.then(|| BASE64_STANDARD.encode(&source_jpeg));
        let alert = Alert::from_approved(approved, image_id.clone(), image_base64, Utc::now());

        match self.sink.send(&alert).await {
            Ok(status) if (200..300).contains(&status) => {
                info!(
                    camera = %alert.camera_id,
                    class = %alert.class_label,
                    confidence = alert.confidence,
                    image_id = %image_id,
                    "🔥 Alert delivered"
                );
                DispatchOutcome::Delivered { image_id }
            }
            Ok(status) => {
                warn!(camera = %alert.camera_id, status, "⚠️ Alert rejected by backend");
                DispatchOutcome::Rejected { image_id, status }
            }
            Err(e) => {
                error!(camera = %alert.camera_id, "❌ Alert delivery failed: {}", e);
                DispatchOutcome::Failed { image_id, reason: e.to_string() }
            }
        }
    }
}
