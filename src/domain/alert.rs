use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::detection::{BBox, Detection};

/// Detección aprobada por el motor de decisión, antes de tener snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedAlert {
    pub camera_id: String,
    pub detection: Detection,
}

/// Alerta inmutable entregada al backend.
#[derive(Debug, Clone)]
pub struct Alert {
    pub camera_id: String,
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub image_id: String,
    pub image_base64: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn from_approved(
        approved: ApprovedAlert,
        image_id: String,
        image_base64: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let ApprovedAlert { camera_id, detection } = approved;
        Self {
            camera_id,
            class_label: detection.class_label,
            confidence: detection.confidence,
            bbox: detection.bbox,
            image_id,
            image_base64,
            timestamp,
        }
    }
}

/// Cuerpo JSON que espera el backend de alertas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub service_key: String,
    pub camera_id: String,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
    pub image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub timestamp: String,
}

impl AlertPayload {
    pub fn new(alert: &Alert, service_key: &str) -> Self {
        Self {
            service_key: service_key.to_string(),
            camera_id: alert.camera_id.clone(),
            class_name: alert.class_label.clone(),
            confidence: alert.confidence,
            bbox: alert.bbox.as_array(),
            image_id: alert.image_id.clone(),
            image_base64: alert.image_base64.clone(),
            timestamp: alert.timestamp.to_rfc3339(),
        }
    }
}

/// Resultado de una entrega, sólo se registra en logs.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered { image_id: String },
    Rejected { image_id: String, status: u16 },
    Failed { image_id: String, reason: String },
    SnapshotFailed(String),
}
