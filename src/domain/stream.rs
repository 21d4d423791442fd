use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::camera::Levers;
use super::detection::Detection;

/// Frame decodificado. `jpeg` conserva los bytes originales de la fuente
/// (son los que se guardan como snapshot, nunca la versión anotada).
pub struct Frame {
    pub index: u64,
    pub rgb: RgbImage,
    pub jpeg: Vec<u8>,
}

/// Metadatos de cada frame emitido, publicados por WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub camera_id: String,
    pub frame_index: u64,
    pub width: u32,
    pub height: u32,
    pub infer_ms: Option<f32>,
    pub fps_est: f32,
    pub levers: Levers,
    pub detections: Vec<Detection>,
    pub alert: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsFrameMetaMessage {
    pub r#type: String,
    pub meta: FrameMeta,
}

pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(det.class_label.as_str()).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}
