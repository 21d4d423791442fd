use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,       // nombre lógico, p.ej. "fire-yolov8"
    pub onnx_path: String,  // ruta en disco
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,        // 640 típico
    pub conf_threshold: f32,    // 0..1
    pub iou_threshold: f32,     // 0..1
    pub max_detections: usize,  // p.ej. 100
    pub class_names: Vec<String>,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
            class_names: vec!["fire".into(), "smoke".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub model: ModelId,
    pub params: YoloParams,
}
