use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Value;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::application::ports::DetectorPort;
use crate::domain::detection::{BBox, Detection};
use crate::domain::model::{InferenceConfig, YoloParams};

pub struct OnnxYoloEngine {
    session: Session,
    params: YoloParams,
}

impl OnnxYoloEngine {
    pub fn load(cfg: &InferenceConfig) -> Result<Self> {
        let path = Path::new(&cfg.model.onnx_path);
        if path.extension().and_then(|e| e.to_str()) != Some("onnx") {
            bail!("El modelo debe ser un fichero .onnx: {}", path.display());
        }
        if cfg.params.class_names.is_empty() {
            bail!("El modelo necesita al menos una clase");
        }

        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)
            .with_context(|| format!("No se pudo leer el modelo {}", path.display()))?;
        let session = builder.commit_from_memory(&model_bytes)?;

        info!(
            model = %cfg.model.name,
            path = %path.display(),
            classes = ?cfg.params.class_names,
            "🧠 Modelo ONNX cargado"
        );
        Ok(Self { session, params: cfg.params.clone() })
    }

    pub fn infer(&mut self, rgb: &RgbImage) -> Result<Vec<Detection>> {
        let imgsz = self.params.input_size as usize;
        let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Nearest);

        let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
        for (x, y, pixel) in resized.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }

        let input_shape = vec![1, 3, imgsz as i64, imgsz as i64];
        let (raw, _) = input.into_raw_vec_and_offset();
        let input_tensor = Value::from_array((input_shape, raw))?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<ndarray::Ix2>()
            .context("Salida YOLO con forma inesperada")?;

        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;
        Ok(decode_output(view, &self.params, sx, sy))
    }
}

impl DetectorPort for OnnxYoloEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        self.infer(image)
    }
}

/// Salida YOLOv8 `[4 + n_clases, candidatos]` → detecciones en píxeles del frame.
pub fn decode_output(view: ArrayView2<f32>, params: &YoloParams, sx: f32, sy: f32) -> Vec<Detection> {
    let rows = view.shape()[0];
    if rows <= 4 {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for i in 0..view.shape()[1] {
        let scores = view.slice(s![4.., i]);
        let Some((class_id, &score)) = scores.indexed_iter().max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };
        if score <= params.conf_threshold {
            continue;
        }
        // Clases fuera de la lista configurada no se etiquetan.
        let Some(label) = params.class_names.get(class_id) else { continue };

        let (cx, cy, w, h) = (view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]]);
        candidates.push(Detection::new(
            label.clone(),
            score,
            BBox::new((cx - w / 2.0) * sx, (cy - h / 2.0) * sy, (cx + w / 2.0) * sx, (cy + h / 2.0) * sy),
        ));
    }

    non_max_suppression(candidates, params.iou_threshold, params.max_detections)
}

/// NMS voraz por clase, de mayor a menor confianza.
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32, limit: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for det in candidates {
        if kept.len() >= limit {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.class_label == det.class_label && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn params() -> YoloParams {
        YoloParams { conf_threshold: 0.25, iou_threshold: 0.45, max_detections: 10, ..Default::default() }
    }

    /// Columnas: (cx, cy, w, h, fire, smoke)
    fn output(cols: &[[f32; 6]]) -> Array2<f32> {
        let mut a = Array2::<f32>::zeros((6, cols.len()));
        for (i, c) in cols.iter().enumerate() {
            for (r, v) in c.iter().enumerate() {
                a[[r, i]] = *v;
            }
        }
        a
    }

    #[test]
    fn decodes_and_scales_candidates() {
        let out = output(&[[100.0, 100.0, 20.0, 40.0, 0.1, 0.8]]);
        let dets = decode_output(out.view(), &params(), 2.0, 0.5);
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_label, "smoke");
        assert_eq!(dets[0].bbox, BBox::new(180.0, 40.0, 220.0, 60.0));
    }

    #[test]
    fn low_scores_are_dropped() {
        let out = output(&[[10.0, 10.0, 4.0, 4.0, 0.2, 0.1]]);
        assert!(decode_output(out.view(), &params(), 1.0, 1.0).is_empty());
    }

    #[test]
    fn nms_is_per_class() {
        let out = output(&[
            [50.0, 50.0, 20.0, 20.0, 0.9, 0.0],
            [51.0, 51.0, 20.0, 20.0, 0.7, 0.0],
            [51.0, 51.0, 20.0, 20.0, 0.0, 0.6],
        ]);
        let dets = decode_output(out.view(), &params(), 1.0, 1.0);
        let labels: Vec<&str> = dets.iter().map(|d| d.class_label.as_str()).collect();
        assert_eq!(labels, vec!["fire", "smoke"]);
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn nms_respects_limit() {
        let dets: Vec<Detection> = (0..5)
            .map(|i| Detection::new("fire", 0.5 + i as f32 * 0.1, BBox::new(i as f32 * 100.0, 0.0, i as f32 * 100.0 + 10.0, 10.0)))
            .collect();
        let kept = non_max_suppression(dets, 0.45, 2);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].confidence > kept[1].confidence);
    }
}
