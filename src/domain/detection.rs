use serde::{Deserialize, Serialize};

/// Caja en coordenadas de píxel `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Transformación lineal de un frame reducido al frame original.
    pub fn remap(&self, factor_x: f32, factor_y: f32) -> Self {
        Self {
            x1: self.x1 * factor_x,
            y1: self.y1 * factor_y,
            x2: self.x2 * factor_x,
            y2: self.y2 * factor_y,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_label: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_label: class_label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
        }
    }

    /// Devuelve una copia con la caja llevada a coordenadas del frame fuente.
    pub fn remapped(&self, factor_x: f32, factor_y: f32) -> Self {
        Self {
            class_label: self.class_label.clone(),
            confidence: self.confidence,
            bbox: self.bbox.remap(factor_x, factor_y),
        }
    }
}
