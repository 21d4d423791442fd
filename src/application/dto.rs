use serde::{Deserialize, Serialize};

use crate::domain::{
    camera::CameraStatus,
    detection::Detection,
    verification::VerificationResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraUploadResponse {
    pub filename: String,
    pub camera_id: String,
    pub original_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRefResponse {
    pub image_id: String,
    pub camera_id: String,
}

/// Detección tal y como la consume el backend: `{class, confidence, bbox}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionDto {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl From<&Detection> for DetectionDto {
    fn from(d: &Detection) -> Self {
        Self {
            class_name: d.class_label.clone(),
            confidence: d.confidence,
            bbox: d.bbox.as_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub detection: Option<DetectionDto>,
    pub image_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_real_fire: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fail_safe: bool,
    pub attempts: usize,
}

impl From<VerificationResult> for VerifyResponse {
    fn from(r: VerificationResult) -> Self {
        Self {
            is_real_fire: r.is_positive,
            reason: r.reason,
            error: r.error,
            fail_safe: r.fail_safe,
            attempts: r.attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CamerasResponse {
    pub cameras: Vec<CameraStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::detection::BBox;

    #[test]
    fn analyze_response_uses_backend_field_names() {
        let det = Detection::new("fire", 0.9, BBox::new(1.0, 2.0, 3.0, 4.0));
        let res = AnalyzeResponse { detection: Some((&det).into()), image_id: Some("a.jpg".into()) };
        let v = serde_json::to_value(&res).unwrap();
        assert_eq!(v["detection"]["class"], "fire");
        assert_eq!(v["detection"]["bbox"][3], 4.0);
        assert_eq!(v["imageId"], "a.jpg");

        let empty = serde_json::to_value(AnalyzeResponse { detection: None, image_id: None }).unwrap();
        assert!(empty["detection"].is_null() && empty["imageId"].is_null());
    }
}
