// src/domain/camera.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Palancas del planificador adaptativo.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Levers {
    pub skip_count: u32,
    pub scale_factor: f32,
}

impl Default for Levers {
    fn default() -> Self {
        Self { skip_count: 0, scale_factor: 1.0 }
    }
}

/// Estado por cámara. Vive lo que vive el proceso.
#[derive(Debug, Default)]
pub struct CameraState {
    pub last_alert: Option<Instant>,
    pub levers: Levers,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub skip_count: u32,
    pub scale_factor: f32,
    pub seconds_since_alert: Option<f64>,
}

/// Origen de vídeo: fichero (posiblemente subido y temporal) o dispositivo en vivo.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoSource {
    File { path: PathBuf, transient: bool },
    Device(u32),
}

impl VideoSource {
    pub fn describe(&self) -> String {
        match self {
            VideoSource::File { path, .. } => path.display().to_string(),
            VideoSource::Device(idx) => format!("/dev/video{idx}"),
        }
    }

    /// Fichero temporal que debe borrarse al terminar el stream.
    pub fn transient_artifact(&self) -> Option<&Path> {
        match self {
            VideoSource::File { path, transient: true } => Some(path.as_path()),
            _ => None,
        }
    }
}

/// Convención `{camera_id}_{resto}` en el nombre del fichero.
pub fn camera_id_from_filename(file_name: &str) -> Option<String> {
    let (prefix, _) = file_name.split_once('_')?;
    if prefix.is_empty() || prefix.len() >= 100 {
        return None;
    }
    Some(prefix.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_id_is_taken_from_prefix() {
        assert_eq!(camera_id_from_filename("cam1_abc_video.mp4").as_deref(), Some("cam1"));
        assert_eq!(camera_id_from_filename("video.mp4"), None);
        assert_eq!(camera_id_from_filename("_video.mp4"), None);
    }

    #[test]
    fn only_transient_files_are_artifacts() {
        let up = VideoSource::File { path: "temp/x.mp4".into(), transient: true };
        let rec = VideoSource::File { path: "rec/x.mp4".into(), transient: false };
        assert!(up.transient_artifact().is_some());
        assert!(rec.transient_artifact().is_none());
        assert!(VideoSource::Device(0).transient_artifact().is_none());
        assert_eq!(VideoSource::Device(2).describe(), "/dev/video2");
    }
}
