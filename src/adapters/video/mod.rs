pub mod ffmpeg;
pub mod mjpeg;

use std::str::FromStr;

use crate::application::ports::{FrameSource, VideoSourcePort};
use crate::domain::{
    camera::VideoSource,
    errors::{DomainError, DomainResult},
};
use self::ffmpeg::FfmpegSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoBackend {
    Ffmpeg,
    /// Captura nativa para dispositivos; los ficheros siguen pasando por ffmpeg.
    V4l2,
}

impl FromStr for VideoBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "v4l2" if cfg!(feature = "v4l2") => Ok(Self::V4l2),
            "v4l2" => Err("VIDEO_BACKEND=v4l2 requires building with the `v4l2` feature".into()),
            other => Err(format!("unknown video backend: {other}")),
        }
    }
}

/// Abre fuentes de vídeo según el backend configurado.
pub struct VideoSourceFactory {
    backend: VideoBackend,
    ffmpeg_bin: String,
    jpeg_quality: u8,
}

impl VideoSourceFactory {
    pub fn new(backend: VideoBackend, ffmpeg_bin: impl Into<String>, jpeg_quality: u8) -> Self {
        Self { backend, ffmpeg_bin: ffmpeg_bin.into(), jpeg_quality }
    }

    #[cfg(feature = "v4l2")]
    fn open_native(&self, index: u32) -> DomainResult<Box<dyn FrameSource>> {
        use crate::adapters::v4l2::capture::{CaptureConfig, V4l2Capture};

        let cfg = CaptureConfig { device_index: index, width: 640, height: 480, fps: 30, jpeg_quality: self.jpeg_quality };
        let cap = V4l2Capture::open(&cfg)
            .map_err(|e| DomainError::ResourceUnavailable(format!("/dev/video{index}: {e}")))?;
        Ok(Box::new(cap))
    }

    #[cfg(not(feature = "v4l2"))]
    fn open_native(&self, index: u32) -> DomainResult<Box<dyn FrameSource>> {
        Err(DomainError::ResourceUnavailable(format!(
            "/dev/video{index}: native capture not compiled in"
        )))
    }
}

impl VideoSourcePort for VideoSourceFactory {
    fn open(&self, source: &VideoSource) -> DomainResult<Box<dyn FrameSource>> {
        match (self.backend, source) {
            (VideoBackend::V4l2, VideoSource::Device(index)) => self.open_native(*index),
            _ => Ok(Box::new(FfmpegSource::open(&self.ffmpeg_bin, source, self.jpeg_quality)?)),
        }
    }
}
