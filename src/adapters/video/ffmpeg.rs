use image::ImageFormat;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

use super::mjpeg::JpegSplitter;
use crate::application::ports::FrameSource;
use crate::domain::{
    camera::VideoSource,
    errors::{DomainError, DomainResult},
    stream::Frame,
};

/// Decodificación con un proceso `ffmpeg` que vuelca MJPEG por stdout.
/// El proceso muere al soltar la fuente.
pub struct FfmpegSource {
    label: String,
    child: Child,
    frames: JpegSplitter<ChildStdout>,
    pending: Option<Frame>,
    index: u64,
}

impl FfmpegSource {
    pub fn open(ffmpeg_bin: &str, source: &VideoSource, jpeg_quality: u8) -> DomainResult<Self> {
        let label = source.describe();
        if let VideoSource::File { path, .. } = source {
            if !path.exists() {
                return Err(DomainError::NotFound(format!("Video not found: {label}")));
            }
        }

        let mut cmd = Command::new(ffmpeg_bin);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"]);
        if let VideoSource::Device(_) = source {
            cmd.args(["-f", "v4l2"]);
        }
        cmd.arg("-i").arg(&label);
        cmd.args(["-f", "image2pipe", "-vcodec", "mjpeg", "-q:v"])
            .arg(mjpeg_qscale(jpeg_quality).to_string())
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| DomainError::ResourceUnavailable(format!("ffmpeg spawn failed: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::ResourceUnavailable("ffmpeg stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let tag = label.clone();
            let _ = std::thread::Builder::new().name("ffmpeg-log".into()).spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    warn!(source = %tag, "ffmpeg: {}", line);
                }
            });
        }

        let mut src = Self { label, child, frames: JpegSplitter::new(stdout), pending: None, index: 0 };

        // Se lee el primer frame ya: una fuente que no produce nada no se puede abrir.
        match src.read_frame() {
            Ok(Some(frame)) => {
                info!(source = %src.label, w = frame.rgb.width(), h = frame.rgb.height(), "🎥 Fuente abierta");
                src.pending = Some(frame);
                Ok(src)
            }
            Ok(None) => Err(DomainError::ResourceUnavailable(format!(
                "Could not open video source {}",
                src.label
            ))),
            Err(e) => Err(DomainError::ResourceUnavailable(format!(
                "Could not open video source {}: {e}",
                src.label
            ))),
        }
    }

    fn read_frame(&mut self) -> DomainResult<Option<Frame>> {
        let Some(jpeg) = self
            .frames
            .next_jpeg()
            .map_err(|e| DomainError::ResourceUnavailable(format!("ffmpeg read: {e}")))?
        else {
            return Ok(None);
        };
        let rgb = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .map_err(|e| DomainError::OperationFailed(format!("jpeg decode: {e}")))?
            .to_rgb8();
        self.index += 1;
        Ok(Some(Frame { index: self.index, rgb, jpeg }))
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> DomainResult<Option<Frame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        self.read_frame()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        match self.child.wait() {
            Ok(status) => debug!(source = %self.label, %status, "ffmpeg terminado"),
            Err(e) => warn!(source = %self.label, "No se pudo esperar a ffmpeg: {}", e),
        }
    }
}

/// Calidad JPEG 1..100 → `-q:v` de ffmpeg (2 mejor, 31 peor).
fn mjpeg_qscale(quality: u8) -> u8 {
    let q = quality.clamp(1, 100) as f32;
    (31.0 - (q - 1.0) * 29.0 / 99.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_maps_to_qscale_range() {
        assert_eq!(mjpeg_qscale(100), 2);
        assert_eq!(mjpeg_qscale(1), 31);
        assert!((4..=8).contains(&mjpeg_qscale(80)));
    }

    #[test]
    fn missing_file_is_not_found() {
        let src = VideoSource::File { path: "/nonexistent/clip.mp4".into(), transient: false };
        assert!(matches!(FfmpegSource::open("ffmpeg", &src, 80), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn missing_binary_is_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"x").unwrap();
        let src = VideoSource::File { path, transient: false };
        let res = FfmpegSource::open("/nonexistent/ffmpeg-bin", &src, 80);
        assert!(matches!(res, Err(DomainError::ResourceUnavailable(_))));
    }
}
