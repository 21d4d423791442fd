use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::annotate::encode_jpeg;
use crate::application::ports::FrameSource;
use crate::domain::{
    errors::{DomainError, DomainResult},
    stream::Frame,
};

/// Configuración para inicializar la captura de vídeo.
pub struct CaptureConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub jpeg_quality: u8,
}

/// Captura nativa V4L2. El dispositivo se cierra al soltar la captura.
pub struct V4l2Capture {
    stream: Stream<'static>,
    _device: Device,
    fourcc: FourCC,
    width: u32,
    height: u32,
    jpeg_quality: u8,
    index: u64,
}

impl V4l2Capture {
    /// Abre el dispositivo pidiendo MJPG; el driver puede imponer YUYV.
    pub fn open(cfg: &CaptureConfig) -> Result<Self> {
        let dev = Device::new(cfg.device_index as usize)?;

        let mut fmt = dev.format()?;
        fmt.fourcc = FourCC::new(b"MJPG");
        fmt.width = cfg.width;
        fmt.height = cfg.height;
        let actual_fmt = dev.set_format(&fmt)?;

        let mut params = dev.params()?;
        params.interval.numerator = 1;
        params.interval.denominator = cfg.fps;
        let _ = dev.set_params(&params);

        let stream = Stream::with_buffers(&dev, v4l::buffer::Type::VideoCapture, 4)?;

        tracing::info!(
            "Cámara abierta: /dev/video{} {}x{} [{}] a {} FPS",
            cfg.device_index, actual_fmt.width, actual_fmt.height, actual_fmt.fourcc, cfg.fps
        );

        Ok(Self {
            stream,
            _device: dev,
            fourcc: actual_fmt.fourcc,
            width: actual_fmt.width,
            height: actual_fmt.height,
            jpeg_quality: cfg.jpeg_quality,
            index: 0,
        })
    }

    /// Siguiente frame como RGB (inferencia) y JPEG (snapshot).
    fn next_rgb_and_jpeg(&mut self) -> Result<(RgbImage, Vec<u8>)> {
        let (data, _) = self.stream.next()?;
        let fcc_str = self.fourcc.str().map_err(|_| anyhow!("FourCC inválido"))?;

        match fcc_str {
            "MJPG" => {
                let rgb = image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8();
                Ok((rgb, data.to_vec()))
            }
            "YUYV" => {
                let rgb = yuyv_to_rgb(data, self.width, self.height);
                let jpeg = encode_jpeg(&rgb, self.jpeg_quality)?;
                Ok((rgb, jpeg))
            }
            _ => Err(anyhow!("Formato de cámara {} no soportado", fcc_str)),
        }
    }
}

impl FrameSource for V4l2Capture {
    fn next_frame(&mut self) -> DomainResult<Option<Frame>> {
        let (rgb, jpeg) = self
            .next_rgb_and_jpeg()
            .map_err(|e| DomainError::ResourceUnavailable(format!("v4l2 capture: {e}")))?;
        self.index += 1;
        Ok(Some(Frame { index: self.index, rgb, jpeg }))
    }
}

/// YUYV (YUV 4:2:2, BT.601) a RGB. Cada bloque `[Y0, U, Y1, V]` da dos píxeles.
fn yuyv_to_rgb(yuyv: &[u8], w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);
    let px = |y: f32, u: f32, v: f32| {
        image::Rgb([
            (y + 1.402 * v).clamp(0.0, 255.0) as u8,
            (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
            (y + 1.772 * u).clamp(0.0, 255.0) as u8,
        ])
    };

    for (i, chunk) in yuyv.chunks_exact(4).enumerate() {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        let idx = i as u32 * 2;
        let (x, y) = (idx % w, idx / w);
        if y >= h {
            break;
        }
        out.put_pixel(x, y, px(chunk[0] as f32, u, v));
        if x + 1 < w {
            out.put_pixel(x + 1, y, px(chunk[2] as f32, u, v));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_gives_grey() {
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1);
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([100, 100, 100]));
        assert_eq!(rgb.get_pixel(1, 0), &image::Rgb([200, 200, 200]));
    }
}
