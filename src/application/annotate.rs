use image::{imageops::FilterType, Rgb, RgbImage};

use crate::application::scheduler::SchedulerParams;
use crate::domain::{
    camera::Levers,
    detection::{BBox, Detection},
    errors::{DomainError, DomainResult},
};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LEVER_ON: Rgb<u8> = Rgb([0, 255, 0]);
const LEVER_OFF: Rgb<u8> = Rgb([60, 60, 60]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Escala de la fuente 3x5: cada punto ocupa `GLYPH_SCALE`x`GLYPH_SCALE` píxeles.
const GLYPH_SCALE: u32 = 2;
const GLYPH_ADVANCE: u32 = 4 * GLYPH_SCALE;
const CAPTION_HEIGHT: u32 = 5 * GLYPH_SCALE + 4;

/// Copia reducida para inferencia. Nunca por debajo de 1x1.
pub fn resize_for_inference(rgb: &RgbImage, scale: f32) -> RgbImage {
    let w = ((rgb.width() as f32 * scale) as u32).max(1);
    let h = ((rgb.height() as f32 * scale) as u32).max(1);
    image::imageops::resize(rgb, w, h, FilterType::Triangle)
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> DomainResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    enc.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
        .map_err(|e| DomainError::OperationFailed(format!("jpeg encode: {e}")))?;
    Ok(buf)
}

pub fn draw_detections(img: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        draw_rect(img, &det.bbox, BOX_COLOR, 2);
        draw_caption(img, &det.bbox, &caption(det));
    }
}

/// Texto de la etiqueta: `"clase conf"`.
pub fn caption(det: &Detection) -> String {
    format!("{} {:.2}", det.class_label, det.confidence)
}

/// Etiqueta sobre fondo del color de la caja, encima si cabe y si no dentro.
fn draw_caption(img: &mut RgbImage, bbox: &BBox, text: &str) {
    let (w, h) = img.dimensions();
    if w < GLYPH_ADVANCE || h < CAPTION_HEIGHT || text.is_empty() {
        return;
    }
    let x0 = (bbox.x1.max(0.0) as u32).min(w - 1);
    let top = bbox.y1.max(0.0) as u32;
    let y0 = if top >= CAPTION_HEIGHT { top - CAPTION_HEIGHT } else { top.min(h - CAPTION_HEIGHT) };

    let text_w = text.chars().count() as u32 * GLYPH_ADVANCE + 2;
    fill_rect(img, x0, y0, x0 + text_w, y0 + CAPTION_HEIGHT - 1, BOX_COLOR);

    let mut x = x0 + 2;
    for ch in text.chars() {
        if x >= w {
            break;
        }
        draw_glyph(img, x, y0 + 2, glyph(ch), TEXT_COLOR);
        x += GLYPH_ADVANCE;
    }
}

fn draw_glyph(img: &mut RgbImage, x0: u32, y0: u32, rows: [u8; 5], color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..3u32 {
            if (bits >> (2 - col)) & 1 == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let (x, y) = (x0 + col * GLYPH_SCALE + dx, y0 + row as u32 * GLYPH_SCALE + dy);
                    if x < w && y < h {
                        img.put_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

/// Fuente 3x5 (mayúsculas, dígitos y puntuación básica). Lo desconocido queda en blanco.
fn glyph(ch: char) -> [u8; 5] {
    match ch.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        _ => [0; 5],
    }
}

/// Indicador de palancas: un cuadro por nivel de salto y una barra de escala.
pub fn draw_lever_overlay(img: &mut RgbImage, levers: Levers, params: &SchedulerParams) {
    let (w, h) = img.dimensions();
    if w < 16 || h < 16 {
        return;
    }
    for i in 0..params.max_skip {
        let color = if i < levers.skip_count { LEVER_ON } else { LEVER_OFF };
        let x0 = 6 + i * 10;
        fill_rect(img, x0, 6, x0 + 7, 13, color);
    }
    let bar_max = (w / 4).max(10);
    let filled = ((bar_max as f32) * levers.scale_factor.clamp(0.0, 1.0)) as u32;
    fill_rect(img, 6, 18, 6 + bar_max, 21, LEVER_OFF);
    if filled > 0 {
        fill_rect(img, 6, 18, 6 + filled, 21, LEVER_ON);
    }
}

fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let (w, h) = img.dimensions();
    for y in y0..=y1.min(h - 1) {
        for x in x0..=x1.min(w - 1) {
            img.put_pixel(x, y, color);
        }
    }
}

fn draw_rect(img: &mut RgbImage, bbox: &BBox, color: Rgb<u8>, thickness: u32) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let clamp = |v: f32, max: u32| -> u32 { v.max(0.0).min((max - 1) as f32) as u32 };
    let (x0, y0) = (clamp(bbox.x1, w), clamp(bbox.y1, h));
    let (x1, y1) = (clamp(bbox.x2, w), clamp(bbox.y2, h));
    if x0 > x1 || y0 > y1 {
        return;
    }
    for t in 0..thickness {
        let (xx0, yy0) = (x0 + t, y0 + t);
        let (xx1, yy1) = (x1.saturating_sub(t), y1.saturating_sub(t));
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            img.put_pixel(x, yy0, color);
            img.put_pixel(x, yy1, color);
        }
        for y in yy0..=yy1 {
            img.put_pixel(xx0, y, color);
            img.put_pixel(xx1, y, color);
        }
    }
}
