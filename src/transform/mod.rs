pub mod params;

use crate::config::{FitMode, OutputFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, Rgba, RgbaImage};
use params::{MarkPosition, RenditionParams};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to read source: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode image: {0}")]
    Encode(String),
    #[error("failed to load watermark '{0}': {1}")]
    Watermark(String, String),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// External image-transform collaborator: given a source file and a
/// parameter set, return encoded rendition bytes or fail.
#[async_trait::async_trait]
pub trait TransformEngine: Send + Sync {
    async fn render(
        &self,
        source: &Path,
        params: &RenditionParams,
    ) -> Result<Vec<u8>, TransformError>;
}

/// CPU transform engine built on the `image` and `webp` crates.
pub struct ImageEngine {
    default_quality: u8,
    default_fit: FitMode,
    default_format: OutputFormat,
}

impl ImageEngine {
    pub fn new(default_quality: u8, default_fit: FitMode, default_format: OutputFormat) -> Self {
        Self {
            default_quality,
            default_fit,
            default_format,
        }
    }
}

#[async_trait::async_trait]
impl TransformEngine for ImageEngine {
    async fn render(
        &self,
        source: &Path,
        params: &RenditionParams,
    ) -> Result<Vec<u8>, TransformError> {
        let bytes = tokio::fs::read(source).await?;
        let params = params.clone();
        let default_quality = self.default_quality;
        let default_fit = self.default_fit;
        let default_format = self.default_format;

        // Decoding and encoding are CPU-bound; keep them off the async
        // runtime's worker threads.
        tokio::task::spawn_blocking(move || {
            render_bytes(&bytes, &params, default_quality, default_fit, default_format)
        })
        .await
        .map_err(|e| TransformError::Aborted(e.to_string()))?
    }
}

fn render_bytes(
    bytes: &[u8],
    params: &RenditionParams,
    default_quality: u8,
    default_fit: FitMode,
    default_format: OutputFormat,
) -> Result<Vec<u8>, TransformError> {
    let guessed =
        image::guess_format(bytes).map_err(|e| TransformError::Decode(e.to_string()))?;
    let mut img = image::load_from_memory_with_format(bytes, guessed)
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    if let Some(rect) = params.crop() {
        let (ow, oh) = img.dimensions();
        if rect.x < ow && rect.y < oh && rect.width > 0 && rect.height > 0 {
            let w = rect.width.min(ow - rect.x);
            let h = rect.height.min(oh - rect.y);
            img = img.crop_imm(rect.x, rect.y, w, h);
        }
    }

    if let Some(rot) = params.rotation() {
        img = match rot.rem_euclid(360) {
            90 => img.rotate90(),
            180 => img.rotate180(),
            270 => img.rotate270(),
            _ => img,
        };
    }

    img = apply_fit(img, params, default_fit);
    img = apply_adjustments(img, params);

    if let Some(mark) = params.mark() {
        img = apply_watermark(img, mark, params)?;
    }

    let format = params
        .format()
        .or_else(|| output_format_for(guessed))
        .unwrap_or(default_format);
    let quality = params.quality().unwrap_or(default_quality);
    encode(&img, format, quality)
}

/// Reconcile requested dimensions with the source aspect ratio.
fn apply_fit(img: DynamicImage, params: &RenditionParams, default_fit: FitMode) -> DynamicImage {
    let dpr = params.dpr().unwrap_or(1.0);
    let scale_dim = |d: u32| ((d as f64 * dpr).round() as u32).max(1);
    let w = params.width().map(scale_dim);
    let h = params.height().map(scale_dim);
    let fit = params.fit().unwrap_or(default_fit);
    let (ow, oh) = img.dimensions();

    match (w, h) {
        (None, None) => img,
        (Some(w), Some(h)) => match fit {
            FitMode::Max => {
                let scale = (w as f64 / ow as f64).min(h as f64 / oh as f64);
                if scale >= 1.0 {
                    img
                } else {
                    img.resize(w, h, image::imageops::FilterType::Lanczos3)
                }
            }
            FitMode::Crop => img.resize_to_fill(w, h, image::imageops::FilterType::Lanczos3),
            FitMode::Fill => {
                let inner = img.resize(w, h, image::imageops::FilterType::Lanczos3);
                let mut canvas = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
                let x = (w.saturating_sub(inner.width())) / 2;
                let y = (h.saturating_sub(inner.height())) / 2;
                image::imageops::overlay(&mut canvas, &inner.to_rgba8(), x as i64, y as i64);
                DynamicImage::ImageRgba8(canvas)
            }
            FitMode::Stretch => img.resize_exact(w, h, image::imageops::FilterType::Lanczos3),
        },
        // One dimension: scale proportionally; `max` never upscales.
        (Some(w), None) => {
            let mut scale = w as f64 / ow as f64;
            if fit == FitMode::Max {
                scale = scale.min(1.0);
            }
            proportional(img, scale)
        }
        (None, Some(h)) => {
            let mut scale = h as f64 / oh as f64;
            if fit == FitMode::Max {
                scale = scale.min(1.0);
            }
            proportional(img, scale)
        }
    }
}

fn proportional(img: DynamicImage, scale: f64) -> DynamicImage {
    if (scale - 1.0).abs() < f64::EPSILON {
        return img;
    }
    let (ow, oh) = img.dimensions();
    let w = ((ow as f64 * scale).round() as u32).max(1);
    let h = ((oh as f64 * scale).round() as u32).max(1);
    img.resize_exact(w, h, image::imageops::FilterType::Lanczos3)
}

/// Color filters and intensity adjustments, applied in a fixed order so the
/// same parameter set always renders identical bytes.
fn apply_adjustments(mut img: DynamicImage, params: &RenditionParams) -> DynamicImage {
    match params.filter() {
        Some("greyscale") | Some("grayscale") => img = DynamicImage::ImageLuma8(img.to_luma8()),
        Some("sepia") => img = sepia(&img),
        _ => {}
    }
    if let Some(sigma) = params.blur() {
        img = img.blur(sigma.clamp(0.0, 100.0));
    }
    if let Some(pct) = params.brightness() {
        img = img.brighten(pct * 255 / 100);
    }
    if let Some(pct) = params.contrast() {
        img = img.adjust_contrast(pct);
    }
    if let Some(gamma) = params.gamma() {
        img = apply_gamma(&img, gamma);
    }
    if let Some(amount) = params.sharpen() {
        let sigma = (amount.clamp(1.0, 100.0) / 20.0).max(0.5);
        img = img.unsharpen(sigma, 2);
    }
    img
}

fn sepia(img: &DynamicImage) -> DynamicImage {
    let mut out = img.to_rgba8();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        pixel.0 = [
            (0.393 * r + 0.769 * g + 0.189 * b).min(255.0) as u8,
            (0.349 * r + 0.686 * g + 0.168 * b).min(255.0) as u8,
            (0.272 * r + 0.534 * g + 0.131 * b).min(255.0) as u8,
            a,
        ];
    }
    DynamicImage::ImageRgba8(out)
}

fn apply_gamma(img: &DynamicImage, gamma: f32) -> DynamicImage {
    let exponent = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = ((i as f32 / 255.0).powf(exponent) * 255.0).round() as u8;
    }
    let mut out = img.to_rgba8();
    for pixel in out.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        pixel.0 = [lut[r as usize], lut[g as usize], lut[b as usize], a];
    }
    DynamicImage::ImageRgba8(out)
}

fn apply_watermark(
    base: DynamicImage,
    mark_path: &str,
    params: &RenditionParams,
) -> Result<DynamicImage, TransformError> {
    let bytes = std::fs::read(mark_path)
        .map_err(|e| TransformError::Watermark(mark_path.into(), e.to_string()))?;
    let mut mark = image::load_from_memory(&bytes)
        .map_err(|e| TransformError::Watermark(mark_path.into(), e.to_string()))?;

    if let Some(w) = params.mark_width() {
        let scale = w as f64 / mark.width() as f64;
        mark = proportional(mark, scale);
    }

    let mut mark = mark.to_rgba8();
    if let Some(alpha) = params.mark_alpha() {
        for pixel in mark.pixels_mut() {
            pixel.0[3] = (pixel.0[3] as u32 * alpha as u32 / 100) as u8;
        }
    }

    let (bw, bh) = base.dimensions();
    let (mw, mh) = mark.dimensions();
    let (x, y) = anchor(params.mark_position(), bw, bh, mw, mh);

    let mut out = base.to_rgba8();
    image::imageops::overlay(&mut out, &mark, x, y);
    Ok(DynamicImage::ImageRgba8(out))
}

fn anchor(position: MarkPosition, bw: u32, bh: u32, mw: u32, mh: u32) -> (i64, i64) {
    let right = bw.saturating_sub(mw) as i64;
    let bottom = bh.saturating_sub(mh) as i64;
    let center_x = right / 2;
    let center_y = bottom / 2;
    match position {
        MarkPosition::TopLeft => (0, 0),
        MarkPosition::Top => (center_x, 0),
        MarkPosition::TopRight => (right, 0),
        MarkPosition::Left => (0, center_y),
        MarkPosition::Center => (center_x, center_y),
        MarkPosition::Right => (right, center_y),
        MarkPosition::BottomLeft => (0, bottom),
        MarkPosition::Bottom => (center_x, bottom),
        MarkPosition::BottomRight => (right, bottom),
    }
}

fn output_format_for(format: image::ImageFormat) -> Option<OutputFormat> {
    match format {
        image::ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
        image::ImageFormat::Png => Some(OutputFormat::Png),
        image::ImageFormat::WebP => Some(OutputFormat::Webp),
        image::ImageFormat::Avif => Some(OutputFormat::Avif),
        _ => None,
    }
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, TransformError> {
    let mut out = Vec::new();
    let quality = quality.clamp(1, 100);

    match format {
        OutputFormat::Jpeg | OutputFormat::Pjpg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let enc = JpegEncoder::new_with_quality(&mut out, quality);
            enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let enc = PngEncoder::new(&mut out);
            enc.write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
        }
        OutputFormat::Webp => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let encoder = webp::Encoder::from_rgb(rgb.as_raw(), w, h);
            let encoded = encoder.encode(quality as f32);
            out.extend_from_slice(&encoded);
        }
        OutputFormat::Avif => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            // Speed 4 balances encoding time and compression ratio
            let enc = AvifEncoder::new_with_speed_quality(&mut out, 4, quality);
            enc.write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| TransformError::Encode(e.to_string()))?;
        }
    }

    Ok(out)
}
