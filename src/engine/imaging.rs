//! Image transform collaborator: decode, resize to a target box, encode JPEG.

use anyhow::{Context, Result, bail};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use serde::Deserialize;

use crate::utils::config::ResizeDefaults;

/// How the canvas around a non-cropped image is filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtendMode {
    Black,
    White,
    /// Repeat the nearest edge pixel.
    Copy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos => FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResizeOptions {
    pub width: u32,
    pub height: u32,
    /// Fill the whole box and crop the overflow (centred). Otherwise fit inside and extend.
    pub crop: bool,
    pub extend: ExtendMode,
    pub interpolation: Interpolation,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        ResizeOptions {
            width: ResizeDefaults::WIDTH,
            height: ResizeDefaults::HEIGHT,
            crop: false,
            extend: ExtendMode::White,
            interpolation: Interpolation::Bilinear,
            quality: ResizeDefaults::QUALITY,
        }
    }
}

/// Resize `bytes` (any supported format) to exactly `width x height` and return it as JPEG.
pub fn resize_image(bytes: &[u8], opts: &ResizeOptions) -> Result<Vec<u8>> {
    if opts.width == 0 || opts.height == 0 {
        bail!(
            "resize target must be non-zero, got {}x{}",
            opts.width,
            opts.height
        );
    }
    let img = image::load_from_memory(bytes).context("decode image")?;
    let filter = opts.interpolation.filter();
    let out = if opts.crop {
        img.resize_to_fill(opts.width, opts.height, filter).to_rgb8()
    } else {
        let fitted = img.resize(opts.width, opts.height, filter).to_rgb8();
        extend_to(fitted, opts.width, opts.height, opts.extend)
    };
    encode_jpeg(&out, opts.quality)
}

/// Centre `img` on a `width x height` canvas, filling the border per `mode`.
fn extend_to(img: RgbImage, width: u32, height: u32, mode: ExtendMode) -> RgbImage {
    let (iw, ih) = img.dimensions();
    if (iw, ih) == (width, height) || iw == 0 || ih == 0 {
        return img;
    }
    let off_x = i64::from(width.saturating_sub(iw) / 2);
    let off_y = i64::from(height.saturating_sub(ih) / 2);
    RgbImage::from_fn(width, height, |x, y| {
        let sx = i64::from(x) - off_x;
        let sy = i64::from(y) - off_y;
        let inside = (0..i64::from(iw)).contains(&sx) && (0..i64::from(ih)).contains(&sy);
        match mode {
            _ if inside => *img.get_pixel(sx as u32, sy as u32),
            ExtendMode::White => Rgb([255, 255, 255]),
            ExtendMode::Black => Rgb([0, 0, 0]),
            ExtendMode::Copy => *img.get_pixel(
                sx.clamp(0, i64::from(iw) - 1) as u32,
                sy.clamp(0, i64::from(ih) - 1) as u32,
            ),
        }
    })
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(img)
        .context("encode jpeg")?;
    Ok(buf)
}
