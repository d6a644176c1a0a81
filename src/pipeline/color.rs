//! Color transform engine: RGB → grayscale / sepia.
//!
//! Every path that changes pixels goes through this module: standalone
//! images, pdfium-rendered pages and `pdftoppm` rasters alike. Inputs of any
//! color mode (RGBA, palette, 16-bit, luma) are first flattened to 8-bit RGB.
//! Alpha is dropped rather than composited; transparent regions take whatever
//! color the decoder stored under them.
//!
//! Both transforms are per-pixel and independent, so the raw buffer is split
//! into pixel-sized chunks and processed with rayon.

use crate::config::Tone;
use crate::error::ToneError;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use rayon::prelude::*;
use std::path::Path;
use tracing::debug;

/// ITU-R BT.601 luma of one pixel, rounded to nearest.
pub fn grayscale_pixel(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    let weighted = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
    // Max is 255_000 + 500, so the quotient never exceeds 255.
    ((weighted + 500) / 1000) as u8
}

/// Sepia tone of one pixel. Each channel is floored and clamped on its own.
pub fn sepia_pixel(Rgb([r, g, b]): Rgb<u8>) -> Rgb<u8> {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let tr = 0.393 * r + 0.769 * g + 0.189 * b;
    let tg = 0.349 * r + 0.686 * g + 0.168 * b;
    let tb = 0.272 * r + 0.534 * g + 0.131 * b;
    Rgb([clamp_channel(tr), clamp_channel(tg), clamp_channel(tb)])
}

fn clamp_channel(v: f32) -> u8 {
    // `as u8` truncates toward zero, which is a floor for non-negative input.
    v.floor().clamp(0.0, 255.0) as u8
}

/// Single-channel grayscale copy of `image`.
pub fn to_grayscale(image: &DynamicImage) -> DynamicImage {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();

    let mut luma = vec![0u8; (w as usize) * (h as usize)];
    luma.par_iter_mut()
        .zip(rgb.as_raw().par_chunks_exact(3))
        .for_each(|(out, px)| *out = grayscale_pixel(Rgb([px[0], px[1], px[2]])));

    match GrayImage::from_raw(w, h, luma) {
        Some(img) => DynamicImage::ImageLuma8(img),
        // Buffer length is w*h by construction.
        None => DynamicImage::ImageLuma8(GrayImage::new(w, h)),
    }
}

/// Sepia-toned RGB copy of `image`.
pub fn to_sepia(image: &DynamicImage) -> DynamicImage {
    let mut rgb: RgbImage = image.to_rgb8();
    let raw: &mut [u8] = &mut rgb;
    raw.par_chunks_exact_mut(3).for_each(|px| {
        let Rgb(out) = sepia_pixel(Rgb([px[0], px[1], px[2]]));
        px.copy_from_slice(&out);
    });
    DynamicImage::ImageRgb8(rgb)
}

/// Apply `tone` to `image`.
pub fn apply_tone(image: &DynamicImage, tone: Tone) -> DynamicImage {
    debug!(
        "Applying {} to {}x{} {:?} image",
        tone,
        image.width(),
        image.height(),
        image.color()
    );
    match tone {
        Tone::Grayscale => to_grayscale(image),
        Tone::Sepia => to_sepia(image),
    }
}

/// Decode an image file, guessing the format from its content.
pub fn decode_image(path: &Path) -> Result<DynamicImage, ToneError> {
    if !path.exists() {
        return Err(ToneError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    image::ImageReader::open(path)
        .map_err(|e| ToneError::ImageDecode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?
        .with_guessed_format()
        .map_err(|e| ToneError::ImageDecode {
            path: path.to_path_buf(),
            source: image::ImageError::IoError(e),
        })?
        .decode()
        .map_err(|source| ToneError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}
