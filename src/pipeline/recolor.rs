//! PDF recolor pipeline.
//!
//! [`recolor_pdf`] picks a [`PipelineTier`] from the registry once per file
//! and runs it to completion:
//!
//! ```text
//! HighFidelity   pdfium render (×scale) ─▶ color ─▶ pdfium page, source size
//! Rasterize      pdftoppm (DPI)         ─▶ color ─▶ lopdf page, fixed format
//! StructuralCopy lopdf page copy, pixels untouched
//! ```
//!
//! A failing tier fails the file. There is no retry on a lower tier, and the
//! output is only written once every page has been produced, so a failure
//! never leaves a partial PDF behind.

use crate::backend::{BackendRegistry, PipelineTier};
use crate::config::{ConversionConfig, Tone};
use crate::error::ToneError;
use crate::output::{write_atomic, ConversionResult};
use crate::pipeline::raster::{self, Pdftoppm};
use crate::pipeline::{color, compose, structure};
use pdfium_locate::PdfiumLibrary;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{info, warn};

/// Recolor `source` into `dest` with the best tier `registry` allows.
///
/// Never returns an error: failures come back as an unsuccessful
/// [`ConversionResult`] carrying the cause.
pub fn recolor_pdf(
    source: &Path,
    dest: &Path,
    tone: Tone,
    registry: &BackendRegistry,
    config: &ConversionConfig,
) -> ConversionResult {
    let tier = registry.tier();
    info!("Recoloring {} to {} via {}", source.display(), tone, tier);

    match run_tier(tier, source, dest, tone, registry, config) {
        Ok(message) => ConversionResult::ok(source, dest, message),
        Err(e) => {
            warn!("{} failed: {}", source.display(), e);
            ConversionResult::failed(source, e.to_string())
        }
    }
}

/// Run one tier and describe what it did.
pub fn run_tier(
    tier: PipelineTier,
    source: &Path,
    dest: &Path,
    tone: Tone,
    registry: &BackendRegistry,
    config: &ConversionConfig,
) -> Result<String, ToneError> {
    match tier {
        PipelineTier::HighFidelity => {
            let lib = registry.pdfium().ok_or_else(|| unavailable("pdfium"))?;
            let pages = recolor_with_pdfium(lib, source, dest, tone, config.render_scale)?;
            Ok(format!("PDF converted to {tone} ({pages} pages)"))
        }
        PipelineTier::Rasterize => {
            let tool = registry.pdftoppm().ok_or_else(|| unavailable("pdftoppm"))?;
            let pages = recolor_with_pdftoppm(tool, source, dest, tone, config)?;
            Ok(format!(
                "PDF converted to {tone} via rasterisation ({pages} pages, {} DPI)",
                config.raster_dpi
            ))
        }
        PipelineTier::StructuralCopy => {
            let pages = structure::structural_copy(source, dest)?;
            Ok(format!(
                "PDF copied without color conversion ({pages} pages): \
                 no rasterisation backend available"
            ))
        }
    }
}

fn unavailable(backend: &str) -> ToneError {
    ToneError::BackendUnavailable {
        backend: backend.to_string(),
        hint: "not present in the backend registry".into(),
    }
}

/// Render with pdfium, recolor, and re-author each page at its source size.
fn recolor_with_pdfium(
    lib: &PdfiumLibrary,
    source: &Path,
    dest: &Path,
    tone: Tone,
    scale: f32,
) -> Result<usize, ToneError> {
    let pdfium = lib.bind().map_err(|e| ToneError::BackendUnavailable {
        backend: "pdfium".into(),
        hint: e.to_string(),
    })?;
    let compose_err = |e: PdfiumError| ToneError::Composition(format!("{:?}", e));

    let input = raster::load_document(&pdfium, source)?;
    let mut output = pdfium.create_new_pdf().map_err(compose_err)?;

    // pdfium renders grayscale natively; sepia needs an RGB raster.
    let native_gray = tone == Tone::Grayscale;
    let mut count = 0;

    for (index, page) in input.pages().iter().enumerate() {
        let (width, height) = (page.width(), page.height());
        let rendered = raster::render_page(&page, index + 1, scale, native_gray)?;
        let toned = color::apply_tone(&rendered, tone);

        let mut new_page = output
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(compose_err)?;
        let mut image_object = PdfPageImageObject::new(&output, &toned).map_err(compose_err)?;
        image_object
            .scale(width.value, height.value)
            .map_err(compose_err)?;
        new_page
            .objects_mut()
            .add_object(PdfPageObject::Image(image_object))
            .map_err(compose_err)?;
        count += 1;
    }

    let bytes = output.save_to_bytes().map_err(compose_err)?;
    write_atomic(dest, &bytes)?;
    Ok(count)
}

/// Rasterise with `pdftoppm`, recolor, and compose onto fixed-format pages.
fn recolor_with_pdftoppm(
    tool: &Pdftoppm,
    source: &Path,
    dest: &Path,
    tone: Tone,
    config: &ConversionConfig,
) -> Result<usize, ToneError> {
    let rasters = tool.rasterize(source, config.raster_dpi)?;
    if rasters.is_empty() {
        return Err(ToneError::Rasterisation {
            page: 0,
            detail: "pdftoppm produced no pages".into(),
        });
    }

    let toned: Vec<_> = rasters.iter().map(|r| color::apply_tone(r, tone)).collect();
    let bytes = compose::compose_rasters(&toned, config.page_format, config.margin_pt)?;
    write_atomic(dest, &bytes)?;
    Ok(toned.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn structural_tier_reports_no_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
        let src = dir.path().join("in.pdf");
        std::fs::write(&src, compose::image_to_pdf(&img, 72.0).unwrap()).unwrap();
        let dest = dir.path().join("out.pdf");

        let result = recolor_pdf(
            &src,
            &dest,
            Tone::Sepia,
            &BackendRegistry::structural_only(),
            &ConversionConfig::default(),
        );
        assert!(result.success, "{}", result.message);
        assert!(result.message.contains("without color conversion"));
        assert_eq!(structure::page_count(&dest).unwrap(), 1);
    }

    #[test]
    fn missing_source_fails_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pdf");
        let result = recolor_pdf(
            Path::new("/nonexistent/pdftone/in.pdf"),
            &dest,
            Tone::Grayscale,
            &BackendRegistry::structural_only(),
            &ConversionConfig::default(),
        );
        assert!(!result.success);
        assert!(!dest.exists());
    }

    #[test]
    fn broken_rasteriser_does_not_fall_back() {
        let dir = tempfile::tempdir().unwrap();
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::new(4, 4));
        let src = dir.path().join("in.pdf");
        std::fs::write(&src, compose::image_to_pdf(&img, 72.0).unwrap()).unwrap();
        let dest = dir.path().join("out.pdf");

        let registry = BackendRegistry::new(
            None,
            Some(Pdftoppm::new(PathBuf::from("/nonexistent/pdftone/pdftoppm"))),
        );
        assert_eq!(registry.tier(), PipelineTier::Rasterize);

        let result = recolor_pdf(
            &src,
            &dest,
            Tone::Grayscale,
            &registry,
            &ConversionConfig::default(),
        );
        assert!(!result.success);
        assert!(result.message.contains("pdftoppm"), "{}", result.message);
        assert!(!dest.exists());
    }
}
