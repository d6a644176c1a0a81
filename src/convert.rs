//! Conversion entry points: single files, batches, merges and the combined
//! convert-then-merge job.
//!
//! ## Fault isolation
//!
//! Every function that takes a list of files validates the request first and
//! returns `Err` only for those precondition failures. Once work has started,
//! a failing file is recorded in the [`BatchReport`] and the batch moves on.
//!
//! All functions here block. They are meant to run on the batch worker
//! thread (see [`crate::batch`]) or in a plain synchronous caller.

use crate::backend::BackendRegistry;
use crate::config::{ConversionConfig, MergeOrder, Tone};
use crate::error::ToneError;
use crate::output::{write_atomic, BatchReport, ConversionResult};
use crate::pipeline::compose::{self, IMAGE_PAGE_DPI};
use crate::pipeline::{color, recolor, structure};
use crate::progress::{file_start_percent, ProgressReporter};
use crate::source::{SourceItem, SourceKind};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name of a merge job's output when none is configured.
pub const DEFAULT_MERGE_NAME: &str = "merged_document.pdf";

/// File name of a convert-then-merge job's output when none is configured.
pub const DEFAULT_COMBINED_NAME: &str = "converted_merged.pdf";

// ── Validation ───────────────────────────────────────────────────────────

/// Preconditions of [`convert_batch`] and [`convert_and_merge`].
pub fn validate_conversion(paths: &[PathBuf], config: &ConversionConfig) -> Result<(), ToneError> {
    if paths.is_empty() {
        return Err(ToneError::Validation("no files selected".into()));
    }
    config.require_output_dir()?;
    Ok(())
}

/// Preconditions of [`merge_batch`]: an output directory and at least two
/// PDF inputs.
pub fn validate_merge(paths: &[PathBuf], config: &ConversionConfig) -> Result<(), ToneError> {
    if let Some(bad) = paths
        .iter()
        .find(|p| !matches!(SourceItem::classify(p), Ok(item) if item.kind == SourceKind::Pdf))
    {
        return Err(ToneError::Validation(format!(
            "only PDF files can be merged: '{}'",
            bad.display()
        )));
    }
    if paths.len() < 2 {
        return Err(ToneError::Validation(format!(
            "at least 2 PDF files are needed to merge, got {}",
            paths.len()
        )));
    }
    config.require_output_dir()?;
    Ok(())
}

// ── Single files ─────────────────────────────────────────────────────────

/// Decode `source`, apply `tone`, and write it to `dest` in the format
/// implied by `dest`'s extension.
pub fn convert_image(source: &Path, dest: &Path, tone: Tone) -> Result<(), ToneError> {
    let image = color::decode_image(source)?;
    let toned = color::apply_tone(&image, tone);
    let bytes = encode_image(&toned, dest)?;
    write_atomic(dest, &bytes)
}

fn encode_image(image: &DynamicImage, dest: &Path) -> Result<Vec<u8>, ToneError> {
    let encode_err = |source: image::ImageError| ToneError::ImageEncode {
        path: dest.to_path_buf(),
        source,
    };
    let format = ImageFormat::from_path(dest).map_err(encode_err)?;

    // The GIF encoder only takes RGB(A) input.
    let image = match (format, image) {
        (ImageFormat::Gif, DynamicImage::ImageLuma8(_)) => {
            DynamicImage::ImageRgb8(image.to_rgb8())
        }
        _ => image.clone(),
    };

    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).map_err(encode_err)?;
    Ok(buf.into_inner())
}

/// Write `image` as a one-page PDF at [`IMAGE_PAGE_DPI`].
fn write_image_pdf(image: &DynamicImage, dest: &Path) -> Result<(), ToneError> {
    let bytes = compose::image_to_pdf(image, IMAGE_PAGE_DPI)?;
    write_atomic(dest, &bytes)
}

/// Convert one classified item to `dest`.
pub fn convert_item_to(
    item: &SourceItem,
    dest: &Path,
    config: &ConversionConfig,
    registry: &BackendRegistry,
) -> ConversionResult {
    match item.kind {
        SourceKind::Pdf => recolor::recolor_pdf(&item.path, dest, config.tone, registry, config),
        SourceKind::Image => match convert_image(&item.path, dest, config.tone) {
            Ok(()) => ConversionResult::ok(
                &item.path,
                dest,
                format!("Image converted to {}", config.tone),
            ),
            Err(e) => ConversionResult::failed(&item.path, e.to_string()),
        },
    }
}

/// Convert one file into the configured output directory.
pub fn convert_file(
    path: &Path,
    config: &ConversionConfig,
    registry: &BackendRegistry,
) -> ConversionResult {
    let item = match SourceItem::classify(path) {
        Ok(item) => item,
        Err(e) => return ConversionResult::failed(path, e.to_string()),
    };
    let out_dir = match config.require_output_dir() {
        Ok(dir) => dir,
        Err(e) => return ConversionResult::failed(path, e.to_string()),
    };
    let dest = item.output_path(out_dir, config.tone, config.suffix_style);
    convert_item_to(&item, &dest, config, registry)
}

// ── Batches ──────────────────────────────────────────────────────────────

/// Convert every file in `paths`, in order.
pub fn convert_batch(
    paths: &[PathBuf],
    config: &ConversionConfig,
    registry: &BackendRegistry,
    progress: &mut ProgressReporter,
) -> Result<BatchReport, ToneError> {
    validate_conversion(paths, config)?;

    let total = paths.len();
    let mut report = BatchReport::new(total);
    info!("Converting {} files to {}", total, config.tone);

    for (i, path) in paths.iter().enumerate() {
        progress.report(
            file_start_percent(i, total),
            format!("Processing {} ({}/{})", display_name(path), i + 1, total),
        );

        let result = convert_file(path, config, registry);
        debug!("{}: {}", path.display(), result.message);
        report.record(&result);

        if result.success && config.delete_originals && delete_original(path) {
            report.deleted_originals += 1;
        }
    }

    progress.report(
        100.0,
        format!("Converted {}/{} files", report.successful, total),
    );
    info!(
        "Batch complete: {}/{} succeeded",
        report.successful, report.total
    );
    Ok(report)
}

/// Merge `paths` (reordered by `order`) into one PDF in the output directory.
pub fn merge_batch(
    paths: &[PathBuf],
    order: &MergeOrder,
    config: &ConversionConfig,
    progress: &mut ProgressReporter,
) -> Result<BatchReport, ToneError> {
    validate_merge(paths, config)?;
    let ordered = order.apply(paths)?;
    let out_dir = config.require_output_dir()?;
    let dest = out_dir.join(
        config
            .merge_output_name
            .as_deref()
            .unwrap_or(DEFAULT_MERGE_NAME),
    );

    let total = ordered.len();
    let mut report = BatchReport::new(total);

    let merged = structure::merge_pdfs_with_progress(&ordered, &dest, |i, path| {
        progress.report(
            file_start_percent(i, total),
            format!("Adding {} ({}/{})", display_name(path), i + 1, total),
        );
    });

    match merged {
        Ok(summary) => {
            report.successful = total;
            report.outputs.push(summary.output.clone());
            report.merged_output = Some(summary.output);
            if config.delete_originals {
                // Re-merging into an existing merged file lists it as an input.
                let written = std::fs::canonicalize(&dest).ok();
                report.deleted_originals = ordered
                    .iter()
                    .filter(|p| *p != &dest && std::fs::canonicalize(p).ok() != written)
                    .filter(|p| delete_original(p))
                    .count();
            }
            progress.report(
                100.0,
                format!("Merged {} files ({} pages)", total, summary.total_pages),
            );
        }
        Err(e) => {
            let culprit = match &e {
                ToneError::Merge { path, .. } => path.clone(),
                _ => dest.clone(),
            };
            report
                .failed_files
                .push(ConversionResult::failed(&culprit, e.to_string()).failure_description());
            progress.report(100.0, "Merge failed");
        }
    }
    Ok(report)
}

/// Convert every file into a private temp directory, then merge the results
/// in input order.
///
/// A file whose conversion fails is recorded as failed and its original
/// (wrapped as a PDF when it is an image) is merged in its place. The temp
/// directory is removed afterwards unless `keep_intermediates` is set.
pub fn convert_and_merge(
    paths: &[PathBuf],
    config: &ConversionConfig,
    registry: &BackendRegistry,
    progress: &mut ProgressReporter,
) -> Result<BatchReport, ToneError> {
    validate_conversion(paths, config)?;
    let out_dir = config.require_output_dir()?;
    let dest = out_dir.join(
        config
            .merge_output_name
            .as_deref()
            .unwrap_or(DEFAULT_COMBINED_NAME),
    );

    let workdir = tempfile::Builder::new()
        .prefix("pdftone_")
        .tempdir()
        .map_err(|e| ToneError::Internal(format!("cannot create temp dir: {e}")))?;

    progress.report(5.0, "Starting combined conversion");

    let total = paths.len();
    let mut report = BatchReport::new(total);
    let mut merge_inputs = Vec::with_capacity(total);
    let mut merged_sources = Vec::with_capacity(total);

    for (i, path) in paths.iter().enumerate() {
        progress.report(
            10.0 + file_start_percent(i, total) * 0.6,
            format!("Converting {} ({}/{})", display_name(path), i + 1, total),
        );

        // One subdirectory per input keeps equal file stems apart.
        let staging = workdir.path().join(format!("{:03}", i + 1));
        let (result, staged) = stage_for_merge(path, &staging, config, registry);
        report.record(&result);
        if let Some(staged) = staged {
            merge_inputs.push(staged);
            merged_sources.push(path.clone());
        }
    }

    if merge_inputs.is_empty() {
        warn!("No input could be converted or wrapped; nothing to merge");
        progress.report(100.0, "Nothing to merge");
        return Ok(report);
    }

    progress.report(75.0, format!("Merging {} files", merge_inputs.len()));
    match structure::merge_pdfs(&merge_inputs, &dest) {
        Ok(summary) => {
            info!(
                "Combined {} files into {} ({} pages)",
                summary.input_files,
                dest.display(),
                summary.total_pages
            );
            report.outputs.push(summary.output.clone());
            report.merged_output = Some(summary.output);

            progress.report(90.0, "Cleaning up");
            if config.delete_originals {
                report.deleted_originals = merged_sources
                    .iter()
                    .filter(|p| delete_original(p))
                    .count();
            }
        }
        Err(e) => {
            // The merged file is the only deliverable; without it nothing succeeded.
            report.successful = 0;
            report
                .failed_files
                .push(ConversionResult::failed(&dest, e.to_string()).failure_description());
        }
    }

    if config.keep_intermediates {
        let kept = workdir.keep();
        info!("Intermediate files kept in {}", kept.display());
        report.intermediates_dir = Some(kept);
    } else if let Err(e) = workdir.close() {
        warn!("Could not remove temporary directory: {}", e);
    }

    progress.report(100.0, "Done");
    Ok(report)
}

/// Produce the PDF that stands for `path` in a combined merge.
///
/// Returns the conversion result and the PDF to merge, if any.
fn stage_for_merge(
    path: &Path,
    staging: &Path,
    config: &ConversionConfig,
    registry: &BackendRegistry,
) -> (ConversionResult, Option<PathBuf>) {
    let item = match SourceItem::classify(path) {
        Ok(item) => item,
        Err(e) => return (ConversionResult::failed(path, e.to_string()), None),
    };
    let tone = Some((config.tone, config.suffix_style));

    match item.kind {
        SourceKind::Pdf => {
            let dest = item.pdf_path(staging, tone);
            let result = convert_item_to(&item, &dest, config, registry);
            let staged = if result.success {
                dest
            } else {
                warn!("Merging original of {} instead", item.file_name());
                item.path.clone()
            };
            (result, Some(staged))
        }
        SourceKind::Image => {
            let dest = item.pdf_path(staging, tone);
            let converted = color::decode_image(&item.path).and_then(|image| {
                write_image_pdf(&color::apply_tone(&image, config.tone), &dest)
            });
            match converted {
                Ok(()) => (
                    ConversionResult::ok(
                        &item.path,
                        &dest,
                        format!("Image converted to {} and wrapped as PDF", config.tone),
                    ),
                    Some(dest),
                ),
                Err(e) => {
                    let result = ConversionResult::failed(&item.path, e.to_string());
                    let fallback = item.pdf_path(staging, None);
                    let wrapped = color::decode_image(&item.path)
                        .and_then(|image| write_image_pdf(&image, &fallback));
                    match wrapped {
                        Ok(()) => {
                            warn!("Merging original of {} instead", item.file_name());
                            (result, Some(fallback))
                        }
                        Err(_) => (result, None),
                    }
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Remove a source file. Failures are logged, never fatal.
fn delete_original(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted original {}", path.display());
            true
        }
        Err(e) => {
            warn!("Could not delete {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuffixStyle;
    use image::{Rgb, RgbImage};

    fn config_for(dir: &Path) -> ConversionConfig {
        ConversionConfig::builder().output_dir(dir).build().unwrap()
    }

    fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(6, 4, Rgb(rgb)).save(&path).unwrap();
        path
    }

    #[test]
    fn convert_image_writes_gray_png() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), "c.png", [200, 100, 50]);
        let dest = dir.path().join("c_bw.png");
        convert_image(&src, &dest, Tone::Grayscale).unwrap();

        let out = image::open(&dest).unwrap();
        assert_eq!(out.color(), image::ColorType::L8);
        let expected = color::grayscale_pixel(Rgb([200, 100, 50]));
        assert_eq!(out.to_luma8().get_pixel(0, 0).0[0], expected);
    }

    #[test]
    fn convert_image_to_gif_accepts_gray() {
        let dir = tempfile::tempdir().unwrap();
        let src = write_png(dir.path(), "g.png", [10, 20, 30]);
        let dest = dir.path().join("g_bw.gif");
        convert_image(&src, &dest, Tone::Grayscale).unwrap();
        assert!(image::open(&dest).is_ok());
    }

    #[test]
    fn convert_file_names_output_by_tone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let src = write_png(dir.path(), "Photo.PNG", [1, 2, 3]);
        let config = ConversionConfig::builder()
            .output_dir(&out)
            .tone(Tone::Sepia)
            .suffix_style(SuffixStyle::Title)
            .build()
            .unwrap();

        let result = convert_file(&src, &config, &BackendRegistry::structural_only());
        assert!(result.success, "{}", result.message);
        assert_eq!(result.output, Some(out.join("Photo_Sepia.png")));
        assert!(out.join("Photo_Sepia.png").exists());
    }

    #[test]
    fn convert_file_reports_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("notes.txt");
        std::fs::write(&src, "x").unwrap();
        let result = convert_file(&src, &config_for(dir.path()), &BackendRegistry::structural_only());
        assert!(!result.success);
        assert!(result.message.contains("Unsupported"));
    }

    #[test]
    fn batch_validation_runs_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let registry = BackendRegistry::structural_only();
        let mut progress = ProgressReporter::disabled();

        let err = convert_batch(&[], &config_for(dir.path()), &registry, &mut progress).unwrap_err();
        assert!(matches!(err, ToneError::Validation(_)));

        let src = write_png(dir.path(), "a.png", [0, 0, 0]);
        let err = convert_batch(&[src], &ConversionConfig::default(), &registry, &mut progress)
            .unwrap_err();
        assert!(matches!(err, ToneError::Validation(_)));
    }

    #[test]
    fn merge_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        let one = vec![PathBuf::from("a.pdf")];
        assert!(matches!(
            validate_merge(&one, &config),
            Err(ToneError::Validation(_))
        ));
        let mixed = vec![PathBuf::from("a.pdf"), PathBuf::from("b.png")];
        assert!(matches!(
            validate_merge(&mixed, &config),
            Err(ToneError::Validation(_))
        ));
        let two = vec![PathBuf::from("a.pdf"), PathBuf::from("b.PDF")];
        assert!(validate_merge(&two, &config).is_ok());
        assert!(validate_merge(&two, &ConversionConfig::default()).is_err());
    }

    #[test]
    fn delete_originals_after_success_only() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let good = write_png(dir.path(), "good.png", [9, 9, 9]);
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();

        let config = ConversionConfig::builder()
            .output_dir(&out)
            .delete_originals(true)
            .build()
            .unwrap();
        let report = convert_batch(
            &[good.clone(), bad.clone()],
            &config,
            &BackendRegistry::structural_only(),
            &mut ProgressReporter::disabled(),
        )
        .unwrap();

        assert_eq!(report.successful, 1);
        assert_eq!(report.deleted_originals, 1);
        assert!(!good.exists());
        assert!(bad.exists());
    }

    #[test]
    fn remerge_into_existing_output_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([5, 5, 5])));
        let previous = dir.path().join(DEFAULT_MERGE_NAME);
        let extra = dir.path().join("appendix.pdf");
        write_image_pdf(&page, &previous).unwrap();
        write_image_pdf(&page, &extra).unwrap();

        let config = ConversionConfig::builder()
            .output_dir(dir.path())
            .delete_originals(true)
            .build()
            .unwrap();
        let report = merge_batch(
            &[previous.clone(), extra.clone()],
            &MergeOrder::Selection,
            &config,
            &mut ProgressReporter::disabled(),
        )
        .unwrap();

        assert_eq!(report.merged_output.as_deref(), Some(previous.as_path()));
        assert_eq!(report.deleted_originals, 1);
        assert!(!extra.exists());
        assert_eq!(structure::page_count(&previous).unwrap(), 2);
    }

    #[test]
    fn combined_merges_images_and_falls_back_to_originals() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let a = write_png(dir.path(), "a.png", [255, 0, 0]);
        let broken = dir.path().join("broken.png");
        std::fs::write(&broken, b"not an image").unwrap();
        let b = write_png(dir.path(), "b.png", [0, 0, 255]);

        let config = ConversionConfig::builder()
            .output_dir(&out)
            .keep_intermediates(true)
            .build()
            .unwrap();
        let report = convert_and_merge(
            &[a, broken, b],
            &config,
            &BackendRegistry::structural_only(),
            &mut ProgressReporter::disabled(),
        )
        .unwrap();

        assert_eq!(report.successful, 2);
        assert_eq!(report.failed_files.len(), 1);
        assert!(report.failed_files[0].starts_with("broken.png:"));

        let merged = report.merged_output.clone().unwrap();
        assert_eq!(merged, out.join(DEFAULT_COMBINED_NAME));
        assert_eq!(structure::page_count(&merged).unwrap(), 2);

        let kept = report.intermediates_dir.clone().unwrap();
        assert!(kept.exists());
        std::fs::remove_dir_all(kept).unwrap();
    }
}
