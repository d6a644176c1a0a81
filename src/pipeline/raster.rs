//! PDF rasterisation backends.
//!
//! Two interchangeable rasterisers feed the color engine:
//!
//! * **pdfium** (via `pdfium-render`) renders in-process at a magnification
//!   factor and can produce grayscale output natively.
//! * **`pdftoppm`** (poppler-utils) runs as a child process at a fixed DPI and
//!   writes one PNG per page into a private temporary directory.
//!
//! ## Why not spawn_blocking?
//!
//! Everything here is blocking and CPU-bound. It is only ever called from
//! the batch worker thread, which is a plain OS thread rather than a runtime
//! worker, so there is nothing to offload to.

use crate::error::ToneError;
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

// ── pdfium ───────────────────────────────────────────────────────────────

/// Open `path` with pdfium, mapping load failures to [`ToneError::CorruptPdf`].
pub fn load_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ToneError> {
    if !path.exists() {
        return Err(ToneError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ToneError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("{:?}", e),
        })
}

/// Render one page at `scale`, grayscale when `grayscale` is set.
///
/// `page_number` is 1-based and only used in errors.
pub fn render_page(
    page: &PdfPage,
    page_number: usize,
    scale: f32,
    grayscale: bool,
) -> Result<DynamicImage, ToneError> {
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .use_grayscale_rendering(grayscale);

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ToneError::Rasterisation {
            page: page_number,
            detail: format!("{:?}", e),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_number,
        image.width(),
        image.height()
    );
    Ok(image)
}

// ── pdftoppm ─────────────────────────────────────────────────────────────

/// `pdftoppm` names its output `<prefix>-<n>.png`, zero-padding `n` to the
/// width of the page count.
static PAGE_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page-(\d+)\.png$").unwrap());

/// Handle to a `pdftoppm` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdftoppm {
    program: PathBuf,
}

impl Pdftoppm {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Find a working `pdftoppm`: the explicit path when given, else `PATH`.
    pub fn probe(explicit: Option<&Path>) -> Option<Self> {
        let candidate = Self::new(explicit.unwrap_or(Path::new("pdftoppm")));
        candidate.is_runnable().then_some(candidate)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// True when the program can be spawned. `pdftoppm -v` prints its
    /// version and exits non-zero on some poppler releases, so only the
    /// spawn itself counts.
    pub fn is_runnable(&self) -> bool {
        Command::new(&self.program).arg("-v").output().is_ok()
    }

    /// Rasterise every page of `pdf` at `dpi`, in page order.
    pub fn rasterize(&self, pdf: &Path, dpi: u32) -> Result<Vec<DynamicImage>, ToneError> {
        if !pdf.exists() {
            return Err(ToneError::FileNotFound {
                path: pdf.to_path_buf(),
            });
        }

        let workdir = tempfile::Builder::new()
            .prefix("pdftone_raster_")
            .tempdir()
            .map_err(|e| ToneError::Internal(format!("cannot create temp dir: {e}")))?;
        let prefix = workdir.path().join("page");

        let output = Command::new(&self.program)
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-png")
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(|e| ToneError::BackendUnavailable {
                backend: "pdftoppm".into(),
                hint: format!("failed to execute {}: {e}", self.program.display()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToneError::Rasterisation {
                page: 0,
                detail: format!(
                    "pdftoppm failed (exit code {}): {}",
                    output
                        .status
                        .code()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    stderr.trim()
                ),
            });
        }

        let pages = collect_page_files(workdir.path())?;
        info!("pdftoppm produced {} pages at {} DPI", pages.len(), dpi);

        pages
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                image::open(&path).map_err(|e| ToneError::Rasterisation {
                    page: i + 1,
                    detail: format!("cannot read {}: {e}", path.display()),
                })
            })
            .collect()
    }
}

/// Page PNGs in `dir`, sorted by page number.
fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, ToneError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ToneError::Internal(format!("cannot list {}: {e}", dir.display())))?;

    let mut numbered: Vec<(u32, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let caps = PAGE_FILE_RE.captures(name.to_str()?)?;
            let n = caps[1].parse().ok()?;
            Some((n, entry.path()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);
    Ok(numbered.into_iter().map(|(_, p)| p).collect())
}
