//! Configuration types for tone conversion and PDF merging.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. One struct travels with a batch from
//! the caller into the worker thread, so everything the pipeline needs to
//! know lives here rather than in globals.
//!
//! The rendering knobs default to the pipeline's contract values: pdfium
//! renders at 2.0× magnification and `pdftoppm` rasterises at 200 DPI onto
//! US Letter pages with a 20 pt margin.

use crate::error::ToneError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Configuration for a conversion or merge batch.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdftone::{ConversionConfig, Tone};
///
/// let config = ConversionConfig::builder()
///     .tone(Tone::Sepia)
///     .output_dir("/tmp/out")
///     .build()
///     .unwrap();
/// assert_eq!(config.raster_dpi, 200);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Target color treatment. Default: [`Tone::Grayscale`].
    pub tone: Tone,

    /// Directory receiving every output file. Required by batch jobs.
    pub output_dir: Option<PathBuf>,

    /// Magnification applied when pdfium renders a page. Range: 1.0–4.0. Default: 2.0.
    ///
    /// Only affects raster quality. The output page keeps the source page's
    /// exact width and height whatever the scale.
    pub render_scale: f32,

    /// Resolution used by the `pdftoppm` rasteriser. Range: 72–600. Default: 200.
    pub raster_dpi: u32,

    /// Physical page size of pages composed from `pdftoppm` rasters. Default: Letter.
    pub page_format: PageFormat,

    /// Margin kept around each composed raster, in points. Default: 20.
    pub margin_pt: f32,

    /// Casing of the tone suffix in output names. Default: `_bw` / `_sepia`.
    pub suffix_style: SuffixStyle,

    /// Delete each source file after it was converted (or merged). Default: false.
    pub delete_originals: bool,

    /// Keep the temporary directory of a convert-then-merge run. Default: false.
    pub keep_intermediates: bool,

    /// File name of the merged PDF. `None` uses the job's default name.
    pub merge_output_name: Option<String>,

    /// Explicit `pdftoppm` executable. `None` searches `PATH`.
    pub pdftoppm_path: Option<PathBuf>,

    /// Capacity of the bounded progress channel. Default: 32.
    pub progress_capacity: usize,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            tone: Tone::default(),
            output_dir: None,
            render_scale: 2.0,
            raster_dpi: 200,
            page_format: PageFormat::default(),
            margin_pt: 20.0,
            suffix_style: SuffixStyle::default(),
            delete_originals: false,
            keep_intermediates: false,
            merge_output_name: None,
            pdftoppm_path: None,
            progress_capacity: 32,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The configured output directory, or a validation error.
    pub fn require_output_dir(&self) -> Result<&Path, ToneError> {
        self.output_dir
            .as_deref()
            .ok_or_else(|| ToneError::Validation("no output directory set".into()))
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn tone(mut self, tone: Tone) -> Self {
        self.config.tone = tone;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(1.0, 4.0);
        self
    }

    pub fn raster_dpi(mut self, dpi: u32) -> Self {
        self.config.raster_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn page_format(mut self, format: PageFormat) -> Self {
        self.config.page_format = format;
        self
    }

    pub fn margin_pt(mut self, margin: f32) -> Self {
        self.config.margin_pt = margin.max(0.0);
        self
    }

    pub fn suffix_style(mut self, style: SuffixStyle) -> Self {
        self.config.suffix_style = style;
        self
    }

    pub fn delete_originals(mut self, v: bool) -> Self {
        self.config.delete_originals = v;
        self
    }

    pub fn keep_intermediates(mut self, v: bool) -> Self {
        self.config.keep_intermediates = v;
        self
    }

    pub fn merge_output_name(mut self, name: impl Into<String>) -> Self {
        self.config.merge_output_name = Some(name.into());
        self
    }

    pub fn pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_path = Some(path.into());
        self
    }

    pub fn progress_capacity(mut self, n: usize) -> Self {
        self.config.progress_capacity = n.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ToneError> {
        let c = &self.config;
        if !(1.0..=4.0).contains(&c.render_scale) {
            return Err(ToneError::InvalidConfig(format!(
                "render scale must be 1.0–4.0, got {}",
                c.render_scale
            )));
        }
        let (w, h) = c.page_format.dimensions();
        if w <= 2.0 * c.margin_pt || h <= 2.0 * c.margin_pt {
            return Err(ToneError::InvalidConfig(format!(
                "margin {}pt leaves no room on a {}x{}pt page",
                c.margin_pt, w, h
            )));
        }
        if let Some(ref name) = c.merge_output_name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(ToneError::InvalidConfig(format!(
                    "merge output name must be a plain file name, got '{name}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Target color treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Luminance-preserving single-channel reduction. (default)
    #[default]
    Grayscale,
    /// Warm brown affine transform of RGB.
    Sepia,
}

impl Tone {
    /// Output file-name suffix, without the leading underscore.
    pub fn suffix(self, style: SuffixStyle) -> &'static str {
        match (self, style) {
            (Tone::Grayscale, SuffixStyle::Lower) => "bw",
            (Tone::Grayscale, SuffixStyle::Title) => "BW",
            (Tone::Sepia, SuffixStyle::Lower) => "sepia",
            (Tone::Sepia, SuffixStyle::Title) => "Sepia",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Grayscale => write!(f, "grayscale"),
            Tone::Sepia => write!(f, "sepia"),
        }
    }
}

/// Casing of the tone suffix appended to output file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SuffixStyle {
    /// `_bw`, `_sepia` (default)
    #[default]
    Lower,
    /// `_BW`, `_Sepia`
    Title,
}

/// Physical page size for composed pages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    /// US Letter, 612 × 792 pt. (default)
    #[default]
    Letter,
    /// ISO A4, 595.28 × 841.89 pt.
    A4,
    /// Any size, in points.
    Custom { width_pt: f32, height_pt: f32 },
}

impl PageFormat {
    /// `(width, height)` in points.
    pub fn dimensions(&self) -> (f32, f32) {
        match *self {
            PageFormat::Letter => (612.0, 792.0),
            PageFormat::A4 => (595.28, 841.89),
            PageFormat::Custom {
                width_pt,
                height_pt,
            } => (width_pt, height_pt),
        }
    }
}

/// Order in which PDFs are concatenated by a merge.
///
/// The merge primitive itself never reorders; this policy is applied by the
/// caller before the paths reach it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeOrder {
    /// Keep the order the files were selected in. (default)
    #[default]
    Selection,
    /// Sort by file name, case-insensitively.
    Alphabetical,
    /// Explicit 1-indexed permutation of the selection, e.g. `[3, 1, 2]`.
    Custom(Vec<usize>),
}

impl MergeOrder {
    /// Reorder `paths` according to this policy.
    ///
    /// A custom order must mention every selected file exactly once.
    pub fn apply(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>, ToneError> {
        match self {
            MergeOrder::Selection => Ok(paths.to_vec()),
            MergeOrder::Alphabetical => {
                let mut sorted = paths.to_vec();
                sorted.sort_by_cached_key(|p| {
                    p.file_name()
                        .map(|n| n.to_string_lossy().to_lowercase())
                        .unwrap_or_default()
                });
                Ok(sorted)
            }
            MergeOrder::Custom(order) => {
                if order.len() != paths.len() {
                    return Err(ToneError::Validation(format!(
                        "custom order lists {} files but {} were selected",
                        order.len(),
                        paths.len()
                    )));
                }
                let mut seen = vec![false; paths.len()];
                let mut ordered = Vec::with_capacity(paths.len());
                for &pos in order {
                    if pos < 1 || pos > paths.len() || seen[pos - 1] {
                        return Err(ToneError::Validation(format!(
                            "custom order must be a permutation of 1..={}, got {:?}",
                            paths.len(),
                            order
                        )));
                    }
                    seen[pos - 1] = true;
                    ordered.push(paths[pos - 1].clone());
                }
                Ok(ordered)
            }
        }
    }
}
