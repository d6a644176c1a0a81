//! Backend capability registry and pipeline tier selection.
//!
//! Which rasteriser a PDF goes through depends on what is installed. That is
//! decided once, by [`BackendRegistry::probe`], and the resulting registry is
//! passed into every conversion. Nothing below the registry looks for
//! libraries or executables on its own.
//!
//! | Backend   | Kind                  | Required | Rank |
//! |-----------|-----------------------|----------|------|
//! | pdfium    | rasteriser + author   | no       | 3    |
//! | pdftoppm  | rasteriser            | no       | 2    |
//! | lopdf     | composer, copy, merge | yes      | 1    |
//! | image     | codec                 | yes      | 0    |
//!
//! Required backends are compiled in; probing still exercises them once so a
//! broken build fails loudly at startup instead of on the first file.

use crate::config::ConversionConfig;
use crate::error::ToneError;
use crate::pipeline::compose;
use crate::pipeline::raster::Pdftoppm;
use image::{DynamicImage, GrayImage};
use pdfium_locate::PdfiumLibrary;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

// ── Backends ─────────────────────────────────────────────────────────────

/// One rendering, composing or codec backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Pdfium,
    Pdftoppm,
    Lopdf,
    Image,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Pdfium,
        BackendKind::Pdftoppm,
        BackendKind::Lopdf,
        BackendKind::Image,
    ];

    /// Relative output fidelity; higher is better.
    pub fn quality_rank(self) -> u8 {
        match self {
            BackendKind::Pdfium => 3,
            BackendKind::Pdftoppm => 2,
            BackendKind::Lopdf => 1,
            BackendKind::Image => 0,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, BackendKind::Lopdf | BackendKind::Image)
    }

    pub fn description(self) -> &'static str {
        match self {
            BackendKind::Pdfium => "High-fidelity PDF rendering and authoring",
            BackendKind::Pdftoppm => "PDF rasterisation via poppler",
            BackendKind::Lopdf => "PDF page composition, structural copy and merge",
            BackendKind::Image => "Image decoding and encoding",
        }
    }

    /// Advice shown when the backend is missing.
    pub fn install_hint(self) -> &'static str {
        match self {
            BackendKind::Pdfium => {
                "install a pdfium shared library and set PDFIUM_LIB_PATH to it"
            }
            BackendKind::Pdftoppm => {
                "install poppler-utils (apt install poppler-utils / brew install poppler)"
            }
            BackendKind::Lopdf | BackendKind::Image => "rebuild pdftone; this backend is built in",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Pdfium => "pdfium",
            BackendKind::Pdftoppm => "pdftoppm",
            BackendKind::Lopdf => "lopdf",
            BackendKind::Image => "image",
        };
        f.write_str(name)
    }
}

// ── Tier selection ───────────────────────────────────────────────────────

/// Plain availability flags that tier selection depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// pdfium can render and author PDFs.
    pub high_fidelity: bool,
    /// An external rasteriser (`pdftoppm`) is runnable.
    pub raster: bool,
    /// The page composer works.
    pub composer: bool,
}

/// Algorithm used to recolor a PDF, in decreasing order of fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineTier {
    /// Render with pdfium, recolor, re-author at the source page geometry.
    HighFidelity,
    /// Rasterise with `pdftoppm`, recolor, compose onto fixed-format pages.
    Rasterize,
    /// Copy pages unchanged; no color conversion.
    StructuralCopy,
}

impl PipelineTier {
    /// Pick the best tier the capabilities allow.
    pub fn select(caps: &Capabilities) -> Self {
        if caps.high_fidelity {
            PipelineTier::HighFidelity
        } else if caps.raster && caps.composer {
            PipelineTier::Rasterize
        } else {
            PipelineTier::StructuralCopy
        }
    }

    pub fn quality_rank(self) -> u8 {
        match self {
            PipelineTier::HighFidelity => 3,
            PipelineTier::Rasterize => 2,
            PipelineTier::StructuralCopy => 1,
        }
    }

    /// True when the tier actually changes pixels.
    pub fn converts_color(self) -> bool {
        !matches!(self, PipelineTier::StructuralCopy)
    }
}

impl fmt::Display for PipelineTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineTier::HighFidelity => write!(f, "high fidelity (pdfium)"),
            PipelineTier::Rasterize => write!(f, "rasterize (pdftoppm + lopdf)"),
            PipelineTier::StructuralCopy => write!(f, "structural copy (no color conversion)"),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Backends available to the pipeline. Read-only once built.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    pdfium: Option<PdfiumLibrary>,
    pdftoppm: Option<Pdftoppm>,
    composer: bool,
}

/// Availability of one backend, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub backend: BackendKind,
    pub available: bool,
    pub required: bool,
    pub quality_rank: u8,
    pub description: String,
    /// Where the backend was found, when it was.
    pub location: Option<String>,
    /// Install advice, when it is missing.
    pub hint: Option<String>,
}

impl BackendRegistry {
    /// Detect installed backends.
    ///
    /// Missing optional backends only lower the tier. A failing required
    /// backend is an error.
    pub fn probe(config: &ConversionConfig) -> Result<Self, ToneError> {
        check_codec().map_err(|e| ToneError::BackendUnavailable {
            backend: BackendKind::Image.to_string(),
            hint: e,
        })?;
        check_composer().map_err(|e| ToneError::BackendUnavailable {
            backend: BackendKind::Lopdf.to_string(),
            hint: e,
        })?;

        let pdfium = pdfium_locate::locate_pdfium();
        let pdftoppm = Pdftoppm::probe(config.pdftoppm_path.as_deref());

        let registry = Self {
            pdfium,
            pdftoppm,
            composer: true,
        };
        for status in registry.report() {
            if status.available {
                info!("Backend {} available", status.backend);
            } else {
                warn!(
                    "Optional backend {} missing: {}",
                    status.backend,
                    status.hint.as_deref().unwrap_or_default()
                );
            }
        }
        info!("PDF pipeline tier: {}", registry.tier());
        Ok(registry)
    }

    /// Registry with explicit backends, skipping detection.
    pub fn new(pdfium: Option<PdfiumLibrary>, pdftoppm: Option<Pdftoppm>) -> Self {
        Self {
            pdfium,
            pdftoppm,
            composer: true,
        }
    }

    /// Registry with no optional backend; PDFs are copied structurally.
    pub fn structural_only() -> Self {
        Self::new(None, None)
    }

    pub fn pdfium(&self) -> Option<&PdfiumLibrary> {
        self.pdfium.as_ref()
    }

    pub fn pdftoppm(&self) -> Option<&Pdftoppm> {
        self.pdftoppm.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            high_fidelity: self.pdfium.is_some(),
            raster: self.pdftoppm.is_some(),
            composer: self.composer,
        }
    }

    pub fn tier(&self) -> PipelineTier {
        PipelineTier::select(&self.capabilities())
    }

    /// Per-backend availability, best quality first.
    pub fn report(&self) -> Vec<BackendStatus> {
        BackendKind::ALL
            .iter()
            .map(|&kind| {
                let location = match kind {
                    BackendKind::Pdfium => self.pdfium.as_ref().map(ToString::to_string),
                    BackendKind::Pdftoppm => self
                        .pdftoppm
                        .as_ref()
                        .map(|p| p.program().display().to_string()),
                    BackendKind::Lopdf | BackendKind::Image => Some("built in".to_string()),
                };
                let available = match kind {
                    BackendKind::Lopdf => self.composer,
                    _ => location.is_some(),
                };
                BackendStatus {
                    backend: kind,
                    available,
                    required: kind.is_required(),
                    quality_rank: kind.quality_rank(),
                    description: kind.description().to_string(),
                    location: if available { location } else { None },
                    hint: (!available).then(|| kind.install_hint().to_string()),
                }
            })
            .collect()
    }

    /// Missing optional backends.
    pub fn missing_optional(&self) -> Vec<BackendKind> {
        self.report()
            .into_iter()
            .filter(|s| !s.available && !s.required)
            .map(|s| s.backend)
            .collect()
    }
}

/// Round-trip a tiny image through the PNG codec.
fn check_codec() -> Result<(), String> {
    let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    image::load_from_memory(buf.get_ref())
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Compose a one-page PDF and parse it back.
fn check_composer() -> Result<(), String> {
    let img = DynamicImage::ImageLuma8(GrayImage::new(1, 1));
    let bytes = compose::image_to_pdf(&img, compose::IMAGE_PAGE_DPI).map_err(|e| e.to_string())?;
    lopdf::Document::load_mem(&bytes)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
