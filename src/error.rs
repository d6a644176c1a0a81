//! Error type for the pdftone library.
//!
//! A single [`ToneError`] covers every failure, but the variants fall into
//! groups that callers treat differently:
//!
//! * **Per-file** errors (decode, rasterise, compose, write) are caught
//!   inside a batch and recorded in the batch's failure list. The batch keeps
//!   going with the next file.
//!
//! * **Validation** errors (empty batch, missing output directory, too few
//!   PDFs to merge) and [`ToneError::Busy`] abort a batch before any work
//!   starts and are returned straight to the caller.
//!
//! * [`ToneError::BackendUnavailable`] only matters while probing backends
//!   and picking a pipeline tier; it never reaches the end user from a
//!   conversion.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the pdftone library.
#[derive(Debug, Error)]
pub enum ToneError {
    // ── Input / decode errors ─────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// File extension is neither a supported image format nor `.pdf`.
    #[error("Unsupported file type: '{path}'\nSupported: .pdf, .jpg, .jpeg, .png, .bmp, .tiff, .tif, .gif")]
    UnsupportedFile { path: PathBuf },

    /// The image could not be decoded.
    #[error("Cannot decode image '{path}': {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt or unreadable: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// A required rendering backend is missing.
    #[error("Backend '{backend}' is unavailable: {hint}")]
    BackendUnavailable { backend: String, hint: String },

    /// The rasteriser failed for a page (or the whole document).
    #[error("Rasterisation failed for page {page}: {detail}")]
    Rasterisation { page: usize, detail: String },

    /// Building the output document failed.
    #[error("Composing output PDF failed: {0}")]
    Composition(String),

    // ── Merge errors ──────────────────────────────────────────────────────
    /// An input of a merge could not be opened or parsed.
    #[error("Cannot merge '{path}': {detail}")]
    Merge { path: PathBuf, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding the transformed image failed.
    #[error("Failed to encode image '{path}': {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    // ── Validation errors ─────────────────────────────────────────────────
    /// A batch precondition was violated.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another batch is already running on this runner.
    #[error("A batch is already in progress; wait for it to finish")]
    Busy,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToneError {
    /// True for errors that abort a whole batch before it starts.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ToneError::Validation(_) | ToneError::InvalidConfig(_) | ToneError::Busy
        )
    }
}
