//! # pdfium-locate
//!
//! Find a usable [PDFium](https://pdfium.googlesource.com/pdfium/) shared
//! library for `pdfium-render` without making its absence fatal.
//!
//! PDFium is an *optional* backend for pdftone: when it is present the
//! high-fidelity pipeline runs, when it is missing the caller downgrades to
//! a lower tier. This crate therefore never downloads anything and never
//! panics; it only answers "is there a library I can bind, and where?".
//!
//! ## Search order
//!
//! 1. `PDFIUM_LIB_PATH`: a library file, or a directory containing one.
//! 2. The per-user cache directory (`PDFIUM_CACHE_DIR` overrides it).
//! 3. The directory holding the running executable.
//! 4. The current working directory.
//! 5. The system library search path (`LD_LIBRARY_PATH`, `DYLD_LIBRARY_PATH`, `PATH`).
//!
//! The first candidate that actually loads wins.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pdfium_locate::locate_pdfium;
//!
//! match locate_pdfium() {
//!     Some(lib) => {
//!         let pdfium = lib.bind().expect("located library should bind");
//!         let _doc = pdfium.create_new_pdf();
//!     }
//!     None => eprintln!("PDFium not installed; using a fallback renderer"),
//! }
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable pointing at a pdfium library file or its directory.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_LIB_PATH";

/// Environment variable overriding the cache directory searched for pdfium.
pub const PDFIUM_CACHE_ENV: &str = "PDFIUM_CACHE_DIR";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned when binding a located library.
#[derive(Error, Debug)]
pub enum PdfiumLocateError {
    /// `libloading` / `pdfium-render` could not load the library file.
    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// No pdfium library is reachable through the system search path.
    #[error("Failed to bind system PDFium library: {0}")]
    BindSystem(String),
}

// ── Located library ──────────────────────────────────────────────────────────

/// Where a loadable pdfium library was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfiumLibrary {
    /// An explicit library file.
    Path(PathBuf),
    /// Whatever the platform loader resolves by name.
    System,
}

impl PdfiumLibrary {
    /// Bind to this library and initialise PDFium.
    pub fn bind(&self) -> Result<Pdfium, PdfiumLocateError> {
        match self {
            PdfiumLibrary::Path(path) => Pdfium::bind_to_library(path)
                .map(Pdfium::new)
                .map_err(|e| PdfiumLocateError::Bind {
                    path: path.clone(),
                    reason: e.to_string(),
                }),
            PdfiumLibrary::System => Pdfium::bind_to_system_library()
                .map(Pdfium::new)
                .map_err(|e| PdfiumLocateError::BindSystem(e.to_string())),
        }
    }

    /// Check the library loads, without initialising PDFium.
    pub fn is_loadable(&self) -> bool {
        match self {
            PdfiumLibrary::Path(path) => Pdfium::bind_to_library(path).is_ok(),
            PdfiumLibrary::System => Pdfium::bind_to_system_library().is_ok(),
        }
    }
}

impl fmt::Display for PdfiumLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdfiumLibrary::Path(p) => write!(f, "{}", p.display()),
            PdfiumLibrary::System => write!(f, "system library path"),
        }
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the directory where a pdfium library may be cached.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/pdftone/pdfium/`
/// - **Linux**: `~/.cache/pdftone/pdfium/`
/// - **Windows**: `%LOCALAPPDATA%\pdftone\pdfium\`
///
/// Override by setting `PDFIUM_CACHE_DIR`.
pub fn pdfium_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var(PDFIUM_CACHE_ENV) {
        return PathBuf::from(override_dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("pdftone").join("pdfium")
}

// ── Candidate search ─────────────────────────────────────────────────────────

/// Platform library path inside `dir`, e.g. `dir/libpdfium.so`.
pub fn library_path_in(dir: &Path) -> PathBuf {
    Pdfium::pdfium_platform_library_name_at_path(dir)
}

/// All file locations searched, in priority order. Paths may not exist.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(env_path) = std::env::var(PDFIUM_LIB_ENV) {
        let p = PathBuf::from(env_path);
        if p.is_dir() {
            candidates.push(library_path_in(&p));
        } else {
            candidates.push(p);
        }
    }

    candidates.push(library_path_in(&pdfium_cache_dir()));

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(library_path_in(&exe_dir));
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(library_path_in(&cwd));
    }

    candidates.dedup();
    candidates
}

/// First candidate file that exists on disk, loadable or not.
pub fn find_library_file() -> Option<PathBuf> {
    candidate_paths().into_iter().find(|p| p.is_file())
}

/// Locate a pdfium library that actually loads.
///
/// Returns `None` when no candidate file loads and the system loader cannot
/// resolve pdfium either. Missing pdfium is an expected condition.
pub fn locate_pdfium() -> Option<PdfiumLibrary> {
    for path in candidate_paths() {
        if !path.is_file() {
            continue;
        }
        let lib = PdfiumLibrary::Path(path);
        if lib.is_loadable() {
            return Some(lib);
        }
        eprintln!("pdfium-locate: '{lib}' exists but could not be loaded; continuing search");
    }

    let system = PdfiumLibrary::System;
    system.is_loadable().then_some(system)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
