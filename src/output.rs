//! Result types returned by conversions, merges and batches, plus the
//! atomic file writer every output goes through.

use crate::error::ToneError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of converting one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// The input file.
    pub source: PathBuf,
    /// The file that was written, when the conversion succeeded.
    pub output: Option<PathBuf>,
    pub success: bool,
    /// Human-readable description of what happened (or why it failed).
    pub message: String,
}

impl ConversionResult {
    pub fn ok(source: &Path, output: &Path, message: impl Into<String>) -> Self {
        Self {
            source: source.to_path_buf(),
            output: Some(output.to_path_buf()),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(source: &Path, message: impl Into<String>) -> Self {
        Self {
            source: source.to_path_buf(),
            output: None,
            success: false,
            message: message.into(),
        }
    }

    /// `"<file name>: <message>"`, the form recorded in a batch failure list.
    pub fn failure_description(&self) -> String {
        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string());
        format!("{}: {}", name, self.message)
    }
}

/// Statistics of a finished merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub input_files: usize,
    pub total_pages: usize,
}

/// What a caller should present once a batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchOutcome {
    /// Every file succeeded.
    Success,
    /// Some files failed; show as success with warnings.
    PartialSuccess,
    /// Nothing succeeded; show as an error.
    Failed,
}

/// Completion report of one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub successful: usize,
    pub total: usize,
    /// One `"<file name>: <cause>"` entry per failed file.
    pub failed_files: Vec<String>,
    /// Files written by the batch, in processing order.
    pub outputs: Vec<PathBuf>,
    /// The merged PDF, for merge jobs.
    pub merged_output: Option<PathBuf>,
    /// Temporary directory retained because intermediates were kept.
    pub intermediates_dir: Option<PathBuf>,
    /// Source files removed after a successful conversion.
    pub deleted_originals: usize,
}

impl BatchReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Report for a batch that died unexpectedly.
    pub fn aborted(total: usize, cause: impl Into<String>) -> Self {
        Self {
            total,
            failed_files: vec![format!("batch aborted: {}", cause.into())],
            ..Self::default()
        }
    }

    /// Fold one per-file result into the report.
    pub fn record(&mut self, result: &ConversionResult) {
        if result.success {
            self.successful += 1;
            if let Some(ref out) = result.output {
                self.outputs.push(out.clone());
            }
        } else {
            self.failed_files.push(result.failure_description());
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.successful == 0 {
            BatchOutcome::Failed
        } else if self.failed_files.is_empty() {
            BatchOutcome::Success
        } else {
            BatchOutcome::PartialSuccess
        }
    }
}

/// Descriptive information about an input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    /// Size formatted as bytes / KB / MB.
    pub size_str: String,
    /// Lower-cased extension including the dot, e.g. `.png`.
    pub extension: String,
    /// `"PDF"`, `"Image"` or `"Unknown"`.
    pub kind: String,
    /// PDF page count, when readable.
    pub pages: Option<usize>,
    /// Image `(width, height)` in pixels, when decodable.
    pub dimensions: Option<(u32, u32)>,
    /// Image color type, e.g. `Rgba8`.
    pub color_mode: Option<String>,
}

/// Write `bytes` to `path` atomically.
///
/// The data goes to a temp file in the destination directory which is then
/// renamed over `path`. A failure at any point leaves `path` untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ToneError> {
    let write_err = |source: std::io::Error| ToneError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pdftone-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
