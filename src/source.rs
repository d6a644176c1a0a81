//! Input classification, output naming and file inspection.

use crate::config::{SuffixStyle, Tone};
use crate::error::ToneError;
use crate::output::FileInfo;
use crate::pipeline::structure;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions (lower-case, without the dot) decoded as images.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tiff", "tif", "gif"];

/// What a source file is, judged by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Image,
    Pdf,
}

impl SourceKind {
    /// Classify a lower-case extension without the dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext == "pdf" {
            Some(SourceKind::Pdf)
        } else if IMAGE_EXTENSIONS.contains(&ext) {
            Some(SourceKind::Image)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Image => "Image",
            SourceKind::Pdf => "PDF",
        }
    }
}

/// One input file of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    /// Absolute path of the input.
    pub path: PathBuf,
    pub kind: SourceKind,
}

impl SourceItem {
    /// Classify `path` by its (case-insensitive) extension.
    ///
    /// The file does not have to exist yet; that is checked when it is read.
    pub fn classify(path: impl AsRef<Path>) -> Result<Self, ToneError> {
        let path = path.as_ref();
        let kind = lower_extension(path)
            .as_deref()
            .and_then(SourceKind::from_extension)
            .ok_or_else(|| ToneError::UnsupportedFile {
                path: path.to_path_buf(),
            })?;
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        Ok(Self { path, kind })
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }

    /// `{stem}_{suffix}{ext}` inside `dir`. PDFs keep `.pdf`; images keep
    /// their own extension, lower-cased.
    pub fn output_path(&self, dir: &Path, tone: Tone, style: SuffixStyle) -> PathBuf {
        let ext = match self.kind {
            SourceKind::Pdf => "pdf".to_string(),
            SourceKind::Image => lower_extension(&self.path).unwrap_or_else(|| "png".into()),
        };
        dir.join(format!("{}_{}.{}", self.stem(), tone.suffix(style), ext))
    }

    /// Path of this item once wrapped or converted to a PDF inside `dir`.
    pub fn pdf_path(&self, dir: &Path, tone: Option<(Tone, SuffixStyle)>) -> PathBuf {
        match tone {
            Some((tone, style)) => {
                dir.join(format!("{}_{}.pdf", self.stem(), tone.suffix(style)))
            }
            None => dir.join(format!("{}.pdf", self.stem())),
        }
    }
}

fn lower_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

/// Byte count as `"N bytes"`, `"N.N KB"` or `"N.N MB"`.
pub fn human_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} bytes", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Describe a file: size, kind, PDF page count, image geometry.
///
/// Unreadable content is not an error; the corresponding fields stay `None`.
pub fn inspect(path: &Path) -> Result<FileInfo, ToneError> {
    let meta = std::fs::metadata(path).map_err(|_| ToneError::FileNotFound {
        path: path.to_path_buf(),
    })?;

    let ext = lower_extension(path).unwrap_or_default();
    let kind = SourceKind::from_extension(&ext);
    let mut info = FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_path_buf(),
        size: meta.len(),
        size_str: human_size(meta.len()),
        extension: if ext.is_empty() {
            String::new()
        } else {
            format!(".{ext}")
        },
        kind: kind.map_or("Unknown", SourceKind::label).to_string(),
        pages: None,
        dimensions: None,
        color_mode: None,
    };

    match kind {
        Some(SourceKind::Pdf) => match structure::page_count(path) {
            Ok(n) => info.pages = Some(n),
            Err(e) => debug!("Cannot count pages of {}: {}", path.display(), e),
        },
        Some(SourceKind::Image) => {
            match image::ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
                Ok(reader) => match reader.decode() {
                    Ok(img) => {
                        info.dimensions = Some((img.width(), img.height()));
                        info.color_mode = Some(format!("{:?}", img.color()));
                    }
                    Err(e) => debug!("Cannot decode {}: {}", path.display(), e),
                },
                Err(e) => debug!("Cannot open {}: {}", path.display(), e),
            }
        }
        None => {}
    }

    Ok(info)
}
