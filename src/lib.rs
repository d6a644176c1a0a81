//! # pdftone
//!
//! Convert images and PDF documents to grayscale or sepia, and merge PDFs.
//!
//! ## Why this crate?
//!
//! Recoloring a PDF properly means rasterising every page, transforming the
//! pixels and authoring a new document around them. The best tool for that
//! (pdfium) is a native library that may not be installed; the next best
//! (poppler's `pdftoppm`) is an external program that may not be on `PATH`
//! either. This crate probes what is available once, picks the highest
//! quality pipeline tier, and degrades to a plain structural copy, reported
//! as such, rather than failing outright.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Classify  image or PDF, by extension
//!  ├─ 2. Probe     pdfium? pdftoppm? → PipelineTier (once per batch)
//!  ├─ 3. Recolor   pixels through color::to_grayscale / to_sepia
//!  ├─ 4. Write     atomic write, never a partial file
//!  └─ 5. Merge     optional lopdf concatenation of the results
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdftone::{BackendRegistry, BatchJob, BatchRunner, ConversionConfig, Tone};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .tone(Tone::Sepia)
//!         .output_dir("out")
//!         .build()?;
//!     let registry = Arc::new(BackendRegistry::probe(&config)?);
//!     let runner = BatchRunner::new(registry);
//!
//!     let job = BatchJob::Convert { files: vec!["scan.pdf".into(), "photo.jpg".into()] };
//!     let report = runner
//!         .submit(job, config)?
//!         .wait_with(|ev| eprintln!("{:>3.0}% {}", ev.percent, ev.message))
//!         .await;
//!     println!("{}/{} converted", report.successful, report.total);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftone` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## Pipeline Tiers
//!
//! | Tier | Backend | Page size | Color |
//! |------|---------|-----------|-------|
//! | High fidelity | pdfium | source page | converted |
//! | Rasterize | `pdftoppm` + lopdf | fixed format | converted |
//! | Structural copy | lopdf | source page | unchanged |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendKind, BackendRegistry, BackendStatus, Capabilities, PipelineTier};
pub use batch::{BatchHandle, BatchJob, BatchRunner, RunnerState};
pub use config::{
    ConversionConfig, ConversionConfigBuilder, MergeOrder, PageFormat, SuffixStyle, Tone,
};
pub use convert::{convert_and_merge, convert_batch, convert_file, convert_image, merge_batch};
pub use error::ToneError;
pub use output::{BatchOutcome, BatchReport, ConversionResult, FileInfo, MergeSummary};
pub use pipeline::color::{apply_tone, grayscale_pixel, sepia_pixel, to_grayscale, to_sepia};
pub use pipeline::recolor::recolor_pdf;
pub use pipeline::structure::merge_pdfs;
pub use progress::{ProgressEvent, ProgressReporter};
pub use source::{inspect, SourceItem, SourceKind};
