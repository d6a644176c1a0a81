//! Pipeline stages for tone conversion.
//!
//! Each submodule does one job, so stages can be tested on their own and a
//! backend can be swapped without touching its neighbours.
//!
//! ## Data Flow
//!
//! ```text
//! image ────────────────────────▶ color ──▶ encode (image crate)
//! PDF ──▶ raster (pdfium | pdftoppm) ──▶ color ──▶ compose / pdfium author
//! PDF ──▶ structure (copy, merge)
//! ```
//!
//! 1. [`color`]: the grayscale and sepia transforms, shared by every path
//! 2. [`raster`]: page rasterisation through pdfium or `pdftoppm`
//! 3. [`compose`]: lopdf documents built from raster pages
//! 4. [`structure`]: page-level copy and merge without touching content
//! 5. [`recolor`]: tier selection and the end-to-end PDF recolor

pub mod color;
pub mod compose;
pub mod raster;
pub mod recolor;
pub mod structure;
