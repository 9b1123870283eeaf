//! # LedgerLens Render
//!
//! Turns an assembled [`Document`](ledgerlens_core::Document) into files:
//! a paginated PDF, an XLSX workbook, and chart PNGs, all written through a
//! sandboxed output directory.

pub mod chart;
pub mod output;
pub mod pdf;
pub mod renderer;
pub mod workbook;

pub use chart::{ImageFormat, RasterImage, RenderedChart, rasterize, render_chart_png, validate_image};
pub use output::{ArtifactKind, CleanupReport, OutputDir, artifact_file_name, cleanup_older_than};
pub use renderer::{RenderOptions, RenderedArtifact, Renderer};
