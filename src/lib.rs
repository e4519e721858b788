//! Glaze: GPU-accelerated image filter pipeline
//!
//! Applies chains of shader-based filters to an image, either live into a
//! window or headlessly into a still export.

pub mod engine;
pub mod filter;
pub mod gpu;
pub mod preset;
pub mod raster;
