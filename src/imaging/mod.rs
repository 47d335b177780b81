//! Pixel work for the composition engine.
//!
//! | Layer | Crate / function |
//! |---|---|
//! | **Geometry** | pure math in `calculations` |
//! | **Rounded clips, shadows** | `tiny-skia` paths and masks |
//! | **Blur-extend background** | cover crop + `image::imageops::blur` (true Gaussian) |
//! | **Photo scaling** | `image::imageops::resize` (Lanczos3) |
//! | **Decode / encode** | [`ImageBackend`] trait + [`RustBackend`] |
//!
//! The module is split into:
//! - **Calculations**: pure functions for layout math (unit testable)
//! - **Canvas**: tiny-skia helpers shared by the renderers
//! - **Background / Photo**: the two bitmap layers under the watermark
//! - **Backend**: file I/O, kept behind a trait so the export pipeline can be
//!   tested without touching the disk

pub mod backend;
pub mod background;
mod calculations;
pub mod canvas;
pub mod photo;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{
    BASE_PADDING_FRACTION, Fit, LayoutResult, corner_radius, cover_crop, cover_dimensions,
    resolve_layout, scaled_blur_radius,
};
pub use rust_backend::{RustBackend, output_format_for, supported_input_extensions};
