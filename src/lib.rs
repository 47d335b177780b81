//! # Simple Frame
//!
//! Composite photos into a decorative frame with a camera-metadata
//! watermark, then batch-export the results with their EXIF intact.
//!
//! # Architecture: Render Function + Scheduler
//!
//! The core is a pure function from *(image, metadata, configuration)* to a
//! composited bitmap, and a batch scheduler that drives that function over
//! many files:
//!
//! ```text
//! preview   image ──▶ PreviewSession ──▶ Compositor ──▶ bitmap at container size
//!                     (cached layout,
//!                      cached blur)
//!
//! export    paths ──▶ start_export ──▶ worker pool ──▶ Compositor ──▶ disk
//!                     (dispatcher,        (W threads,      (native size,
//!                      cancel flag)        one task each)   fresh every time)
//! ```
//!
//! Rendering paints four layers bottom-up: frame shadow, frame background
//! (solid or blur-extended), photo, watermark. Geometry is computed once per
//! render by [`imaging::resolve_layout`] and everything else is placed
//! relative to the resulting rectangles.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | `Size`, `Rect`, `Color` shared by every layer |
//! | [`config`] | `simple-frame.toml` loading, validation, normalization, stock config |
//! | [`imaging`] | Geometry, canvas helpers, background and photo layers, I/O backend |
//! | [`metadata`] | Flat EXIF/XMP metadata, watermark text, EXIF write set |
//! | [`watermark`] | Logo and text resolution, sizing, stacking and anchoring |
//! | [`assets`] | Logo and font lookup by key |
//! | [`cache`] | Content identity and the preview blur cache |
//! | [`compose`] | Composition engine: `Compositor` and `PreviewSession` |
//! | [`naming`] | `<stem>_framed.<ext>` destination names |
//! | [`export`] | Bounded-concurrency export job with progress and cancellation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Configuration Snapshots
//!
//! A render or an export takes its `FrameConfig` and `WatermarkConfig` by
//! value or shared reference and normalizes them once. Nothing observes a
//! configuration that changes while a job runs.
//!
//! ## Preview-Tuned Blur
//!
//! The blur radius is chosen while looking at the preview. Exports render
//! at the photo's full resolution and scale the radius by the ratio of the
//! two photo widths, so the background has the same softness in both.
//!
//! ## Fail-Fast Export
//!
//! The first failing image stops the job: it is reported with its path,
//! nothing new is launched, and images already being written finish.

pub mod assets;
pub mod cache;
pub mod compose;
pub mod config;
pub mod export;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod types;
pub mod watermark;
