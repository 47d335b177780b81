//! Photo layer: the scaled photo clipped to its rounded rectangle, with an
//! optional drop shadow onto the frame.

use super::calculations::{LayoutResult, corner_radius};
use super::canvas::{self, Shadow};
use crate::config::FrameConfig;
use crate::types::Size;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tiny_skia::Pixmap;

/// Resize the source to exactly `size` (Lanczos3). The layout already
/// preserved the aspect ratio, so this never distorts.
pub fn scale_photo(source: &RgbaImage, size: Size) -> RgbaImage {
    if source.dimensions() == (size.width, size.height) {
        return source.clone();
    }
    imageops::resize(source, size.width, size.height, FilterType::Lanczos3)
}

/// Draw `photo` (already scaled to `layout.photo`) onto the canvas.
pub fn paint_photo(pixmap: &mut Pixmap, layout: &LayoutResult, frame: &FrameConfig, photo: &RgbaImage) {
    let rect = layout.photo;
    let radius = corner_radius(frame.photo_radius, rect.size());

    if frame.draws_photo_shadow() {
        canvas::draw_shadow(pixmap, rect, radius, Shadow::for_rect(rect));
    }

    let Some(src) = canvas::pixmap_from_rgba(photo) else {
        return;
    };
    let mask = if radius > 0.0 {
        canvas::rounded_mask(layout.canvas, rect, radius)
    } else {
        None
    };
    canvas::draw_at(pixmap, &src, rect.x as i32, rect.y as i32, mask.as_ref());
}
