//! Frame background: solid color or blur-extended photo.

use super::calculations::{LayoutResult, corner_radius, cover_crop};
use super::canvas;
use crate::config::{FrameConfig, FrameStyle};
use crate::types::{Color, Size};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tiny_skia::Pixmap;
use tracing::warn;

/// Cover-crop `source` to exactly `target` and Gaussian-blur it.
///
/// `sigma` is the blur standard deviation in pixels at `target` resolution.
/// Returns `None` when there is nothing to blur.
pub fn blur_extend(source: &RgbaImage, target: Size, sigma: f32) -> Option<RgbaImage> {
    let src = Size::new(source.width(), source.height());
    if src.is_empty() || target.is_empty() {
        return None;
    }
    let (resized, crop) = cover_crop(src, target);
    // Triangle is plenty: the result is about to be blurred anyway
    let scaled = if resized == src {
        source.clone()
    } else {
        imageops::resize(source, resized.width, resized.height, FilterType::Triangle)
    };
    let cropped = imageops::crop_imm(&scaled, crop.x, crop.y, crop.width, crop.height).to_image();
    if sigma <= 0.0 {
        return Some(cropped);
    }
    // True Gaussian: its strength scales linearly with sigma across resolutions
    Some(imageops::blur(&cropped, sigma))
}

/// Paint the frame rectangle, clipped to its rounded corners.
///
/// For [`FrameStyle::BlurExtend`] the caller supplies the blurred image (see
/// [`blur_extend`]); `None` means it could not be produced and a neutral
/// fill is used instead.
pub fn paint_background(
    pixmap: &mut Pixmap,
    layout: &LayoutResult,
    frame: &FrameConfig,
    blurred: Option<&RgbaImage>,
) {
    let radius = corner_radius(frame.frame_radius, layout.frame.size());
    match frame.style {
        FrameStyle::SolidColor => {
            canvas::fill_rounded(pixmap, layout.frame, radius, frame.color);
        }
        FrameStyle::BlurExtend => {
            let drawn = blurred.is_some_and(|img| draw_blurred(pixmap, layout, radius, img));
            if !drawn {
                warn!("blur-extended background unavailable, using neutral fill");
                canvas::fill_rounded(pixmap, layout.frame, radius, Color::NEUTRAL);
            }
        }
    }
}

fn draw_blurred(pixmap: &mut Pixmap, layout: &LayoutResult, radius: f32, img: &RgbaImage) -> bool {
    if img.width() != layout.frame.width || img.height() != layout.frame.height {
        return false;
    }
    let Some(src) = canvas::pixmap_from_rgba(img) else {
        return false;
    };
    let Some(mask) = canvas::rounded_mask(layout.canvas, layout.frame, radius) else {
        return false;
    };
    canvas::draw_at(
        pixmap,
        &src,
        layout.frame.x as i32,
        layout.frame.y as i32,
        Some(&mask),
    );
    true
}
