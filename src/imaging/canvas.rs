//! tiny-skia plumbing: rounded-rect paths and masks, pixmap ↔ `RgbaImage`
//! conversion, drop shadows and alpha flattening.
//!
//! Pixmaps are premultiplied, `image` buffers are straight alpha. Every
//! crossing between the two goes through [`pixmap_from_rgba`] or
//! [`pixmap_to_rgba`].

use crate::types::{Color, Rect, Size};
use image::{GrayImage, RgbImage, RgbaImage};
use tiny_skia::{
    FillRule, IntSize, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, PremultipliedColorU8,
    Transform,
};

/// Cubic Bézier control distance for a quarter circle of radius 1.
const KAPPA: f32 = 0.552_284_75;

/// Closed rounded-rectangle path. The radius is clamped to half the short side.
pub fn rounded_rect_path(x: f32, y: f32, width: f32, height: f32, radius: f32) -> Option<Path> {
    if !(width > 0.0 && height > 0.0) {
        return None;
    }
    let rect = tiny_skia::Rect::from_xywh(x, y, width, height)?;
    let r = radius.clamp(0.0, width.min(height) / 2.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(rect));
    }

    let k = r * KAPPA;
    let (l, t, rt, b) = (rect.left(), rect.top(), rect.right(), rect.bottom());
    let mut pb = PathBuilder::new();
    pb.move_to(l + r, t);
    pb.line_to(rt - r, t);
    pb.cubic_to(rt - r + k, t, rt, t + r - k, rt, t + r);
    pb.line_to(rt, b - r);
    pb.cubic_to(rt, b - r + k, rt - r + k, b, rt - r, b);
    pb.line_to(l + r, b);
    pb.cubic_to(l + r - k, b, l, b - r + k, l, b - r);
    pb.line_to(l, t + r);
    pb.cubic_to(l, t + r - k, l + r - k, t, l + r, t);
    pb.close();
    pb.finish()
}

fn rect_path(rect: Rect, radius: f32) -> Option<Path> {
    rounded_rect_path(
        rect.x as f32,
        rect.y as f32,
        rect.width as f32,
        rect.height as f32,
        radius,
    )
}

/// Anti-aliased clip mask covering `rect` with rounded corners.
pub fn rounded_mask(canvas: Size, rect: Rect, radius: f32) -> Option<Mask> {
    let mut mask = Mask::new(canvas.width, canvas.height)?;
    let path = rect_path(rect, radius)?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    Some(mask)
}

/// Fill a rounded rectangle with a solid color.
pub fn fill_rounded(pixmap: &mut Pixmap, rect: Rect, radius: f32, color: Color) {
    let Some(path) = rect_path(rect, radius) else {
        return;
    };
    let mut paint = Paint::default();
    paint.set_color(color.to_skia());
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
}

/// Composite `src` onto `dst` with its top-left corner at `(x, y)`.
pub fn draw_at(dst: &mut Pixmap, src: &Pixmap, x: i32, y: i32, mask: Option<&Mask>) {
    dst.draw_pixmap(
        x,
        y,
        src.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        mask,
    );
}

pub fn pixmap_from_rgba(image: &RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.as_raw().clone();
    premultiply_in_place(&mut data);
    Pixmap::from_vec(data, size)
}

pub fn pixmap_to_rgba(pixmap: &Pixmap) -> RgbaImage {
    let width = pixmap.width();
    let pixels = pixmap.pixels();
    RgbaImage::from_fn(width, pixmap.height(), |x, y| {
        let c = pixels[(y * width + x) as usize].demultiply();
        image::Rgba([c.red(), c.green(), c.blue(), c.alpha()])
    })
}

fn premultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * a + 127) / 255) as u8;
        }
    }
}

/// Drop shadow parameters, in pixels of the target canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shadow {
    pub sigma: f32,
    pub offset_y: f32,
    pub opacity: f32,
}

impl Shadow {
    /// Fixed shadow proportional to the casting rectangle, so the preview and
    /// the full-resolution export look alike.
    pub fn for_rect(rect: Rect) -> Self {
        let short = rect.short_side() as f32;
        Self {
            sigma: (short * 0.015).max(1.0),
            offset_y: short * 0.008,
            opacity: 0.35,
        }
    }
}

/// Paint a soft black shadow of a rounded rectangle.
///
/// Only the region the blur can reach is rasterized and blurred; the caller
/// draws the casting shape on top afterwards.
pub fn draw_shadow(pixmap: &mut Pixmap, rect: Rect, radius: f32, shadow: Shadow) {
    let margin = (shadow.sigma * 3.0 + shadow.offset_y).ceil() as i64;
    let x0 = (i64::from(rect.x) - margin).max(0);
    let y0 = (i64::from(rect.y) - margin).max(0);
    let x1 = (i64::from(rect.right()) + margin).min(i64::from(pixmap.width()));
    let y1 = (i64::from(rect.bottom()) + margin).min(i64::from(pixmap.height()));
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let (w, h) = ((x1 - x0) as u32, (y1 - y0) as u32);

    let Some(mut mask) = Mask::new(w, h) else {
        return;
    };
    let Some(path) = rounded_rect_path(
        (i64::from(rect.x) - x0) as f32,
        (i64::from(rect.y) - y0) as f32 + shadow.offset_y,
        rect.width as f32,
        rect.height as f32,
        radius,
    ) else {
        return;
    };
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());

    let Some(coverage) = GrayImage::from_raw(w, h, mask.data().to_vec()) else {
        return;
    };
    let blurred = image::imageops::fast_blur(&coverage, shadow.sigma);

    let Some(mut layer) = Pixmap::new(w, h) else {
        return;
    };
    for (dst, src) in layer.pixels_mut().iter_mut().zip(blurred.pixels()) {
        let alpha = (f32::from(src[0]) * shadow.opacity).round() as u8;
        *dst = PremultipliedColorU8::from_rgba(0, 0, 0, alpha)
            .unwrap_or(PremultipliedColorU8::TRANSPARENT);
    }
    draw_at(pixmap, &layer, x0 as i32, y0 as i32, None);
}

/// Composite onto an opaque background, for encoders without alpha.
pub fn flatten_onto(image: &RgbaImage, background: Color) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y);
        let a = u32::from(p[3]);
        let mix = |fg: u8, bg: u8| ((u32::from(fg) * a + u32::from(bg) * (255 - a) + 127) / 255) as u8;
        image::Rgb([
            mix(p[0], background.r),
            mix(p[1], background.g),
            mix(p[2], background.b),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha_at(pixmap: &Pixmap, x: u32, y: u32) -> u8 {
        pixmap.pixel(x, y).map(|p| p.alpha()).unwrap_or(0)
    }

    // =========================================================================
    // Paths and masks
    // =========================================================================

    #[test]
    fn square_fill_covers_corners() {
        let mut pixmap = Pixmap::new(20, 20).unwrap();
        fill_rounded(&mut pixmap, Rect::new(0, 0, 20, 20), 0.0, Color::BLACK);
        assert_eq!(alpha_at(&pixmap, 0, 0), 255);
        assert_eq!(alpha_at(&pixmap, 19, 19), 255);
    }

    #[test]
    fn rounded_fill_leaves_corners_transparent() {
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        fill_rounded(&mut pixmap, Rect::new(0, 0, 100, 100), 40.0, Color::BLACK);
        assert_eq!(alpha_at(&pixmap, 0, 0), 0);
        assert_eq!(alpha_at(&pixmap, 99, 99), 0);
        assert_eq!(alpha_at(&pixmap, 50, 50), 255);
        assert_eq!(alpha_at(&pixmap, 50, 1), 255);
    }

    #[test]
    fn oversized_radius_is_clamped() {
        // radius way beyond half the side degenerates to a circle, not garbage
        assert!(rounded_rect_path(0.0, 0.0, 10.0, 10.0, 1000.0).is_some());
    }

    #[test]
    fn empty_rect_has_no_path() {
        assert!(rounded_rect_path(0.0, 0.0, 0.0, 10.0, 2.0).is_none());
        assert!(rounded_rect_path(0.0, 0.0, 10.0, 0.0, 0.0).is_none());
        assert!(rounded_rect_path(0.0, 0.0, -4.0, 10.0, 0.0).is_none());
    }

    #[test]
    fn mask_restricts_drawing() {
        let mask = rounded_mask(Size::new(10, 10), Rect::new(2, 2, 4, 4), 0.0).unwrap();
        let mut dst = Pixmap::new(10, 10).unwrap();
        let mut src = Pixmap::new(10, 10).unwrap();
        src.fill(tiny_skia::Color::BLACK);
        draw_at(&mut dst, &src, 0, 0, Some(&mask));
        assert_eq!(alpha_at(&dst, 3, 3), 255);
        assert_eq!(alpha_at(&dst, 8, 8), 0);
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    #[test]
    fn opaque_pixels_survive_conversion() {
        let img = RgbaImage::from_fn(4, 3, |x, y| image::Rgba([x as u8 * 50, y as u8 * 80, 7, 255]));
        let back = pixmap_to_rgba(&pixmap_from_rgba(&img).unwrap());
        assert_eq!(back, img);
    }

    #[test]
    fn transparent_pixels_premultiply_to_zero() {
        let img = RgbaImage::from_pixel(2, 2, image::Rgba([200, 100, 50, 0]));
        let pixmap = pixmap_from_rgba(&img).unwrap();
        assert!(pixmap.data().iter().all(|&b| b == 0));
    }

    // =========================================================================
    // Shadow and flatten
    // =========================================================================

    #[test]
    fn shadow_darkens_outside_the_rect() {
        let mut pixmap = Pixmap::new(100, 100).unwrap();
        let rect = Rect::new(30, 30, 40, 40);
        let shadow = Shadow {
            sigma: 4.0,
            offset_y: 3.0,
            opacity: 0.5,
        };
        draw_shadow(&mut pixmap, rect, 0.0, shadow);
        // just below the rect, inside the blur reach
        assert!(alpha_at(&pixmap, 50, 72) > 0);
        // far corner untouched
        assert_eq!(alpha_at(&pixmap, 0, 0), 0);
    }

    #[test]
    fn shadow_scales_with_rect() {
        let small = Shadow::for_rect(Rect::new(0, 0, 100, 100));
        let large = Shadow::for_rect(Rect::new(0, 0, 1000, 1000));
        assert!(large.sigma > small.sigma);
        assert_eq!(small.opacity, large.opacity);
    }

    #[test]
    fn flatten_blends_with_background() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([0, 0, 0, 0])
            } else {
                image::Rgba([10, 20, 30, 255])
            }
        });
        let flat = flatten_onto(&img, Color::WHITE);
        assert_eq!(flat.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &image::Rgb([10, 20, 30]));
    }
}
