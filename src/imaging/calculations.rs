//! Pure geometry for frame layout.
//!
//! All functions here are pure and testable without any I/O or images.
//! Identical inputs always produce identical rectangles, which is what lets
//! the preview path reuse a cached [`LayoutResult`].

use crate::config::FrameConfig;
use crate::types::{Rect, Size};
use serde::Serialize;

/// Base padding is this fraction of the scaled photo's short side.
pub const BASE_PADDING_FRACTION: f64 = 0.1;

/// How the photo is sized before padding is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fit {
    /// Scale the photo down (or up) so photo + padding fits the container.
    Container(Size),
    /// Keep the photo at its natural size; the canvas grows by the padding.
    Native,
}

/// Frame and photo rectangles in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LayoutResult {
    /// Size of the bitmap to allocate. Equal to the frame rectangle's size.
    pub canvas: Size,
    pub frame: Rect,
    pub photo: Rect,
}

impl LayoutResult {
    pub fn padding_top(&self) -> u32 {
        self.photo.y - self.frame.y
    }

    pub fn padding_bottom(&self) -> u32 {
        self.frame.bottom() - self.photo.bottom()
    }
}

/// Resolve the frame and photo rectangles for one render.
///
/// Returns `None` ("no render") when the image is empty or the container is
/// too small to hold any photo pixels after padding.
///
/// With [`Fit::Container`] the photo is first fitted into the container
/// minus an *estimated* padding (computed from the container's short side,
/// which is never smaller than the photo's), so the final frame always fits
/// the container. The real padding is then computed from the scaled photo.
///
/// # Examples
/// ```
/// # use simple_frame::imaging::{Fit, resolve_layout};
/// # use simple_frame::config::FrameConfig;
/// # use simple_frame::types::Size;
/// let frame = FrameConfig {
///     padding_top: 10.0,
///     padding_sides: 10.0,
///     padding_bottom: 10.0,
///     ..Default::default()
/// };
/// let layout = resolve_layout(
///     Size::new(4000, 3000),
///     Fit::Container(Size::new(1000, 800)),
///     &frame,
/// )
/// .unwrap();
/// assert_eq!(layout.photo.size(), Size::new(984, 738));
/// assert_eq!(layout.canvas, Size::new(998, 752));
/// ```
pub fn resolve_layout(image: Size, fit: Fit, frame: &FrameConfig) -> Option<LayoutResult> {
    if image.is_empty() {
        return None;
    }
    let frame = frame.normalized();

    match fit {
        Fit::Native => padded_layout(image, &frame),
        Fit::Container(container) => {
            let layout = padded_layout(fit_into_container(image, container, &frame)?, &frame)?;
            // Rounded paddings can overshoot by a pixel. Shrinking the photo
            // never grows the paddings, so one correction is enough.
            let over_w = layout.canvas.width.saturating_sub(container.width);
            let over_h = layout.canvas.height.saturating_sub(container.height);
            if over_w == 0 && over_h == 0 {
                Some(layout)
            } else {
                let photo = layout.photo.size();
                let s = ((photo.width - over_w.min(photo.width)) as f64 / photo.width as f64)
                    .min((photo.height - over_h.min(photo.height)) as f64 / photo.height as f64);
                padded_layout(scale_down(photo, s), &frame)
            }
        }
    }
}

/// Surround a photo of size `scaled` with the configured paddings.
fn padded_layout(scaled: Size, frame: &FrameConfig) -> Option<LayoutResult> {
    if scaled.is_empty() {
        return None;
    }
    let base = scaled.short_side() as f64 * BASE_PADDING_FRACTION;
    let pad = |pct: f32| (base * pct as f64 / 100.0).round() as u32;
    let top = pad(frame.padding_top);
    let sides = pad(frame.padding_sides);
    let bottom = pad(frame.padding_bottom);

    let canvas = Size::new(
        scaled.width + 2 * sides,
        scaled.height + top + bottom,
    );
    Some(LayoutResult {
        canvas,
        frame: Rect::from_size(canvas),
        photo: Rect::new(sides, top, scaled.width, scaled.height),
    })
}

/// Scale `size` by `s`, flooring so the result never exceeds the exact value.
fn scale_down(size: Size, s: f64) -> Size {
    // The epsilon absorbs float error on exact ratios such as 984/4000
    let floor = |v: u32| (v as f64 * s + 1e-6).floor() as u32;
    Size::new(floor(size.width), floor(size.height))
}

fn fit_into_container(image: Size, container: Size, frame: &FrameConfig) -> Option<Size> {
    let est_base = container.short_side() as f64 * BASE_PADDING_FRACTION;
    let est = |pct: f32| est_base * pct as f64 / 100.0;

    let avail_w = container.width as f64 - 2.0 * est(frame.padding_sides);
    let avail_h = container.height as f64 - est(frame.padding_top) - est(frame.padding_bottom);
    if avail_w <= 0.0 || avail_h <= 0.0 {
        return None;
    }

    let scale = (avail_w / image.width as f64).min(avail_h / image.height as f64);
    Some(scale_down(image, scale))
}

/// Corner radius in pixels for a rectangle, given a percentage of half its
/// short side. Never exceeds half the short side.
pub fn corner_radius(percent: f32, rect: Size) -> f32 {
    let half = rect.short_side() as f32 / 2.0;
    let pct = if percent.is_finite() { percent.max(0.0) } else { 0.0 };
    (pct / 100.0 * half).min(half)
}

/// Calculate dimensions needed to cover a target area (resize before crop).
///
/// Returns dimensions that completely cover the target area while maintaining
/// the source aspect ratio. One dimension matches exactly, the other may exceed.
pub fn cover_dimensions(source: Size, target: Size) -> Size {
    let src_aspect = source.width as f64 / source.height as f64;
    let tgt_aspect = target.width as f64 / target.height as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height matches, width overflows
        let h = target.height;
        let w = ((h as f64 * src_aspect).round() as u32).max(target.width);
        Size::new(w, h)
    } else {
        // Source is taller: width matches, height overflows
        let w = target.width;
        let h = ((w as f64 / src_aspect).round() as u32).max(target.height);
        Size::new(w, h)
    }
}

/// Resize-then-crop plan for a cover fill: the resized size and the centered
/// crop window (in resized coordinates) that is exactly `target` large.
pub fn cover_crop(source: Size, target: Size) -> (Size, Rect) {
    let resized = cover_dimensions(source, target);
    let x = (resized.width - target.width) / 2;
    let y = (resized.height - target.height) / 2;
    (resized, Rect::new(x, y, target.width, target.height))
}

/// Rescale a blur radius tuned against the preview to another resolution.
///
/// The factor is the ratio of the photo rectangle widths at the two
/// resolutions. A zero preview width leaves the radius unchanged.
pub fn scaled_blur_radius(radius: f32, target_photo_width: u32, preview_photo_width: u32) -> f32 {
    let radius = if radius.is_finite() { radius.max(0.0) } else { 0.0 };
    if preview_photo_width == 0 {
        return radius;
    }
    radius * target_photo_width as f32 / preview_photo_width as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(top: f32, sides: f32, bottom: f32) -> FrameConfig {
        FrameConfig {
            padding_top: top,
            padding_sides: sides,
            padding_bottom: bottom,
            ..Default::default()
        }
    }

    // =========================================================================
    // resolve_layout tests
    // =========================================================================

    #[test]
    fn landscape_photo_in_container() {
        let layout = resolve_layout(
            Size::new(4000, 3000),
            Fit::Container(Size::new(1000, 800)),
            &padded(10.0, 10.0, 10.0),
        )
        .unwrap();
        // avail = 1000 - 16 = 984 wide, 800 - 16 = 784 high; width limits
        assert_eq!(layout.photo, Rect::new(7, 7, 984, 738));
        assert_eq!(layout.canvas, Size::new(998, 752));
        assert!(layout.frame.area() > layout.photo.area());
    }

    #[test]
    fn frame_fits_inside_container() {
        let container = Size::new(640, 480);
        for (iw, ih) in [(4000, 3000), (3000, 4000), (1000, 1000), (6000, 1000)] {
            let layout = resolve_layout(
                Size::new(iw, ih),
                Fit::Container(container),
                &padded(50.0, 80.0, 120.0),
            )
            .unwrap();
            assert!(layout.canvas.width <= container.width, "{iw}x{ih}");
            assert!(layout.canvas.height <= container.height, "{iw}x{ih}");
        }
    }

    #[test]
    fn rounded_padding_never_overflows_container() {
        // 25% of a 100px short side estimates 2.5px per side; rounding the
        // real padding up must not push the canvas past the container
        for pct in [5.0, 15.0, 25.0, 35.0, 45.0, 50.0, 75.0] {
            for side in 20..140 {
                let container = Size::new(side, side);
                let frame = padded(pct, pct, pct);
                for image in [Size::new(1000, 1000), Size::new(999, 1000), Size::new(1000, 333)] {
                    if let Some(layout) = resolve_layout(image, Fit::Container(container), &frame) {
                        assert!(layout.canvas.width <= side, "{pct}% {side} {image}");
                        assert!(layout.canvas.height <= side, "{pct}% {side} {image}");
                        assert!(layout.frame.contains(&layout.photo));
                    }
                }
            }
        }
    }

    #[test]
    fn fitted_photo_is_floored() {
        // 1000 * (97 / 300) = 323.33: floor, never round up
        let layout =
            resolve_layout(Size::new(300, 1000), Fit::Container(Size::new(97, 1000)), &padded(0.0, 0.0, 0.0))
                .unwrap();
        assert_eq!(layout.photo.size(), Size::new(97, 323));
    }

    #[test]
    fn photo_always_inside_frame() {
        for top in [0.0, 10.0, 100.0, 300.0] {
            for sides in [0.0, 25.0, 100.0] {
                for container in [Size::new(300, 200), Size::new(1920, 1080)] {
                    let Some(layout) = resolve_layout(
                        Size::new(1234, 987),
                        Fit::Container(container),
                        &padded(top, sides, 40.0),
                    ) else {
                        continue;
                    };
                    assert!(layout.frame.contains(&layout.photo));
                }
            }
        }
    }

    #[test]
    fn disabled_frame_has_equal_rects() {
        let frame = FrameConfig {
            enabled: false,
            ..padded(50.0, 50.0, 50.0)
        };
        let layout =
            resolve_layout(Size::new(400, 300), Fit::Container(Size::new(200, 200)), &frame)
                .unwrap();
        assert_eq!(layout.frame, layout.photo);
        assert_eq!(layout.photo.size(), Size::new(200, 150));
    }

    #[test]
    fn native_fit_keeps_photo_size() {
        let layout =
            resolve_layout(Size::new(4000, 3000), Fit::Native, &padded(10.0, 20.0, 100.0))
                .unwrap();
        assert_eq!(layout.photo.size(), Size::new(4000, 3000));
        // base = 300 → 30 / 60 / 300
        assert_eq!(layout.photo.x, 60);
        assert_eq!(layout.padding_top(), 30);
        assert_eq!(layout.padding_bottom(), 300);
        assert_eq!(layout.canvas, Size::new(4120, 3330));
    }

    #[test]
    fn container_too_small_is_no_render() {
        // 1000% padding on a 100px container eats everything
        let frame = padded(1000.0, 1000.0, 1000.0);
        assert!(
            resolve_layout(Size::new(400, 300), Fit::Container(Size::new(100, 100)), &frame)
                .is_none()
        );
        assert!(
            resolve_layout(Size::new(400, 300), Fit::Container(Size::new(0, 100)), &padded(0.0, 0.0, 0.0))
                .is_none()
        );
    }

    #[test]
    fn empty_image_is_no_render() {
        assert!(resolve_layout(Size::new(0, 10), Fit::Native, &FrameConfig::default()).is_none());
    }

    #[test]
    fn negative_padding_treated_as_zero() {
        let layout =
            resolve_layout(Size::new(100, 100), Fit::Native, &padded(-50.0, -1.0, 0.0)).unwrap();
        assert_eq!(layout.frame, layout.photo);
    }

    #[test]
    fn resolve_is_deterministic() {
        let frame = padded(33.0, 17.0, 91.0);
        let a = resolve_layout(Size::new(5472, 3648), Fit::Container(Size::new(1280, 720)), &frame);
        let b = resolve_layout(Size::new(5472, 3648), Fit::Container(Size::new(1280, 720)), &frame);
        assert_eq!(a, b);
    }

    // =========================================================================
    // corner_radius tests
    // =========================================================================

    #[test]
    fn corner_radius_percent_of_half_short_side() {
        assert_eq!(corner_radius(50.0, Size::new(400, 200)), 50.0);
        assert_eq!(corner_radius(0.0, Size::new(400, 200)), 0.0);
    }

    #[test]
    fn corner_radius_clamped_to_half_short_side() {
        for pct in [100.0, 150.0, 1000.0, f32::INFINITY] {
            let r = corner_radius(pct, Size::new(400, 200));
            assert!(r <= 100.0, "{pct} → {r}");
        }
        assert_eq!(corner_radius(-20.0, Size::new(400, 200)), 0.0);
    }

    // =========================================================================
    // cover tests
    // =========================================================================

    #[test]
    fn cover_wider_source_to_portrait_target() {
        // 800x600 (4:3) → 400x500: height matches, width = 667
        assert_eq!(
            cover_dimensions(Size::new(800, 600), Size::new(400, 500)),
            Size::new(667, 500)
        );
    }

    #[test]
    fn cover_taller_source_to_landscape_target() {
        assert_eq!(
            cover_dimensions(Size::new(600, 800), Size::new(500, 400)),
            Size::new(500, 667)
        );
    }

    #[test]
    fn cover_crop_is_centered_and_exact() {
        let (resized, crop) = cover_crop(Size::new(800, 600), Size::new(400, 500));
        assert_eq!(resized, Size::new(667, 500));
        assert_eq!(crop, Rect::new(133, 0, 400, 500));
        assert!(Rect::from_size(resized).contains(&crop));
    }

    // =========================================================================
    // scaled_blur_radius tests
    // =========================================================================

    #[test]
    fn blur_radius_scales_with_width_ratio() {
        assert_eq!(scaled_blur_radius(10.0, 4000, 1000), 40.0);
        assert_eq!(scaled_blur_radius(10.0, 1000, 1000), 10.0);
    }

    #[test]
    fn blur_radius_never_negative() {
        assert_eq!(scaled_blur_radius(-3.0, 4000, 1000), 0.0);
        assert_eq!(scaled_blur_radius(5.0, 4000, 0), 5.0);
    }
}
