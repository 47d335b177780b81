//! Watermark composer.
//!
//! A watermark is up to two sub-blocks, a logo and a line of text, stacked
//! next to each other and anchored inside the photo or the frame.
//!
//! Rendering happens in three steps:
//!
//! 1. **Resolve** the configured sources into concrete content once
//!    ([`resolve`]): a logo bitmap or string, and the text string.
//! 2. **Size** everything from the photo rectangle ([`WatermarkMetrics`]) and
//!    rasterize the two sub-blocks.
//! 3. **Place** the stacked block ([`layout_block`], [`place_block`]) and draw it.
//!
//! Steps 2 and 3 are pure geometry apart from rasterization, so the
//! placement rules are tested without fonts.

pub mod logo;
pub mod text;

use crate::assets::AssetResolver;
use crate::config::{Anchor, StackLayout, TextSource, WatermarkArea, WatermarkConfig};
use crate::imaging::LayoutResult;
use crate::imaging::canvas;
use crate::metadata::{FlatMetadata, exif_text};
use crate::types::{Rect, Size};
use image::RgbaImage;
use image::imageops::{self, FilterType};
pub use logo::{LogoContent, logo_for_make, resolve_logo};
pub use text::FontBook;
use tiny_skia::Pixmap;
use tracing::warn;

/// Font size floor in pixels, before the percentage scale.
pub const MIN_BASE_FONT_PX: f32 = 8.0;
/// Base font size as a fraction of the photo's short side.
pub const BASE_FONT_FRACTION: f32 = 0.04;

/// Watermark content resolved for one render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Watermark {
    pub logo: Option<LogoContent>,
    pub text: Option<String>,
}

impl Watermark {
    pub fn is_empty(&self) -> bool {
        self.logo.is_none() && self.text.is_none()
    }
}

/// Resolve logo and text sources into drawable content.
pub fn resolve(
    config: &WatermarkConfig,
    metadata: &FlatMetadata,
    assets: &dyn AssetResolver,
) -> Watermark {
    let logo = if config.logo_enabled {
        resolve_logo(&config.logo, metadata, assets)
    } else {
        None
    };
    let text = if config.text_enabled {
        match &config.text {
            TextSource::Exif { fields } => exif_text(metadata, fields),
            TextSource::Literal { text } => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
        }
    } else {
        None
    };
    Watermark { logo, text }
}

/// Pixel sizes derived from the photo rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkMetrics {
    pub font_size: f32,
    pub logo_height: f32,
    /// Font size for a literal-text logo.
    pub logo_font_size: f32,
    pub gap: f32,
    pub edge_padding: f32,
}

impl WatermarkMetrics {
    pub fn new(photo: Size, config: &WatermarkConfig) -> Self {
        let config = config.normalized();
        let base = (photo.short_side() as f32 * BASE_FONT_FRACTION).max(MIN_BASE_FONT_PX);
        let font_size = base * config.font_size / 100.0;
        let logo_scale = config.logo_size / 50.0;
        Self {
            font_size,
            logo_height: font_size * 1.2 * logo_scale,
            logo_font_size: font_size * logo_scale,
            gap: font_size * 0.3,
            edge_padding: font_size * 0.5,
        }
    }
}

/// Positions of the sub-blocks inside the stacked block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub size: Size,
    /// Relative to the block's top-left corner.
    pub logo: Option<Rect>,
    pub text: Option<Rect>,
}

/// Stack the logo and text sub-blocks.
///
/// Vertical stacks are left-aligned and as wide as the wider sub-block;
/// horizontal stacks are vertically centered. The gap only appears when
/// both sub-blocks exist. Returns `None` when there is nothing to stack.
pub fn layout_block(
    logo: Option<Size>,
    text: Option<Size>,
    stacking: StackLayout,
    gap: u32,
) -> Option<BlockLayout> {
    let (first, second, logo_first) = match stacking {
        StackLayout::LogoTop | StackLayout::LogoLeft => (logo, text, true),
        StackLayout::LogoBottom | StackLayout::LogoRight => (text, logo, false),
    };
    let vertical = matches!(stacking, StackLayout::LogoTop | StackLayout::LogoBottom);

    let (a, b) = match (first, second) {
        (None, None) => return None,
        (Some(only), None) | (None, Some(only)) => {
            let rect = Some(Rect::from_size(only));
            let (logo, text) = if logo.is_some() { (rect, None) } else { (None, rect) };
            return Some(BlockLayout {
                size: only,
                logo,
                text,
            });
        }
        (Some(a), Some(b)) => (a, b),
    };

    let (size, ra, rb) = if vertical {
        let size = Size::new(a.width.max(b.width), a.height + gap + b.height);
        (
            size,
            Rect::new(0, 0, a.width, a.height),
            Rect::new(0, a.height + gap, b.width, b.height),
        )
    } else {
        let height = a.height.max(b.height);
        let size = Size::new(a.width + gap + b.width, height);
        (
            size,
            Rect::new(0, (height - a.height) / 2, a.width, a.height),
            Rect::new(a.width + gap, (height - b.height) / 2, b.width, b.height),
        )
    };
    let (logo, text) = if logo_first { (ra, rb) } else { (rb, ra) };
    Some(BlockLayout {
        size,
        logo: Some(logo),
        text: Some(text),
    })
}

/// Top-left canvas position of a block of size `block`.
///
/// Horizontal placement is `padding` in from the target rectangle's left or
/// right edge, or centered. Vertically, `InPhoto` keeps `padding` from the
/// photo's top or bottom edge, while `InFrame` centers the block in the
/// frame band above or below the photo. The result may be negative when the
/// block is larger than the space available; drawing clips it.
pub fn place_block(
    block: Size,
    layout: &LayoutResult,
    area: WatermarkArea,
    anchor: Anchor,
    padding: u32,
) -> (i64, i64) {
    let target = match area {
        WatermarkArea::InPhoto => layout.photo,
        WatermarkArea::InFrame => layout.frame,
    };
    let (bw, bh) = (i64::from(block.width), i64::from(block.height));
    let pad = i64::from(padding);
    let left = i64::from(target.x);
    let right = i64::from(target.right());

    let x = match anchor {
        Anchor::TopLeft | Anchor::BottomLeft => left + pad,
        Anchor::TopCenter | Anchor::BottomCenter => left + (right - left - bw) / 2,
        Anchor::TopRight | Anchor::BottomRight => right - pad - bw,
    };

    let y = match area {
        WatermarkArea::InPhoto => {
            if anchor.is_top() {
                i64::from(layout.photo.y) + pad
            } else {
                i64::from(layout.photo.bottom()) - pad - bh
            }
        }
        WatermarkArea::InFrame => {
            let (band_top, band_bottom) = if anchor.is_top() {
                (layout.frame.y, layout.photo.y)
            } else {
                (layout.photo.bottom(), layout.frame.bottom())
            };
            let band_top = i64::from(band_top);
            band_top + (i64::from(band_bottom) - band_top - bh) / 2
        }
    };
    (x, y)
}

/// Draw the watermark onto the canvas. A no-op when neither logo nor text is
/// enabled or nothing resolved.
pub fn paint_watermark(
    pixmap: &mut Pixmap,
    layout: &LayoutResult,
    config: &WatermarkConfig,
    frame_enabled: bool,
    content: &Watermark,
    fonts: &FontBook,
) {
    if !config.is_active() || content.is_empty() {
        return;
    }
    let metrics = WatermarkMetrics::new(layout.photo.size(), config);

    let needs_font = content.text.is_some() || matches!(content.logo, Some(LogoContent::Text(_)));
    let font = if needs_font {
        let font = fonts.resolve(&config.font);
        if font.is_none() {
            warn!("no font available, watermark text skipped");
        }
        font
    } else {
        None
    };

    let logo_bitmap = content.logo.as_ref().and_then(|logo| match logo {
        LogoContent::Bitmap(img) => scale_to_height(img, metrics.logo_height),
        LogoContent::Text(s) => font
            .as_ref()
            .and_then(|f| text::render_text(f, s, metrics.logo_font_size, config.font_color)),
    });
    let text_bitmap = content.text.as_ref().and_then(|s| {
        font.as_ref()
            .and_then(|f| text::render_text(f, s, metrics.font_size, config.font_color))
    });

    let size_of = |img: &RgbaImage| Size::new(img.width(), img.height());
    let Some(block) = layout_block(
        logo_bitmap.as_ref().map(size_of),
        text_bitmap.as_ref().map(size_of),
        config.layout,
        metrics.gap.round() as u32,
    ) else {
        return;
    };
    let (bx, by) = place_block(
        block.size,
        layout,
        config.effective_area(frame_enabled),
        config.anchor,
        metrics.edge_padding.round() as u32,
    );

    for (bitmap, rect) in [(&logo_bitmap, block.logo), (&text_bitmap, block.text)] {
        let (Some(bitmap), Some(rect)) = (bitmap, rect) else {
            continue;
        };
        let Some(src) = canvas::pixmap_from_rgba(bitmap) else {
            continue;
        };
        let x = bx + i64::from(rect.x);
        let y = by + i64::from(rect.y);
        canvas::draw_at(pixmap, &src, x as i32, y as i32, None);
    }
}

fn scale_to_height(img: &RgbaImage, height: f32) -> Option<RgbaImage> {
    let h = height.round() as u32;
    if h == 0 || img.height() == 0 {
        return None;
    }
    let w = ((img.width() as f32 * h as f32 / img.height() as f32).round() as u32).max(1);
    Some(imageops::resize(img, w, h, FilterType::Lanczos3))
}
