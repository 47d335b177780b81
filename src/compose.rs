//! Composition engine: one image, one configuration snapshot, one bitmap.
//!
//! Layers are painted bottom-up onto a transparent canvas:
//!
//! ```text
//! 1. frame shadow     (frame enabled + frame_shadow)
//! 2. background       (solid color or blur-extended photo, rounded)
//! 3. photo            (scaled, rounded, optional drop shadow)
//! 4. watermark        (logo + text block at the configured anchor)
//! ```
//!
//! Two entry points share that painting code:
//!
//! - [`Compositor`] is stateless and `Sync`. The export pipeline shares one
//!   across all workers and every render is computed fresh.
//! - [`PreviewSession`] wraps a compositor for the single-threaded
//!   interactive path. It remembers the last [`LayoutResult`] (reused while
//!   only colors or shadows change) and owns a [`BlurCache`].
//!
//! The blur radius is tuned against the preview. Export renders at the
//! photo's native size and rescales the radius by the ratio of the two photo
//! widths so the background looks equally soft in both.

use crate::assets::AssetResolver;
use crate::cache::{BlurCache, BlurKey, ImageId, SourceImage};
use crate::config::{FrameConfig, FrameStyle, WatermarkConfig};
use crate::imaging::canvas::{self, Shadow};
use crate::imaging::{
    Fit, LayoutResult, background, corner_radius, photo, resolve_layout, scaled_blur_radius,
};
use crate::metadata::FlatMetadata;
use crate::types::Size;
use crate::watermark::{self, FontBook};
use image::RgbaImage;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::debug;

/// Resolution a render is produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// Fit photo plus frame into this container.
    Preview(Size),
    /// Full resolution: the photo keeps its natural size. The preview
    /// container is needed to rescale the blur radius.
    Export { preview_container: Size },
}

impl RenderTarget {
    fn fit(self) -> Fit {
        match self {
            RenderTarget::Preview(container) => Fit::Container(container),
            RenderTarget::Export { .. } => Fit::Native,
        }
    }
}

/// A finished render and the rectangles that produced it.
#[derive(Debug, Clone)]
pub struct RenderedComposite {
    pub image: RgbaImage,
    pub layout: LayoutResult,
}

/// Blur sigma for a render at `target` whose layout is `layout`.
///
/// At preview resolution this is the configured radius. At export
/// resolution it is scaled by `layout.photo.width / preview_photo.width`,
/// where the preview photo width comes from laying the same image out in
/// the preview container.
pub fn blur_sigma(image: Size, frame: &FrameConfig, target: RenderTarget, layout: &LayoutResult) -> f32 {
    let frame = frame.normalized();
    match target {
        RenderTarget::Preview(_) => frame.blur_radius,
        RenderTarget::Export { preview_container } => {
            let preview_width = resolve_layout(image, Fit::Container(preview_container), &frame)
                .map(|preview| preview.photo.width)
                .unwrap_or(0);
            scaled_blur_radius(frame.blur_radius, layout.photo.width, preview_width)
        }
    }
}

/// Stateless renderer shared by preview and export.
pub struct Compositor {
    assets: Arc<dyn AssetResolver>,
    fonts: Arc<FontBook>,
}

impl Compositor {
    pub fn new(assets: Arc<dyn AssetResolver>, fonts: Arc<FontBook>) -> Self {
        Self { assets, fonts }
    }

    /// Render one image. `None` is the "no render" signal: the image is
    /// empty or the target is too small to hold any photo pixels.
    pub fn render(
        &self,
        source: &SourceImage,
        metadata: &FlatMetadata,
        frame: &FrameConfig,
        watermark: &WatermarkConfig,
        target: RenderTarget,
    ) -> Option<RenderedComposite> {
        let frame = frame.normalized();
        let layout = resolve_layout(source.size(), target.fit(), &frame)?;
        let blurred = match (frame.enabled, frame.style) {
            (true, FrameStyle::BlurExtend) => {
                let sigma = blur_sigma(source.size(), &frame, target, &layout);
                background::blur_extend(&source.pixels, layout.frame.size(), sigma)
            }
            _ => None,
        };
        self.paint(source, metadata, &frame, watermark, layout, blurred.as_ref())
    }

    fn paint(
        &self,
        source: &SourceImage,
        metadata: &FlatMetadata,
        frame: &FrameConfig,
        watermark_config: &WatermarkConfig,
        layout: LayoutResult,
        blurred: Option<&RgbaImage>,
    ) -> Option<RenderedComposite> {
        let mut pixmap = Pixmap::new(layout.canvas.width, layout.canvas.height)?;

        if frame.enabled {
            if frame.draws_frame_shadow() {
                let radius = corner_radius(frame.frame_radius, layout.frame.size());
                canvas::draw_shadow(&mut pixmap, layout.frame, radius, Shadow::for_rect(layout.frame));
            }
            background::paint_background(&mut pixmap, &layout, frame, blurred);
        }

        let scaled = photo::scale_photo(&source.pixels, layout.photo.size());
        photo::paint_photo(&mut pixmap, &layout, frame, &scaled);

        let content = watermark::resolve(watermark_config, metadata, self.assets.as_ref());
        watermark::paint_watermark(
            &mut pixmap,
            &layout,
            watermark_config,
            frame.enabled,
            &content,
            &self.fonts,
        );

        Some(RenderedComposite {
            image: canvas::pixmap_to_rgba(&pixmap),
            layout,
        })
    }
}

/// Everything that changes the rectangles. Colors, shadows, style and the
/// watermark do not.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeometryKey {
    image: ImageId,
    size: Size,
    fit: Fit,
    enabled: bool,
    padding_bits: [u32; 3],
}

impl GeometryKey {
    fn new(source: &SourceImage, fit: Fit, frame: &FrameConfig) -> Self {
        Self {
            image: source.id.clone(),
            size: source.size(),
            fit,
            enabled: frame.enabled,
            padding_bits: [
                frame.padding_top.to_bits(),
                frame.padding_sides.to_bits(),
                frame.padding_bottom.to_bits(),
            ],
        }
    }
}

/// Incremental preview renderer. Not shared across threads.
pub struct PreviewSession {
    compositor: Arc<Compositor>,
    container: Size,
    layout: Option<(GeometryKey, LayoutResult)>,
    blur: BlurCache,
    layout_hits: u64,
}

impl PreviewSession {
    pub fn new(compositor: Arc<Compositor>, container: Size) -> Self {
        Self {
            compositor,
            container,
            layout: None,
            blur: BlurCache::new(),
            layout_hits: 0,
        }
    }

    pub fn container(&self) -> Size {
        self.container
    }

    /// Change the preview container (window resize). Cached rectangles are
    /// keyed by the container, so they are recomputed on the next render.
    pub fn set_container(&mut self, container: Size) {
        self.container = container;
    }

    pub fn render(
        &mut self,
        source: &SourceImage,
        metadata: &FlatMetadata,
        frame: &FrameConfig,
        watermark: &WatermarkConfig,
    ) -> Option<RenderedComposite> {
        let frame = frame.normalized();
        let target = RenderTarget::Preview(self.container);
        let layout = self.layout_for(source, target.fit(), &frame)?;

        let blurred = if frame.enabled && frame.style == FrameStyle::BlurExtend {
            let sigma = blur_sigma(source.size(), &frame, target, &layout);
            let key = BlurKey::new(source.id.clone(), sigma, layout.frame.size());
            self.blur.get_or_insert_with(key, || {
                background::blur_extend(&source.pixels, layout.frame.size(), sigma)
            })
        } else {
            None
        };

        self.compositor
            .paint(source, metadata, &frame, watermark, layout, blurred.as_deref())
    }

    fn layout_for(&mut self, source: &SourceImage, fit: Fit, frame: &FrameConfig) -> Option<LayoutResult> {
        let key = GeometryKey::new(source, fit, frame);
        if let Some((cached_key, layout)) = &self.layout {
            if *cached_key == key {
                self.layout_hits += 1;
                return Some(*layout);
            }
        }
        let layout = resolve_layout(source.size(), fit, frame)?;
        debug!("preview layout for {}: {:?}", source.id, layout);
        self.layout = Some((key, layout));
        Some(layout)
    }

    /// Renders that reused the cached rectangles.
    pub fn layout_hits(&self) -> u64 {
        self.layout_hits
    }

    pub fn blur_cache(&self) -> &BlurCache {
        &self.blur
    }
}
