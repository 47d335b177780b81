//! Render and export configuration.
//!
//! Handles loading, validating and normalizing `simple-frame.toml`. The file
//! describes one configuration snapshot: how the frame looks, what the
//! watermark says and where it sits, how many export workers to run, and where
//! logo/font assets live.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [frame]
//! enabled = true
//! padding_top = 40.0        # percent of the base padding (10% of the photo's short side)
//! padding_sides = 40.0
//! padding_bottom = 100.0
//! frame_radius = 0.0        # percent of half the frame's short side
//! photo_radius = 0.0        # percent of half the photo's short side
//! style = "solid-color"     # or "blur-extend"
//! blur_radius = 30.0        # pixels at preview scale
//! color = "#ffffff"
//! frame_shadow = false
//! photo_shadow = false
//!
//! [watermark]
//! logo_enabled = true
//! logo = { source = "auto-detect" }
//! logo_size = 50.0
//! text_enabled = true
//! text = { source = "exif" }
//! font = { source = "system", family = "sans-serif" }
//! font_size = 100.0
//! font_color = "#333333"
//! layout = "logo-left"
//! area = "in-frame"
//! anchor = "bottom-center"
//!
//! [export]
//! max_workers = 4           # omit for auto = cores - 2
//! preview_width = 1200
//! preview_height = 900
//!
//! [assets]
//! logos_dir = "assets/logos"
//! user_dir = "~/.simple-frame"
//! ```
//!
//! Unknown keys are rejected to catch typos early. Out-of-range numbers
//! (negative paddings, radii, blur or font sizes) are not errors: they are
//! clamped by [`FrameConfig::normalized`] and [`WatermarkConfig::normalized`]
//! when a render snapshot is taken.

use crate::types::Color;
use crate::types::Size;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default config file name looked up in the working directory.
pub const CONFIG_FILENAME: &str = "simple-frame.toml";

/// A complete configuration snapshot loaded from `simple-frame.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub frame: FrameConfig,
    pub watermark: WatermarkConfig,
    pub export: ExportSettings,
    pub assets: AssetsConfig,
}

impl RenderConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: RenderConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot be normalized into something usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export.preview_width == 0 || self.export.preview_height == 0 {
            return Err(ConfigError::Validation(
                "export.preview_width and export.preview_height must be non-zero".into(),
            ));
        }
        if self.export.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "export.max_workers must be at least 1 (omit for auto)".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Frame
// ============================================================================

/// How the frame rectangle is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameStyle {
    #[default]
    SolidColor,
    /// Cover-cropped, Gaussian-blurred copy of the photo itself.
    BlurExtend,
}

/// Frame geometry and appearance.
///
/// Padding percentages are relative to a base padding of 10% of the scaled
/// photo's short side, so `100.0` means "one base unit".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    pub enabled: bool,
    pub padding_top: f32,
    pub padding_sides: f32,
    pub padding_bottom: f32,
    /// Frame corner radius, percent of half the frame's short side.
    pub frame_radius: f32,
    /// Photo corner radius, percent of half the photo's short side.
    pub photo_radius: f32,
    pub style: FrameStyle,
    /// Gaussian standard deviation in pixels, tuned against the preview.
    pub blur_radius: f32,
    pub color: Color,
    pub frame_shadow: bool,
    pub photo_shadow: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            padding_top: 40.0,
            padding_sides: 40.0,
            padding_bottom: 100.0,
            frame_radius: 0.0,
            photo_radius: 0.0,
            style: FrameStyle::SolidColor,
            blur_radius: 30.0,
            color: Color::WHITE,
            frame_shadow: false,
            photo_shadow: false,
        }
    }
}

impl FrameConfig {
    /// Snapshot with every numeric field clamped to a usable range.
    ///
    /// A disabled frame has zero padding.
    pub fn normalized(&self) -> Self {
        let enabled = self.enabled;
        let padding = |v: f32| if enabled { non_negative(v) } else { 0.0 };
        Self {
            padding_top: padding(self.padding_top),
            padding_sides: padding(self.padding_sides),
            padding_bottom: padding(self.padding_bottom),
            frame_radius: non_negative(self.frame_radius),
            photo_radius: non_negative(self.photo_radius),
            blur_radius: non_negative(self.blur_radius),
            ..self.clone()
        }
    }

    /// The photo only casts a shadow onto an actual frame.
    pub fn draws_photo_shadow(&self) -> bool {
        self.enabled && self.photo_shadow
    }

    pub fn draws_frame_shadow(&self) -> bool {
        self.enabled && self.frame_shadow
    }
}

fn non_negative(v: f32) -> f32 {
    if v.is_finite() { v.max(0.0) } else { 0.0 }
}

// ============================================================================
// Watermark
// ============================================================================

/// Where the logo comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum LogoSource {
    /// Pick a manufacturer logo from the metadata `Make` field.
    #[default]
    AutoDetect,
    /// A logo shipped in the application logo directory.
    Library { key: String },
    /// A logo uploaded by the user.
    UserCustom { key: String },
    /// No bitmap: the string is drawn as the "logo".
    LiteralText { text: String },
}

/// Which EXIF fields feed the watermark text. Order is fixed, see
/// [`crate::metadata::exif_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExifFields {
    pub model: bool,
    pub focal_length: bool,
    pub f_number: bool,
    pub exposure_time: bool,
    pub iso: bool,
}

impl Default for ExifFields {
    fn default() -> Self {
        Self {
            model: true,
            focal_length: true,
            f_number: true,
            exposure_time: true,
            iso: true,
        }
    }
}

/// Where the watermark text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum TextSource {
    Exif {
        #[serde(default)]
        fields: ExifFields,
    },
    Literal {
        text: String,
    },
}

impl Default for TextSource {
    fn default() -> Self {
        TextSource::Exif {
            fields: ExifFields::default(),
        }
    }
}

/// Font selection: a system family name or a user-uploaded font key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum FontSource {
    System { family: String },
    User { key: String },
}

impl Default for FontSource {
    fn default() -> Self {
        FontSource::System {
            family: "sans-serif".to_string(),
        }
    }
}

/// Relative placement of the logo and text sub-blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StackLayout {
    LogoTop,
    LogoBottom,
    #[default]
    LogoLeft,
    LogoRight,
}

/// Rectangle the watermark block is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkArea {
    InPhoto,
    #[default]
    InFrame,
}

/// One of six anchor positions: {top, bottom} x {left, center, right}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    BottomLeft,
    #[default]
    BottomCenter,
    BottomRight,
}

impl Anchor {
    pub fn is_top(self) -> bool {
        matches!(self, Anchor::TopLeft | Anchor::TopCenter | Anchor::TopRight)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkConfig {
    pub logo_enabled: bool,
    pub logo: LogoSource,
    /// Logo height scale; `50.0` is the neutral size.
    pub logo_size: f32,
    pub text_enabled: bool,
    pub text: TextSource,
    pub font: FontSource,
    /// Font size scale in percent; `100.0` is the neutral size.
    pub font_size: f32,
    pub font_color: Color,
    pub layout: StackLayout,
    pub area: WatermarkArea,
    pub anchor: Anchor,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            logo_enabled: true,
            logo: LogoSource::default(),
            logo_size: 50.0,
            text_enabled: true,
            text: TextSource::default(),
            font: FontSource::default(),
            font_size: 100.0,
            font_color: Color::rgb(0x33, 0x33, 0x33),
            layout: StackLayout::default(),
            area: WatermarkArea::default(),
            anchor: Anchor::default(),
        }
    }
}

impl WatermarkConfig {
    pub fn normalized(&self) -> Self {
        Self {
            logo_size: non_negative(self.logo_size),
            font_size: non_negative(self.font_size),
            ..self.clone()
        }
    }

    /// With neither logo nor text enabled the composer does nothing.
    pub fn is_active(&self) -> bool {
        self.logo_enabled || self.text_enabled
    }

    /// `InFrame` has nothing to anchor to when the frame is disabled.
    pub fn effective_area(&self, frame_enabled: bool) -> WatermarkArea {
        if frame_enabled {
            self.area
        } else {
            WatermarkArea::InPhoto
        }
    }
}

// ============================================================================
// Export and assets
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSettings {
    /// Maximum number of export workers. When absent, `cores - 2` (min 1).
    /// Values larger than the automatic count are clamped down.
    pub max_workers: Option<usize>,
    /// Container size the interactive preview renders into. The blur radius
    /// is tuned against this preview and rescaled for full-resolution export.
    pub preview_width: u32,
    pub preview_height: u32,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            max_workers: None,
            preview_width: 1200,
            preview_height: 900,
        }
    }
}

impl ExportSettings {
    pub fn preview_container(&self) -> Size {
        Size::new(self.preview_width, self.preview_height)
    }
}

/// Resolve the effective worker count.
///
/// - `None` → `max(1, cores - 2)`, leaving room for the caller's own work
/// - `Some(n)` → `min(n, auto)` (user can constrain down, not up)
pub fn effective_workers(max_workers: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let auto = cores.saturating_sub(2).max(1);
    max_workers.map(|n| n.clamp(1, auto)).unwrap_or(auto)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Built-in manufacturer and library logos.
    pub logos_dir: PathBuf,
    /// Per-user asset root holding `logos/` and `fonts/`. When absent,
    /// `~/.simple-frame`.
    pub user_dir: Option<PathBuf>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            logos_dir: PathBuf::from("assets/logos"),
            user_dir: None,
        }
    }
}

impl AssetsConfig {
    pub fn resolved_user_dir(&self) -> PathBuf {
        self.user_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".simple-frame")
        })
    }
}

/// Generate a documented stock `simple-frame.toml` with all default values.
pub fn stock_config_toml() -> &'static str {
    r##"# Simple Frame Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Frame
# ---------------------------------------------------------------------------
[frame]
# Disable to render the bare photo (watermark still allowed, inside the photo).
enabled = true

# Paddings, in percent of the base padding (10% of the photo's short side).
padding_top = 40.0
padding_sides = 40.0
padding_bottom = 100.0

# Corner radii, in percent of half the short side of their own rectangle.
frame_radius = 0.0
photo_radius = 0.0

# "solid-color" or "blur-extend" (blurred copy of the photo behind it).
style = "solid-color"

# Blur strength in pixels as seen in the preview. Rescaled for export.
blur_radius = 30.0

# Fill color for "solid-color" frames.
color = "#ffffff"

frame_shadow = false
photo_shadow = false

# ---------------------------------------------------------------------------
# Watermark
# ---------------------------------------------------------------------------
[watermark]
logo_enabled = true
# { source = "auto-detect" }                 camera make from EXIF
# { source = "library", key = "canon" }      built-in logo
# { source = "user-custom", key = "my_logo" } uploaded logo
# { source = "literal-text", text = "..." }  text drawn instead of a bitmap
logo = { source = "auto-detect" }
logo_size = 50.0

text_enabled = true
# { source = "exif" } or { source = "literal", text = "..." }
text = { source = "exif" }

# { source = "system", family = "..." } or { source = "user", key = "..." }
font = { source = "system", family = "sans-serif" }
font_size = 100.0
font_color = "#333333"

# "logo-top", "logo-bottom", "logo-left" or "logo-right"
layout = "logo-left"
# "in-photo" or "in-frame"
area = "in-frame"
# "top-left", "top-center", "top-right",
# "bottom-left", "bottom-center", "bottom-right"
anchor = "bottom-center"

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# max_workers = 4
preview_width = 1200
preview_height = 900

# ---------------------------------------------------------------------------
# Assets
# ---------------------------------------------------------------------------
[assets]
logos_dir = "assets/logos"
# user_dir = "/home/me/.simple-frame"
"##
}
