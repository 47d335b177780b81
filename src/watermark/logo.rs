//! Logo resolution: manufacturer table, library keys, literal text.

use crate::assets::{AssetResolver, LogoLibrary, asset_key};
use crate::config::LogoSource;
use crate::metadata::FlatMetadata;
use image::RgbaImage;
use std::path::Path;
use tracing::{debug, warn};

/// Camera `Make` (or model, for bodies that report it there) → built-in logo file.
pub const MANUFACTURER_LOGOS: &[(&str, &str)] = &[
    ("Canon", "canon.png"),
    ("NIKON CORPORATION", "nikon.png"),
    ("NIKON", "nikon.png"),
    ("SONY", "sony.png"),
    ("ILCE-7M4", "sony.png"),
    ("FUJIFILM", "fujifilm.png"),
    ("Panasonic", "panasonic.png"),
    ("LEICA CAMERA AG", "leica.png"),
    ("RICOH IMAGING COMPANY, LTD.", "ricoh.png"),
    ("OM Digital Solutions", "omsystem.png"),
    ("OLYMPUS CORPORATION", "olympus.png"),
];

/// Look up the logo file for a camera make.
///
/// An exact (case-insensitive) match wins. Otherwise the longest table key
/// that is a case-insensitive prefix of `make` is used, so
/// `"Canon EOS R5"` resolves through `"Canon"`.
pub fn logo_for_make(make: &str) -> Option<&'static str> {
    let make = make.trim();
    if make.is_empty() {
        return None;
    }
    if let Some((_, file)) = MANUFACTURER_LOGOS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(make))
    {
        return Some(file);
    }
    MANUFACTURER_LOGOS
        .iter()
        .filter(|(key, _)| starts_with_ignore_case(make, key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, file)| *file)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// A logo resolved to something drawable.
#[derive(Debug, Clone, PartialEq)]
pub enum LogoContent {
    Bitmap(RgbaImage),
    /// Drawn with the watermark font instead of a bitmap.
    Text(String),
}

/// Resolve the configured logo source once per render.
///
/// Every miss (no make, unknown make, missing or undecodable file, empty
/// literal) is `None`: the watermark is drawn without a logo.
pub fn resolve_logo(
    source: &LogoSource,
    metadata: &FlatMetadata,
    assets: &dyn AssetResolver,
) -> Option<LogoContent> {
    let path = match source {
        LogoSource::LiteralText { text } => {
            let text = text.trim();
            return (!text.is_empty()).then(|| LogoContent::Text(text.to_string()));
        }
        LogoSource::AutoDetect => {
            let make = metadata.make()?;
            let Some(file) = logo_for_make(make) else {
                debug!("no logo mapping for make '{make}'");
                return None;
            };
            let stem = Path::new(file).file_stem()?.to_string_lossy();
            assets.resolve_logo(LogoLibrary::App, &asset_key(&stem))
        }
        LogoSource::Library { key } => assets.resolve_logo(LogoLibrary::App, key),
        LogoSource::UserCustom { key } => assets.resolve_logo(LogoLibrary::User, key),
    };
    let Some(path) = path else {
        warn!("logo for {source:?} not found");
        return None;
    };
    match image::open(&path) {
        Ok(img) => Some(LogoContent::Bitmap(img.to_rgba8())),
        Err(e) => {
            warn!("could not decode logo {}: {e}", path.display());
            None
        }
    }
}
