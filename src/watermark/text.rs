//! Fonts and text rasterization for the watermark.
//!
//! Faces are located with `fontdb` (system fonts plus user uploads) and
//! rasterized with `ab_glyph`. A [`FontBook`] is built once and shared by
//! every render; loaded faces are memoized per face id.

use crate::assets::asset_key;
use crate::config::FontSource;
use crate::types::{Color, Size};
use ab_glyph::{Font, FontArc, FontVec, Glyph, GlyphId, PxScale, ScaleFont, point};
use fontdb::{Database, Family, ID, Query};
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Font database plus the set of families that came from user uploads.
pub struct FontBook {
    db: Database,
    user_families: Vec<String>,
    loaded: Mutex<HashMap<ID, FontArc>>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::empty()
    }
}

impl FontBook {
    /// A book with no fonts at all. Text is skipped when rendering with it.
    pub fn empty() -> Self {
        Self {
            db: Database::new(),
            user_families: Vec::new(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// All fonts installed on the system.
    pub fn system() -> Self {
        let mut book = Self::empty();
        book.db.load_system_fonts();
        debug!("loaded {} system font faces", book.db.len());
        book
    }

    /// Add user font files. Unreadable files are skipped with a warning.
    pub fn with_user_fonts(mut self, files: &[PathBuf]) -> Self {
        for file in files {
            let before = self.face_ids();
            if let Err(e) = self.db.load_font_file(file) {
                warn!("could not load font {}: {e}", file.display());
                continue;
            }
            self.track_user_faces(&before);
        }
        self
    }

    /// Add a user font from memory.
    pub fn add_user_font_data(&mut self, data: Vec<u8>) {
        let before = self.face_ids();
        self.db.load_font_data(data);
        self.track_user_faces(&before);
    }

    fn face_ids(&self) -> HashSet<ID> {
        self.db.faces().map(|f| f.id).collect()
    }

    fn track_user_faces(&mut self, before: &HashSet<ID>) {
        for face in self.db.faces().filter(|f| !before.contains(&f.id)) {
            if let Some((family, _)) = face.families.first() {
                if !self.user_families.contains(family) {
                    self.user_families.push(family.clone());
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Snake-case keys of the user-uploaded families.
    pub fn user_font_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.user_families.iter().map(|f| asset_key(f)).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Resolve a configured font, falling back to the default sans-serif
    /// family (or any face at all) when the requested one is unknown.
    pub fn resolve(&self, source: &FontSource) -> Option<FontArc> {
        let family = match source {
            FontSource::System { family } => self.system_family(family),
            FontSource::User { key } => self.user_family(key),
        };
        let id = family
            .and_then(|name| self.query(Family::Name(&name)))
            .or_else(|| {
                warn!("font {source:?} not found, using default sans-serif");
                self.query(Family::SansSerif)
            })
            .or_else(|| self.db.faces().next().map(|f| f.id))?;
        self.load(id)
    }

    fn system_family(&self, requested: &str) -> Option<String> {
        match requested.trim().to_ascii_lowercase().as_str() {
            "sans-serif" | "sans" => return self.generic(Family::SansSerif),
            "serif" => return self.generic(Family::Serif),
            "monospace" => return self.generic(Family::Monospace),
            _ => {}
        }
        let wanted = asset_key(requested);
        self.db
            .faces()
            .flat_map(|f| f.families.iter().map(|(name, _)| name))
            .find(|name| name.eq_ignore_ascii_case(requested) || asset_key(name) == wanted)
            .cloned()
    }

    fn generic(&self, family: Family<'_>) -> Option<String> {
        Some(self.db.family_name(&family).to_string())
    }

    fn user_family(&self, key: &str) -> Option<String> {
        let wanted = asset_key(key);
        self.user_families
            .iter()
            .find(|f| asset_key(f) == wanted)
            .cloned()
    }

    fn query(&self, family: Family<'_>) -> Option<ID> {
        self.db.query(&Query {
            families: &[family],
            ..Query::default()
        })
    }

    fn load(&self, id: ID) -> Option<FontArc> {
        if let Ok(cache) = self.loaded.lock() {
            if let Some(font) = cache.get(&id) {
                return Some(font.clone());
            }
        }
        let font = self
            .db
            .with_face_data(id, |data, index| {
                FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
            })
            .flatten()
            .map(FontArc::new)?;
        if let Ok(mut cache) = self.loaded.lock() {
            cache.insert(id, font.clone());
        }
        Some(font)
    }
}

/// Glyphs positioned on one baseline, plus the line box.
struct Line {
    glyphs: Vec<Glyph>,
    width: f32,
    height: f32,
}

fn layout_line(font: &FontArc, text: &str, px: f32) -> Line {
    let scaled = font.as_scaled(PxScale::from(px));
    let ascent = scaled.ascent();
    let mut glyphs = Vec::new();
    let mut x = 0.0;
    let mut prev: Option<GlyphId> = None;
    for ch in text.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(ch);
        if let Some(p) = prev {
            x += scaled.kern(p, id);
        }
        glyphs.push(id.with_scale_and_position(px, point(x, ascent)));
        x += scaled.h_advance(id);
        prev = Some(id);
    }
    Line {
        glyphs,
        width: x,
        height: ascent - scaled.descent(),
    }
}

/// Pixel box of a single line of `text` at `px` pixels per em.
pub fn measure_text(font: &FontArc, text: &str, px: f32) -> Size {
    let line = layout_line(font, text, px);
    Size::new(line.width.ceil().max(0.0) as u32, line.height.ceil().max(0.0) as u32)
}

/// Rasterize one line of text into a tightly sized transparent bitmap.
pub fn render_text(font: &FontArc, text: &str, px: f32, color: Color) -> Option<RgbaImage> {
    if text.trim().is_empty() || !(px > 0.0) {
        return None;
    }
    let line = layout_line(font, text, px);
    let (w, h) = (line.width.ceil() as u32, line.height.ceil() as u32);
    if w == 0 || h == 0 {
        return None;
    }

    let mut coverage = vec![0f32; (w * h) as usize];
    for glyph in line.glyphs {
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, c| {
            let x = bounds.min.x as i64 + i64::from(gx);
            let y = bounds.min.y as i64 + i64::from(gy);
            if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                let cell = &mut coverage[(y as u32 * w + x as u32) as usize];
                *cell = (*cell + c).min(1.0);
            }
        });
    }

    Some(RgbaImage::from_fn(w, h, |x, y| {
        let c = coverage[(y * w + x) as usize];
        let a = (c * f32::from(color.a)).round() as u8;
        image::Rgba([color.r, color.g, color.b, a])
    }))
}
