//! Image identity and the preview blur cache.
//!
//! # Design
//!
//! Blur-extended backgrounds are the most expensive part of a preview render
//! and depend only on (image, blur radius, target size). The interactive
//! preview re-renders on every color or shadow toggle, so those results are
//! cached here.
//!
//! ## Cache keys
//!
//! Images are identified by content: [`ImageId`] is the SHA-256 of the source
//! file bytes (or of the decoded pixels for in-memory images). Renaming a
//! file does not invalidate anything, replacing its content does.
//!
//! ## Eviction
//!
//! The cache only ever holds results for one image. Looking up a key for a
//! different image clears it first. It is additionally bounded by
//! [`MAX_ENTRIES`] so dragging the blur slider cannot grow it without limit.
//!
//! The cache is owned by a single [`PreviewSession`](crate::compose::PreviewSession)
//! and never shared across threads; the export pipeline always renders fresh.

use crate::types::Size;
use image::RgbaImage;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Upper bound on cached blur results for the current image.
pub const MAX_ENTRIES: usize = 16;

/// Content identity of a source image (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// SHA-256 of a file's contents.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(&bytes))
    }

    /// Identity of an already-decoded bitmap: dimensions plus pixels.
    pub fn of_pixels(image: &RgbaImage) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(image.width().to_le_bytes());
        hasher.update(image.height().to_le_bytes());
        hasher.update(image.as_raw());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// An immutable decoded source photo.
///
/// Pixels are shared so cloning a `SourceImage` is cheap; the engine only
/// ever reads them.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub id: ImageId,
    pub pixels: Arc<RgbaImage>,
}

impl SourceImage {
    pub fn new(id: ImageId, pixels: RgbaImage) -> Self {
        Self {
            id,
            pixels: Arc::new(pixels),
        }
    }

    /// Wrap an in-memory bitmap, identifying it by its pixels.
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self::new(ImageId::of_pixels(&pixels), pixels)
    }

    pub fn size(&self) -> Size {
        Size::new(self.pixels.width(), self.pixels.height())
    }
}

/// Key of one blurred background.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlurKey {
    pub image: ImageId,
    /// `f32::to_bits` of the blur sigma, so the key has exact value equality.
    radius_bits: u32,
    pub size: Size,
}

impl BlurKey {
    pub fn new(image: ImageId, radius: f32, size: Size) -> Self {
        Self {
            image,
            radius_bits: radius.to_bits(),
            size,
        }
    }

    pub fn radius(&self) -> f32 {
        f32::from_bits(self.radius_bits)
    }
}

/// Blurred backgrounds for the image currently being previewed.
#[derive(Debug, Default)]
pub struct BlurCache {
    current: Option<ImageId>,
    entries: HashMap<BlurKey, Arc<RgbaImage>>,
    hits: u64,
    misses: u64,
}

impl BlurCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for `key`, computing it with `compute` on a
    /// miss. A `None` from `compute` is not cached.
    pub fn get_or_insert_with<F>(&mut self, key: BlurKey, compute: F) -> Option<Arc<RgbaImage>>
    where
        F: FnOnce() -> Option<RgbaImage>,
    {
        if self.current.as_ref() != Some(&key.image) {
            self.entries.clear();
            self.current = Some(key.image.clone());
        }
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return Some(Arc::clone(hit));
        }
        self.misses += 1;
        let value = Arc::new(compute()?);
        if self.entries.len() >= MAX_ENTRIES {
            self.entries.clear();
        }
        self.entries.insert(key, Arc::clone(&value));
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.current = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
