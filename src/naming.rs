//! Output file naming for exported composites.
//!
//! Every export lands next to its siblings in one output directory:
//!
//! ```text
//! ~/Pictures/2024/DSC_0042.JPG  →  out/DSC_0042_framed.JPG
//! ~/scans/roll-7.tif            →  out/roll-7_framed.tif
//! ~/phone/IMG_1001.heic         →  out/IMG_1001_framed.png   (no HEIC encoder)
//! ```
//!
//! The name depends only on the source file name, so two sources with the
//! same stem in different directories map to the same destination. The
//! later write wins; [`find_collisions`] lets a caller warn up front.

use crate::imaging::output_format_for;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Appended to the source stem.
pub const FRAMED_SUFFIX: &str = "_framed";

/// Extension used when the source's own format cannot be written.
pub const FALLBACK_EXTENSION: &str = "png";

/// Destination path for one exported source.
pub fn destination_for(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| output_format_for(e).is_some())
        .unwrap_or(FALLBACK_EXTENSION);
    output_dir.join(format!("{stem}{FRAMED_SUFFIX}.{ext}"))
}

/// Destinations that more than one source maps to, with those sources in
/// input order. Sorted by destination.
pub fn find_collisions(sources: &[PathBuf], output_dir: &Path) -> Vec<(PathBuf, Vec<PathBuf>)> {
    let mut by_dest: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for source in sources {
        by_dest
            .entry(destination_for(source, output_dir))
            .or_default()
            .push(source.clone());
    }
    by_dest
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .collect()
}
