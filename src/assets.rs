//! Logo and font asset lookup.
//!
//! Assets are addressed by *key*, a snake_case form of the file stem (logos)
//! or family name (fonts) produced by [`asset_key`]. A config can then say
//! `logo = { source = "library", key = "leica" }` without caring whether the
//! file is `Leica.png` or `leica.webp`.
//!
//! Two logo libraries exist: the application's built-in logos and the user's
//! uploaded logos. User fonts live next to user logos:
//!
//! ```text
//! ~/.simple-frame/
//! ├── logos/
//! │   └── my-studio.png      key: my_studio
//! └── fonts/
//!     └── Inter-Regular.ttf
//! ```
//!
//! The engine only depends on the [`AssetResolver`] trait; [`AssetDirs`] is
//! the directory-backed implementation used by the CLI.

use crate::config::AssetsConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Logo file extensions the watermark can decode.
pub const LOGO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Font file extensions loaded from the user font directory.
pub const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// Which logo collection a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoLibrary {
    /// Shipped with the application (includes manufacturer logos).
    App,
    /// Uploaded by the user.
    User,
}

/// Resolves asset keys to files. Shared by all export workers.
pub trait AssetResolver: Send + Sync {
    /// Path of the logo with this key, if such a file exists.
    fn resolve_logo(&self, library: LogoLibrary, key: &str) -> Option<PathBuf>;

    /// Every user-uploaded font file.
    fn user_font_files(&self) -> Vec<PathBuf>;
}

/// Directory-backed asset store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDirs {
    pub app_logos: PathBuf,
    pub user_logos: PathBuf,
    pub user_fonts: PathBuf,
}

impl AssetDirs {
    pub fn new(app_logos: impl Into<PathBuf>, user_root: &Path) -> Self {
        Self {
            app_logos: app_logos.into(),
            user_logos: user_root.join("logos"),
            user_fonts: user_root.join("fonts"),
        }
    }

    pub fn from_config(config: &AssetsConfig) -> Self {
        Self::new(config.logos_dir.clone(), &config.resolved_user_dir())
    }

    /// Keys of all logos in a library, sorted.
    pub fn logo_keys(&self, library: LogoLibrary) -> Vec<String> {
        let mut keys: Vec<String> = files_with_extensions(self.logo_dir(library), LOGO_EXTENSIONS)
            .iter()
            .filter_map(|p| p.file_stem())
            .map(|stem| asset_key(&stem.to_string_lossy()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    fn logo_dir(&self, library: LogoLibrary) -> &Path {
        match library {
            LogoLibrary::App => &self.app_logos,
            LogoLibrary::User => &self.user_logos,
        }
    }
}

impl AssetResolver for AssetDirs {
    fn resolve_logo(&self, library: LogoLibrary, key: &str) -> Option<PathBuf> {
        let wanted = asset_key(key);
        files_with_extensions(self.logo_dir(library), LOGO_EXTENSIONS)
            .into_iter()
            .find(|p| {
                p.file_stem()
                    .is_some_and(|stem| asset_key(&stem.to_string_lossy()) == wanted)
            })
    }

    fn user_font_files(&self) -> Vec<PathBuf> {
        files_with_extensions(&self.user_fonts, FONT_EXTENSIONS)
    }
}

/// Regular files in `dir` with one of `extensions` (case-insensitive),
/// sorted by path. A missing directory is simply empty.
fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        })
        .collect();
    files.sort();
    files
}

/// Convert a display name into a snake_case asset key.
///
/// CamelCase boundaries become `_`, runs of whitespace and dashes become a
/// single `_`, anything that is not alphanumeric is dropped, and the result
/// is lowercased.
///
/// ```
/// # use simple_frame::assets::asset_key;
/// assert_eq!(asset_key("HelveticaNeue-Bold"), "helvetica_neue_bold");
/// assert_eq!(asset_key("Open Sans"), "open_sans");
/// assert_eq!(asset_key("ILCE-7M4"), "ilce_7_m4");
/// ```
pub fn asset_key(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut spaced = String::with_capacity(chars.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = prev.is_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_uppercase() && next_lower);
            if boundary {
                spaced.push('_');
            }
        }
        spaced.push(c);
    }

    let mut key = String::with_capacity(spaced.len());
    for c in spaced.chars() {
        let c = if c.is_whitespace() || c == '-' { '_' } else { c };
        if !(c.is_alphanumeric() || c == '_') {
            continue;
        }
        if c == '_' && (key.is_empty() || key.ends_with('_')) {
            continue;
        }
        key.extend(c.to_lowercase());
    }
    key.trim_end_matches('_').to_string()
}
