//! Pure Rust I/O backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` with format sniffing |
//! | Identity | SHA-256 of the file bytes (`sha2`), see [`ImageId`] |
//! | EXIF read | `kamadak-exif` + XMP via `quick-xml`, see [`crate::metadata`] |
//! | Encode | `image` encoders; JPEG flattened onto white first |
//! | EXIF write | `little_exif` on the written file |

use super::backend::{BackendError, ImageBackend};
use super::canvas::flatten_onto;
use crate::cache::{ImageId, SourceImage};
use crate::metadata::{ExifWriteSet, FlatMetadata, Rational};
use crate::types::Color;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, ImageReader, RgbaImage};
use little_exif::exif_tag::ExifTag;
use little_exif::metadata::Metadata;
use little_exif::rational::uR64;
use std::io::{BufWriter, Cursor};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// JPEG quality for exported composites.
pub const JPEG_QUALITY: u8 = 95;

/// Extensions whose decoders and encoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// Output format for a file extension, if the encoder is available.
pub fn output_format_for(ext: &str) -> Option<ImageFormat> {
    PHOTO_CANDIDATES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, fmt)| *fmt)
        .filter(|fmt| fmt.writing_enabled())
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode(image: &RgbaImage, path: &Path, format: ImageFormat) -> Result<(), BackendError> {
    let encode_err =
        |e: image::ImageError| BackendError::ProcessingFailed(format!("Failed to encode {}: {e}", path.display()));
    match format {
        ImageFormat::Jpeg => {
            let flat = flatten_onto(image, Color::WHITE);
            let file = std::fs::File::create(path)?;
            let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
            flat.write_with_encoder(encoder).map_err(encode_err)
        }
        other => image.save_with_format(path, other).map_err(encode_err),
    }
}

fn exif_metadata(set: &ExifWriteSet) -> Metadata {
    let rational = |r: Rational| {
        vec![uR64 {
            nominator: r.num,
            denominator: r.den,
        }]
    };
    let mut meta = Metadata::new();
    if let Some(make) = &set.image.make {
        meta.set_tag(ExifTag::Make(make.clone()));
    }
    if let Some(model) = &set.image.model {
        meta.set_tag(ExifTag::Model(model.clone()));
    }
    if let Some(f) = set.exif.f_number {
        meta.set_tag(ExifTag::FNumber(rational(f)));
    }
    if let Some(t) = set.exif.exposure_time {
        meta.set_tag(ExifTag::ExposureTime(rational(t)));
    }
    if let Some(fl) = set.exif.focal_length {
        meta.set_tag(ExifTag::FocalLength(rational(fl)));
    }
    if let Some(iso) = set.exif.iso {
        meta.set_tag(ExifTag::ISO(vec![iso]));
    }
    meta
}

/// Attach EXIF to an already written file. Failures are logged, the image stays.
fn attach_exif(path: &Path, set: &ExifWriteSet) {
    let meta = exif_metadata(set);
    // little_exif can panic on containers it does not fully understand
    match panic::catch_unwind(AssertUnwindSafe(|| meta.write_to_file(path))) {
        Ok(Ok(())) => debug!("wrote EXIF to {}", path.display()),
        Ok(Err(e)) => warn!("could not write EXIF to {}: {e}", path.display()),
        Err(_) => warn!("EXIF writer panicked on {}; image kept without metadata", path.display()),
    }
}

impl ImageBackend for RustBackend {
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
        let bytes = std::fs::read(path)?;
        let id = ImageId::from_bytes(&bytes);
        let decoded = ImageReader::new(Cursor::new(&bytes))
            .with_guessed_format()?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
            })?;
        Ok(SourceImage::new(id, decoded.to_rgba8()))
    }

    fn read_metadata(&self, path: &Path) -> FlatMetadata {
        crate::metadata::read_metadata(path)
    }

    fn save(
        &self,
        image: &RgbaImage,
        path: &Path,
        exif: Option<&ExifWriteSet>,
    ) -> Result<(), BackendError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let format = output_format_for(ext).ok_or_else(|| {
            BackendError::ProcessingFailed(format!("Unsupported output format: {ext}"))
        })?;
        encode(image, path, format)?;
        if let Some(set) = exif {
            attach_exif(path, set);
        }
        Ok(())
    }
}
