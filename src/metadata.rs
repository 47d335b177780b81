//! Camera metadata: reading, watermark text and write-back.
//!
//! Metadata travels through the engine as a [`FlatMetadata`] map with a small
//! set of well-known keys ([`keys`]). Missing keys are normal: every consumer
//! degrades by omitting what is absent.
//!
//! ## Reading
//!
//! [`read_metadata`] is best-effort and never fails as a whole:
//!
//! 1. EXIF via `kamadak-exif` (JPEG, TIFF, PNG, WebP containers).
//! 2. XMP packet, found by scanning the first [`XMP_SCAN_LIMIT`] bytes for
//!    `<x:xmpmeta>`. XMP is what editing software rewrites, so its values
//!    override the EXIF ones.
//!
//! Values are normalized on read: `FNumber` to one decimal (`"2.8"`),
//! `FocalLength` to whole millimetres (`"50"`), `ExposureTime` to `"1/250"`
//! for fractions of a second or a four-decimal number otherwise.
//!
//! ## Writing
//!
//! [`build_write_metadata`] turns the flat map back into a nested
//! [`ExifWriteSet`] for the encoder. Each field is parsed on its own; a value
//! that does not parse is dropped without affecting the others.

use crate::config::ExifFields;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Well-known metadata keys.
pub mod keys {
    pub const MAKE: &str = "Make";
    pub const MODEL: &str = "Model";
    pub const F_NUMBER: &str = "FNumber";
    pub const EXPOSURE_TIME: &str = "ExposureTime";
    pub const FOCAL_LENGTH: &str = "FocalLength";
    pub const ISO: &str = "ISO";
}

/// Separator between tokens of EXIF-derived watermark text.
pub const TEXT_SEPARATOR: &str = "  ";

/// How far into a file to look for an XMP packet.
pub const XMP_SCAN_LIMIT: u64 = 200 * 1024;

/// Flat string map of camera metadata. Empty values are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatMetadata(BTreeMap<String, String>);

impl FlatMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trimmed value; blank values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        let value = value.as_ref().trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if !value.is_empty() {
            self.0.insert(key.into(), value.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn make(&self) -> Option<&str> {
        self.get(keys::MAKE)
    }

    /// Overlay `other` on top of `self`; its values win.
    pub fn merge(&mut self, other: FlatMetadata) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for FlatMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = FlatMetadata::new();
        for (k, v) in iter {
            meta.insert(k, v);
        }
        meta
    }
}

// ============================================================================
// Watermark text
// ============================================================================

/// Build the EXIF watermark line.
///
/// Order is fixed (Model, FocalLength, FNumber, ExposureTime, ISO) no matter
/// how the map was filled. Disabled or missing fields are skipped. Returns
/// `None` when nothing is left.
///
/// ```
/// # use simple_frame::metadata::{FlatMetadata, exif_text};
/// # use simple_frame::config::ExifFields;
/// let meta: FlatMetadata = [("ISO", "100"), ("Model", "X100V"), ("FNumber", "2.0")]
///     .into_iter()
///     .collect();
/// assert_eq!(
///     exif_text(&meta, &ExifFields::default()).as_deref(),
///     Some("X100V  f/2.0  ISO 100"),
/// );
/// ```
pub fn exif_text(meta: &FlatMetadata, fields: &ExifFields) -> Option<String> {
    let tokens: [(bool, &str, fn(&str) -> String); 5] = [
        (fields.model, keys::MODEL, |v| v.to_string()),
        (fields.focal_length, keys::FOCAL_LENGTH, |v| format!("{v}mm")),
        (fields.f_number, keys::F_NUMBER, |v| format!("f/{v}")),
        (fields.exposure_time, keys::EXPOSURE_TIME, |v| format!("{v}s")),
        (fields.iso, keys::ISO, |v| format!("ISO {v}")),
    ];
    let parts: Vec<String> = tokens
        .iter()
        .filter(|(enabled, _, _)| *enabled)
        .filter_map(|(_, key, fmt)| meta.get(key).map(fmt))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(TEXT_SEPARATOR))
    }
}

// ============================================================================
// Write-back
// ============================================================================

/// Unsigned EXIF rational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    /// Reduced rational for a positive decimal, to four decimal places.
    fn from_decimal(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let num = (value * 10_000.0).round();
        if num < 1.0 || num > f64::from(u32::MAX) {
            return None;
        }
        Some(Self::reduced(num as u32, 10_000))
    }

    fn reduced(num: u32, den: u32) -> Self {
        let g = gcd(num, den).max(1);
        Self {
            num: num / g,
            den: den / g,
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// IFD0 fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageIfd {
    pub make: Option<String>,
    pub model: Option<String>,
}

/// Exif sub-IFD fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifIfd {
    pub f_number: Option<Rational>,
    pub exposure_time: Option<Rational>,
    pub focal_length: Option<Rational>,
    pub iso: Option<u16>,
}

/// Nested metadata structure written into exported files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifWriteSet {
    pub image: ImageIfd,
    pub exif: ExifIfd,
}

impl ExifWriteSet {
    pub fn is_empty(&self) -> bool {
        *self == ExifWriteSet::default()
    }
}

/// Reconstruct the nested write structure from a flat map.
///
/// Only fields that parse are emitted. Returns `None` when nothing survives.
pub fn build_write_metadata(flat: &FlatMetadata) -> Option<ExifWriteSet> {
    let set = ExifWriteSet {
        image: ImageIfd {
            make: flat.get(keys::MAKE).map(str::to_string),
            model: flat.get(keys::MODEL).map(str::to_string),
        },
        exif: ExifIfd {
            f_number: flat.get(keys::F_NUMBER).and_then(parse_f_number),
            exposure_time: flat.get(keys::EXPOSURE_TIME).and_then(parse_exposure_time),
            focal_length: flat.get(keys::FOCAL_LENGTH).and_then(parse_focal_length),
            iso: flat.get(keys::ISO).and_then(parse_iso),
        },
    };
    if set.is_empty() { None } else { Some(set) }
}

/// `"1/250"`, `"1/250s"`, `"0.0040"`, `"2"` → rational seconds.
fn parse_exposure_time(value: &str) -> Option<Rational> {
    let cleaned = value
        .trim()
        .trim_end_matches(" sec")
        .trim_end_matches('s')
        .trim();
    if let Some((num, den)) = cleaned.split_once('/') {
        let num = num.trim().parse::<u32>().ok()?;
        let den = den.trim().parse::<u32>().ok()?;
        if num == 0 || den == 0 {
            return None;
        }
        return Some(Rational { num, den });
    }
    Rational::from_decimal(cleaned.parse::<f64>().ok()?)
}

/// `"2.8"`, `"f/2.8"`, `"28/10"` → rational f-number.
fn parse_f_number(value: &str) -> Option<Rational> {
    let cleaned = value
        .trim()
        .trim_start_matches("f/")
        .trim_start_matches("F/")
        .trim();
    Rational::from_decimal(parse_number(cleaned)?)
}

/// `"50"`, `"50mm"`, `"50 mm"` → rational millimetres.
fn parse_focal_length(value: &str) -> Option<Rational> {
    let cleaned = value
        .trim()
        .trim_end_matches("mm")
        .trim();
    Rational::from_decimal(parse_number(cleaned)?)
}

/// `"400"`, `"ISO 400"`, `"400, 400"` → 400.
fn parse_iso(value: &str) -> Option<u16> {
    let cleaned = value.trim().trim_start_matches("ISO").trim();
    let first = cleaned.split([',', ' ']).next()?;
    first.parse::<u16>().ok().filter(|&iso| iso > 0)
}

/// Plain decimal or `num/den` fraction.
fn parse_number(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => value.parse::<f64>().ok(),
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read camera metadata from an image file. Never fails: unreadable files
/// and missing tags just produce fewer keys.
pub fn read_metadata(path: &Path) -> FlatMetadata {
    let mut meta = read_exif(path);
    if let Some(xmp) = read_xmp(path) {
        meta.merge(xmp);
    }
    debug!("metadata for {}: {} fields", path.display(), meta.len());
    meta
}

fn read_exif(path: &Path) -> FlatMetadata {
    let mut meta = FlatMetadata::new();
    let Ok(file) = File::open(path) else {
        return meta;
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        return meta;
    };
    let field = |tag| exif.get_field(tag, exif::In::PRIMARY).map(|f| &f.value);

    if let Some(make) = field(exif::Tag::Make).and_then(ascii) {
        meta.insert(keys::MAKE, make);
    }
    if let Some(model) = field(exif::Tag::Model).and_then(ascii) {
        meta.insert(keys::MODEL, model);
    }
    if let Some((num, den)) = field(exif::Tag::FNumber).and_then(rational) {
        meta.insert(keys::F_NUMBER, format!("{:.1}", f64::from(num) / f64::from(den)));
    }
    if let Some((num, den)) = field(exif::Tag::FocalLength).and_then(rational) {
        meta.insert(keys::FOCAL_LENGTH, (num / den).to_string());
    }
    if let Some(iso) = field(exif::Tag::PhotographicSensitivity).and_then(|v| v.get_uint(0)) {
        meta.insert(keys::ISO, iso.to_string());
    }
    if let Some((num, den)) = field(exif::Tag::ExposureTime).and_then(rational) {
        meta.insert(keys::EXPOSURE_TIME, format_exposure(num, den));
    }
    meta
}

fn ascii(value: &exif::Value) -> Option<String> {
    match value {
        exif::Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn rational(value: &exif::Value) -> Option<(u32, u32)> {
    match value {
        exif::Value::Rational(values) => values
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| (r.num, r.denom)),
        _ => None,
    }
}

fn format_exposure(num: u32, den: u32) -> String {
    if num == 1 && den > 1 {
        format!("1/{den}")
    } else {
        format!("{:.4}", f64::from(num) / f64::from(den))
    }
}

fn read_xmp(path: &Path) -> Option<FlatMetadata> {
    let file = File::open(path).ok()?;
    let mut head = Vec::new();
    file.take(XMP_SCAN_LIMIT).read_to_end(&mut head).ok()?;
    let packet = find_xmp_packet(&head)?;
    let meta = parse_xmp(packet);
    (!meta.is_empty()).then_some(meta)
}

/// Locate the `<x:xmpmeta>…</x:xmpmeta>` packet in a byte buffer.
pub fn find_xmp_packet(bytes: &[u8]) -> Option<&[u8]> {
    const START: &[u8] = b"<x:xmpmeta";
    const END: &[u8] = b"</x:xmpmeta>";
    let start = find(bytes, START)?;
    let end = start + find(&bytes[start..], END)? + END.len();
    Some(&bytes[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Map an XMP property name to a flat key.
fn xmp_key(name: &[u8]) -> Option<&'static str> {
    match name {
        b"tiff:Make" => Some(keys::MAKE),
        b"tiff:Model" => Some(keys::MODEL),
        b"exif:FNumber" => Some(keys::F_NUMBER),
        b"exif:ExposureTime" => Some(keys::EXPOSURE_TIME),
        b"exif:FocalLength" => Some(keys::FOCAL_LENGTH),
        b"exif:ISOSpeedRatings" | b"exifEX:PhotographicSensitivity" => Some(keys::ISO),
        _ => None,
    }
}

/// Normalize an XMP value the same way EXIF values are normalized.
fn xmp_value(key: &str, raw: &str) -> Option<String> {
    let raw = raw.trim();
    match key {
        k if k == keys::F_NUMBER => parse_number(raw).map(|v| format!("{v:.1}")),
        k if k == keys::FOCAL_LENGTH => parse_number(raw).map(|v| (v.trunc() as u32).to_string()),
        _ => Some(raw.to_string()),
    }
}

/// Extract the fields we care about from an XMP packet.
///
/// Properties may appear either as attributes of `rdf:Description` or as
/// child elements; `exif:ISOSpeedRatings` holds its value in `rdf:Seq/rdf:li`.
pub fn parse_xmp(xml: &[u8]) -> FlatMetadata {
    let mut meta = FlatMetadata::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                collect_attributes(e, &mut meta);
                if let Some(key) = xmp_key(e.name().as_ref()) {
                    current = Some(key);
                }
            }
            Ok(Event::Empty(ref e)) => collect_attributes(e, &mut meta),
            Ok(Event::Text(ref e)) => {
                if let (Some(key), Ok(text)) = (current, e.unescape()) {
                    if let Some(value) = xmp_value(key, &text) {
                        meta.insert(key, value);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if xmp_key(e.name().as_ref()).is_some() {
                    current = None;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    meta
}

fn collect_attributes(e: &BytesStart<'_>, meta: &mut FlatMetadata) {
    for attr in e.attributes().flatten() {
        let Some(key) = xmp_key(attr.key.as_ref()) else {
            continue;
        };
        if let Some(value) = attr
            .unescape_value()
            .ok()
            .and_then(|raw| xmp_value(key, &raw))
        {
            meta.insert(key, value);
        }
    }
}
