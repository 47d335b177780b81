//! Image I/O backend trait and shared error type.
//!
//! The [`ImageBackend`] trait defines the three operations the export
//! pipeline needs from the outside world: decode a source file, read its
//! camera metadata, and encode a finished composite with metadata attached.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests use the
//! `MockBackend` in this module, which records every call and can be told to
//! fail or block.

use crate::cache::SourceImage;
use crate::metadata::{ExifWriteSet, FlatMetadata};
use image::RgbaImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Trait for image I/O backends.
///
/// Implementations are shared by every export worker, hence `Send + Sync`.
pub trait ImageBackend: Send + Sync {
    /// Decode a source image and compute its content identity.
    fn load(&self, path: &Path) -> Result<SourceImage, BackendError>;

    /// Best-effort camera metadata. Never an error: missing data is missing keys.
    fn read_metadata(&self, path: &Path) -> FlatMetadata;

    /// Encode `image` to `path` (format from the extension) and attach `exif`
    /// when given. Failing to attach metadata is not an error.
    fn save(
        &self,
        image: &RgbaImage,
        path: &Path,
        exif: Option<&ExifWriteSet>,
    ) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::cache::ImageId;
    use std::collections::HashSet;
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    /// Mock backend that records operations without touching the disk.
    /// Uses Mutex (not RefCell) so it is Sync and can be shared by workers.
    pub struct MockBackend {
        pub image_size: (u32, u32),
        pub metadata: FlatMetadata,
        /// File names whose `save` fails.
        pub fail_save: HashSet<String>,
        pub operations: Mutex<Vec<RecordedOp>>,
        gate: Option<Gate>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Load(String),
        ReadMetadata(String),
        Save {
            path: String,
            width: u32,
            height: u32,
            with_exif: bool,
        },
    }

    /// Blocks `load` until opened, counting how many loads are waiting.
    struct Gate {
        state: Mutex<GateState>,
        changed: Condvar,
    }

    #[derive(Default)]
    struct GateState {
        open: bool,
        arrived: usize,
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self {
                image_size: (40, 30),
                metadata: FlatMetadata::new(),
                fail_save: HashSet::new(),
                operations: Mutex::new(Vec::new()),
                gate: None,
            }
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(names: &[&str]) -> Self {
            Self {
                fail_save: names.iter().map(|n| n.to_string()).collect(),
                ..Self::default()
            }
        }

        /// Every `load` blocks until [`open_gate`](Self::open_gate).
        pub fn gated() -> Self {
            Self {
                gate: Some(Gate {
                    state: Mutex::new(GateState::default()),
                    changed: Condvar::new(),
                }),
                ..Self::default()
            }
        }

        pub fn open_gate(&self) {
            if let Some(gate) = &self.gate {
                gate.state.lock().unwrap().open = true;
                gate.changed.notify_all();
            }
        }

        /// Wait until `n` loads are blocked at the gate.
        pub fn wait_for_arrivals(&self, n: usize) -> bool {
            let Some(gate) = &self.gate else {
                return false;
            };
            let deadline = Instant::now() + Duration::from_secs(10);
            let mut state = gate.state.lock().unwrap();
            while state.arrived < n {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                state = gate.changed.wait_timeout(state, deadline - now).unwrap().0;
            }
            true
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn load_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Load(_)))
                .count()
        }

        pub fn saved_paths(&self) -> Vec<String> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Save { path, .. } => Some(path),
                    _ => None,
                })
                .collect()
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    impl ImageBackend for MockBackend {
        fn load(&self, path: &Path) -> Result<SourceImage, BackendError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Load(path.to_string_lossy().to_string()));

            if let Some(gate) = &self.gate {
                let mut state = gate.state.lock().unwrap();
                state.arrived += 1;
                gate.changed.notify_all();
                while !state.open {
                    state = gate.changed.wait(state).unwrap();
                }
            }

            let (w, h) = self.image_size;
            let pixels = RgbaImage::from_fn(w, h, |x, y| {
                image::Rgba([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 90, 255])
            });
            Ok(SourceImage::new(
                ImageId::from_bytes(path.to_string_lossy().as_bytes()),
                pixels,
            ))
        }

        fn read_metadata(&self, path: &Path) -> FlatMetadata {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::ReadMetadata(path.to_string_lossy().to_string()));
            self.metadata.clone()
        }

        fn save(
            &self,
            image: &RgbaImage,
            path: &Path,
            exif: Option<&ExifWriteSet>,
        ) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Save {
                path: path.to_string_lossy().to_string(),
                width: image.width(),
                height: image.height(),
                with_exif: exif.is_some(),
            });
            if self.fail_save.contains(&file_name(path)) {
                return Err(BackendError::ProcessingFailed(format!(
                    "mock encode failure for {}",
                    path.display()
                )));
            }
            Ok(())
        }
    }

    #[test]
    fn mock_records_load_and_save() {
        let backend = MockBackend::new();
        let src = backend.load(Path::new("/in/a.jpg")).unwrap();
        assert_eq!(src.size(), crate::types::Size::new(40, 30));

        backend
            .save(&src.pixels, Path::new("/out/a_framed.jpg"), None)
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], RecordedOp::Load(p) if p == "/in/a.jpg"));
        assert!(matches!(
            &ops[1],
            RecordedOp::Save {
                width: 40,
                height: 30,
                with_exif: false,
                ..
            }
        ));
    }

    #[test]
    fn mock_fails_on_named_file() {
        let backend = MockBackend::failing_on(&["bad_framed.png"]);
        let img = RgbaImage::new(1, 1);
        assert!(backend.save(&img, Path::new("/o/good_framed.png"), None).is_ok());
        assert!(backend.save(&img, Path::new("/o/bad_framed.png"), None).is_err());
    }

    #[test]
    fn mock_gate_blocks_until_opened() {
        let backend = std::sync::Arc::new(MockBackend::gated());
        let worker = {
            let backend = backend.clone();
            std::thread::spawn(move || backend.load(Path::new("/in/x.jpg")).is_ok())
        };
        assert!(backend.wait_for_arrivals(1));
        backend.open_gate();
        assert!(worker.join().unwrap());
    }
}
