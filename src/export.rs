//! Batch export: render many images at full resolution on a worker pool.
//!
//! ## Job lifecycle
//!
//! ```text
//! Idle ──start_export──▶ Running ──┬──▶ Completed   (completed == total)
//!                                  ├──▶ Cancelled   (cancel() called)
//!                                  └──▶ Failed      (first task error)
//! ```
//!
//! [`start_export`] returns immediately. A dispatcher thread feeds tasks to a
//! dedicated rayon pool of `workers` threads, launching a task only when a
//! worker slot is free. Before every launch it checks the cancellation flag
//! and the job state, so:
//!
//! - `cancel()` stops new launches and moves the job to `Cancelled` at once.
//!   Tasks already running are never interrupted and finish in the
//!   background; [`ExportJob::join`] waits for them.
//! - The first task error is reported with its path and moves the job to
//!   `Failed`. Nothing is launched afterwards (fail-fast).
//!
//! ## Progress
//!
//! The completion counter is a mutex-guarded integer. Incrementing it and
//! sending the matching [`ExportEvent::Progress`] happen in one critical
//! section, so receivers see `completed` go 1, 2, ... N without gaps or
//! repeats even though tasks finish in any order.
//!
//! ## Per-task work
//!
//! Each task decodes its source, reads its metadata, renders with the shared
//! [`Compositor`] at native resolution, rebuilds the EXIF write set from the
//! flat metadata and writes `<stem>_framed.<ext>` into the output directory.
//! The configuration is an immutable snapshot taken at start.

use crate::compose::{Compositor, RenderTarget};
use crate::config::{FrameConfig, WatermarkConfig};
use crate::imaging::{BackendError, ImageBackend};
use crate::metadata::build_write_metadata;
use crate::naming::destination_for;
use crate::types::Size;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Backend(#[from] BackendError),
    #[error("Nothing to render for {}", .0.display())]
    NoRender(PathBuf),
    #[error("Worker pool error: {0}")]
    ThreadPool(String),
    #[error("Export task panicked on {}", .0.display())]
    Panicked(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Events sent to the caller while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Started {
        total: usize,
        workers: usize,
    },
    /// One more image was written. `current` is the source file name.
    Progress {
        completed: usize,
        total: usize,
        current: String,
    },
    /// A task failed. The job is failing with it.
    Error {
        message: String,
        path: PathBuf,
    },
    /// The job reached a terminal state.
    Finished {
        state: JobState,
        completed: usize,
        total: usize,
    },
}

/// Everything a job needs, captured once.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub paths: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub frame: FrameConfig,
    pub watermark: WatermarkConfig,
    /// Container the blur radius was tuned against.
    pub preview_container: Size,
    /// Pool size, usually [`effective_workers`](crate::config::effective_workers).
    pub workers: usize,
}

struct JobShared {
    state: Mutex<JobState>,
    state_changed: Condvar,
    cancelled: AtomicBool,
    completed: Mutex<usize>,
    total: usize,
    events: Option<Sender<ExportEvent>>,
    backend: Arc<dyn ImageBackend>,
    compositor: Arc<Compositor>,
    output_dir: PathBuf,
    frame: FrameConfig,
    watermark: WatermarkConfig,
    preview_container: Size,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobShared {
    fn send(&self, event: ExportEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = tx.send(event);
        }
    }

    fn state(&self) -> JobState {
        *lock(&self.state)
    }

    /// Move from `Running` to a terminal state. Any later transition is ignored.
    fn finish(&self, to: JobState, completed: usize) -> bool {
        let mut state = lock(&self.state);
        self.finish_locked(&mut state, to, completed)
    }

    fn finish_locked(&self, state: &mut JobState, to: JobState, completed: usize) -> bool {
        if *state != JobState::Running {
            return false;
        }
        *state = to;
        info!("export {to}: {completed}/{} written", self.total);
        self.send(ExportEvent::Finished {
            state: to,
            completed,
            total: self.total,
        });
        self.state_changed.notify_all();
        true
    }

    /// Report `error` and fail the job, only if it is still running. The
    /// check, the `Error` event and the transition share one critical
    /// section so concurrent failures report once.
    fn fail(&self, path: &Path, error: &ExportError) {
        // `completed` before `state`: the success path locks in that order
        let completed = *lock(&self.completed);
        let mut state = lock(&self.state);
        if *state != JobState::Running {
            return;
        }
        self.send(ExportEvent::Error {
            message: error.to_string(),
            path: path.to_path_buf(),
        });
        self.finish_locked(&mut state, JobState::Failed, completed);
    }

    fn may_launch(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst) && self.state() == JobState::Running
    }

    fn run_task(&self, path: &Path) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.export_one(path)))
            .unwrap_or_else(|_| Err(ExportError::Panicked(path.to_path_buf())));
        match result {
            Ok(dest) => {
                debug!("wrote {}", dest.display());
                let current = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let mut completed = lock(&self.completed);
                *completed += 1;
                let n = *completed;
                self.send(ExportEvent::Progress {
                    completed: n,
                    total: self.total,
                    current,
                });
                if n == self.total {
                    self.finish(JobState::Completed, n);
                }
            }
            Err(e) => {
                warn!("export failed for {}: {e}", path.display());
                self.fail(path, &e);
            }
        }
    }

    fn export_one(&self, path: &Path) -> Result<PathBuf, ExportError> {
        let source = self.backend.load(path)?;
        let metadata = self.backend.read_metadata(path);
        let rendered = self
            .compositor
            .render(
                &source,
                &metadata,
                &self.frame,
                &self.watermark,
                RenderTarget::Export {
                    preview_container: self.preview_container,
                },
            )
            .ok_or_else(|| ExportError::NoRender(path.to_path_buf()))?;
        let dest = destination_for(path, &self.output_dir);
        let exif = build_write_metadata(&metadata);
        self.backend.save(&rendered.image, &dest, exif.as_ref())?;
        Ok(dest)
    }
}

/// Returns the worker slot when a task ends, however it ends.
struct SlotGuard(Sender<()>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Handle to a running export.
pub struct ExportJob {
    shared: Arc<JobShared>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ExportJob {
    pub fn state(&self) -> JobState {
        self.shared.state()
    }

    pub fn completed(&self) -> usize {
        *lock(&self.shared.completed)
    }

    pub fn total(&self) -> usize {
        self.shared.total
    }

    /// Stop launching tasks. Running tasks finish in the background.
    pub fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        let completed = self.completed();
        if self.shared.finish(JobState::Cancelled, completed) {
            info!("export cancelled after {completed} images");
        }
    }

    /// Block until the job reaches a terminal state.
    pub fn wait(&self) -> JobState {
        let mut state = lock(&self.shared.state);
        while !state.is_terminal() {
            state = self
                .shared
                .state_changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state
    }

    /// Block until the job is terminal and every launched task has returned.
    pub fn join(mut self) -> JobState {
        let state = self.wait();
        if let Some(handle) = self.dispatcher.take() {
            if handle.join().is_err() {
                warn!("export dispatcher panicked");
            }
        }
        state
    }
}

/// Start exporting `request.paths` and return without waiting.
///
/// Fails only if the output directory cannot be created or the worker pool
/// cannot be started; per-image failures arrive as [`ExportEvent::Error`].
pub fn start_export(
    backend: Arc<dyn ImageBackend>,
    compositor: Arc<Compositor>,
    request: ExportRequest,
    events: Option<Sender<ExportEvent>>,
) -> Result<ExportJob, ExportError> {
    std::fs::create_dir_all(&request.output_dir)?;
    let workers = request.workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("export-{i}"))
        .build()
        .map_err(|e| ExportError::ThreadPool(e.to_string()))?;

    let total = request.paths.len();
    let shared = Arc::new(JobShared {
        state: Mutex::new(JobState::Idle),
        state_changed: Condvar::new(),
        cancelled: AtomicBool::new(false),
        completed: Mutex::new(0),
        total,
        events,
        backend,
        compositor,
        output_dir: request.output_dir,
        frame: request.frame.normalized(),
        watermark: request.watermark.normalized(),
        preview_container: request.preview_container,
    });

    *lock(&shared.state) = JobState::Running;
    info!("exporting {total} images with {workers} workers");
    shared.send(ExportEvent::Started { total, workers });

    if total == 0 {
        shared.finish(JobState::Completed, 0);
        return Ok(ExportJob {
            shared,
            dispatcher: None,
        });
    }

    let dispatch_shared = Arc::clone(&shared);
    let paths = request.paths;
    let dispatcher = std::thread::Builder::new()
        .name("export-dispatch".into())
        .spawn(move || dispatch(dispatch_shared, pool, paths, workers))?;

    Ok(ExportJob {
        shared,
        dispatcher: Some(dispatcher),
    })
}

fn dispatch(shared: Arc<JobShared>, pool: rayon::ThreadPool, paths: Vec<PathBuf>, workers: usize) {
    let (slot_tx, slot_rx) = mpsc::channel();
    for _ in 0..workers {
        let _ = slot_tx.send(());
    }

    let mut launched = 0;
    for path in paths {
        if slot_rx.recv().is_err() || !shared.may_launch() {
            break;
        }
        let slot = SlotGuard(slot_tx.clone());
        let task_shared = Arc::clone(&shared);
        pool.spawn(move || {
            let _slot = slot;
            task_shared.run_task(&path);
        });
        launched += 1;
    }
    debug!("dispatched {launched}/{} tasks", shared.total);

    // Wait for in-flight tasks: the channel closes once every slot guard is gone
    drop(slot_tx);
    while slot_rx.recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetResolver, LogoLibrary};
    use crate::imaging::backend::tests::MockBackend;
    use crate::metadata::FlatMetadata;
    use crate::watermark::FontBook;
    use std::sync::mpsc::Receiver;
    use tempfile::TempDir;

    struct NoAssets;

    impl AssetResolver for NoAssets {
        fn resolve_logo(&self, _: LogoLibrary, _: &str) -> Option<PathBuf> {
            None
        }

        fn user_font_files(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn compositor() -> Arc<Compositor> {
        Arc::new(Compositor::new(Arc::new(NoAssets), Arc::new(FontBook::empty())))
    }

    fn request(out: &Path, n: usize, workers: usize) -> ExportRequest {
        ExportRequest {
            paths: (0..n).map(|i| PathBuf::from(format!("/in/img{i}.jpg"))).collect(),
            output_dir: out.to_path_buf(),
            frame: FrameConfig::default(),
            watermark: WatermarkConfig {
                logo_enabled: false,
                text_enabled: false,
                ..Default::default()
            },
            preview_container: Size::new(20, 20),
            workers,
        }
    }

    fn start(
        backend: &Arc<MockBackend>,
        req: ExportRequest,
    ) -> (ExportJob, Receiver<ExportEvent>) {
        let (tx, rx) = mpsc::channel();
        let job = start_export(
            Arc::clone(backend) as Arc<dyn ImageBackend>,
            compositor(),
            req,
            Some(tx),
        )
        .unwrap();
        (job, rx)
    }

    fn progress_counts(events: &[ExportEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                ExportEvent::Progress { completed, .. } => Some(*completed),
                _ => None,
            })
            .collect()
    }

    fn errors(events: &[ExportEvent]) -> Vec<PathBuf> {
        events
            .iter()
            .filter_map(|e| match e {
                ExportEvent::Error { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // Progress and completion
    // =========================================================================

    #[test]
    fn progress_counts_up_without_gaps() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let (job, rx) = start(&backend, request(tmp.path(), 12, 3));
        assert_eq!(job.join(), JobState::Completed);

        let events: Vec<ExportEvent> = rx.try_iter().collect();
        assert_eq!(progress_counts(&events), (1..=12).collect::<Vec<_>>());
        assert_eq!(
            events.first(),
            Some(&ExportEvent::Started {
                total: 12,
                workers: 3
            })
        );
        assert_eq!(
            events.last(),
            Some(&ExportEvent::Finished {
                state: JobState::Completed,
                completed: 12,
                total: 12
            })
        );
        assert_eq!(backend.load_count(), 12);
    }

    #[test]
    fn writes_framed_names_into_output_dir() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let (job, _rx) = start(&backend, request(tmp.path(), 2, 2));
        job.join();

        let mut saved = backend.saved_paths();
        saved.sort();
        let expected: Vec<String> = ["img0_framed.jpg", "img1_framed.jpg"]
            .iter()
            .map(|n| tmp.path().join(n).to_string_lossy().into_owned())
            .collect();
        assert_eq!(saved, expected);
    }

    #[test]
    fn saves_full_resolution_with_frame() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let (job, _rx) = start(&backend, request(tmp.path(), 1, 1));
        job.join();

        // mock image is 40x30: base 3, top/sides 40% → 1, bottom 100% → 3
        let ops = backend.get_operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            crate::imaging::backend::tests::RecordedOp::Save {
                width: 42,
                height: 34,
                ..
            }
        )));
    }

    #[test]
    fn exif_is_rebuilt_from_metadata() {
        let tmp = TempDir::new().unwrap();
        let mut mock = MockBackend::new();
        mock.metadata = [("Make", "Canon"), ("ISO", "not a number")]
            .into_iter()
            .collect::<FlatMetadata>();
        let backend = Arc::new(mock);
        let (job, _rx) = start(&backend, request(tmp.path(), 1, 1));
        job.join();
        let ops = backend.get_operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            crate::imaging::backend::tests::RecordedOp::Save {
                with_exif: true,
                ..
            }
        )));
    }

    #[test]
    fn empty_job_completes_immediately() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let (job, rx) = start(&backend, request(tmp.path(), 0, 2));
        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.join(), JobState::Completed);
        let events: Vec<ExportEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn start_does_not_block_the_caller() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::gated());
        let (job, _rx) = start(&backend, request(tmp.path(), 4, 2));

        // every load is blocked, yet start_export has returned
        assert!(backend.wait_for_arrivals(2));
        assert_eq!(job.state(), JobState::Running);
        assert_eq!(job.completed(), 0);

        backend.open_gate();
        assert_eq!(job.join(), JobState::Completed);
    }

    // =========================================================================
    // Failure
    // =========================================================================

    #[test]
    fn first_failure_stops_sequential_job() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::failing_on(&["img2_framed.jpg"]));
        let (job, rx) = start(&backend, request(tmp.path(), 10, 1));
        assert_eq!(job.join(), JobState::Failed);

        let events: Vec<ExportEvent> = rx.try_iter().collect();
        assert_eq!(errors(&events), vec![PathBuf::from("/in/img2.jpg")]);
        assert_eq!(progress_counts(&events), vec![1, 2]);
        assert_eq!(backend.load_count(), 3);
    }

    #[test]
    fn failure_with_two_workers_reports_once() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::failing_on(&["img2_framed.jpg"]));
        let (job, rx) = start(&backend, request(tmp.path(), 10, 2));
        assert_eq!(job.wait(), JobState::Failed);
        assert_eq!(job.join(), JobState::Failed);

        let events: Vec<ExportEvent> = rx.try_iter().collect();
        assert_eq!(errors(&events), vec![PathBuf::from("/in/img2.jpg")]);
        assert!(backend.load_count() >= 3);
        assert!(progress_counts(&events).len() <= 9);
        assert!(events.iter().any(|e| matches!(
            e,
            ExportEvent::Finished {
                state: JobState::Failed,
                ..
            }
        )));
    }

    #[test]
    fn simultaneous_failures_report_once() {
        for _ in 0..50 {
            let tmp = TempDir::new().unwrap();
            let mut mock = MockBackend::gated();
            mock.fail_save = ["img0_framed.jpg", "img1_framed.jpg"]
                .iter()
                .map(|n| n.to_string())
                .collect();
            let backend = Arc::new(mock);
            let (job, rx) = start(&backend, request(tmp.path(), 6, 2));

            // Both failing images are in flight before either reaches save
            assert!(backend.wait_for_arrivals(2));
            backend.open_gate();
            assert_eq!(job.join(), JobState::Failed);

            let events: Vec<ExportEvent> = rx.try_iter().collect();
            assert_eq!(errors(&events).len(), 1, "{events:?}");
            let finished = events
                .iter()
                .filter(|e| matches!(e, ExportEvent::Finished { .. }))
                .count();
            assert_eq!(finished, 1);
        }
    }

    #[test]
    fn encode_failure_message_names_destination() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::failing_on(&["img0_framed.jpg"]));
        let (job, rx) = start(&backend, request(tmp.path(), 1, 1));
        assert_eq!(job.join(), JobState::Failed);
        let events: Vec<ExportEvent> = rx.try_iter().collect();
        let message = events.iter().find_map(|e| match e {
            ExportEvent::Error { message, .. } => Some(message.clone()),
            _ => None,
        });
        assert!(message.unwrap().contains("img0_framed.jpg"));
    }

    // =========================================================================
    // Cancellation
    // =========================================================================

    #[test]
    fn cancel_stops_new_launches_but_finishes_running_tasks() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::gated());
        let (job, rx) = start(&backend, request(tmp.path(), 10, 2));

        assert!(backend.wait_for_arrivals(2));
        job.cancel();
        // terminal before the in-flight tasks return
        assert_eq!(job.state(), JobState::Cancelled);
        assert_eq!(job.completed(), 0);

        backend.open_gate();
        let completed = {
            let shared = Arc::clone(&job.shared);
            assert_eq!(job.join(), JobState::Cancelled);
            *lock(&shared.completed)
        };
        assert_eq!(completed, 2);
        assert_eq!(backend.load_count(), 2);

        let events: Vec<ExportEvent> = rx.try_iter().collect();
        assert!(errors(&events).is_empty());
        assert!(events.contains(&ExportEvent::Finished {
            state: JobState::Cancelled,
            completed: 0,
            total: 10
        }));
    }

    #[test]
    fn cancel_after_completion_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let backend = Arc::new(MockBackend::new());
        let (job, _rx) = start(&backend, request(tmp.path(), 3, 2));
        assert_eq!(job.wait(), JobState::Completed);
        job.cancel();
        assert_eq!(job.state(), JobState::Completed);
    }
}
