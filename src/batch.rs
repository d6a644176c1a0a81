//! Batch runner: one long job at a time, off the caller's thread.
//!
//! ## State machine
//!
//! ```text
//!            submit (CAS false→true)
//!   Idle ───────────────────────────▶ Running
//!     ▲                                  │
//!     └──────── worker finishes ─────────┘
//!               (guard dropped)
//! ```
//!
//! A [`BatchRunner`] owns one `AtomicBool`. [`BatchRunner::submit`] flips it
//! with a single compare-exchange; a second submit while the flag is set is
//! rejected with [`ToneError::Busy`] rather than queued. The flag is reset by
//! a drop guard owned by the worker thread, so it returns to Idle even when
//! the job panics.
//!
//! ## Channels
//!
//! The worker reports [`ProgressEvent`]s through a bounded
//! `tokio::sync::mpsc` channel and hands its [`BatchReport`] back through a
//! `tokio::sync::oneshot`. The consumer drains both from its own thread via
//! [`BatchHandle`].

use crate::backend::BackendRegistry;
use crate::config::{ConversionConfig, MergeOrder};
use crate::convert;
use crate::error::ToneError;
use crate::output::BatchReport;
use crate::progress::{ProgressEvent, ProgressReporter};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

/// Signature of a caller-supplied job body.
pub type JobFn = Box<
    dyn FnOnce(&ConversionConfig, &BackendRegistry, &mut ProgressReporter) -> Result<BatchReport, ToneError>
        + Send,
>;

/// Work submitted to a [`BatchRunner`].
pub enum BatchJob {
    /// Convert each file into the output directory.
    Convert { files: Vec<PathBuf> },
    /// Merge PDFs into one file in the output directory.
    Merge { files: Vec<PathBuf>, order: MergeOrder },
    /// Convert each file, then merge the results.
    ConvertAndMerge { files: Vec<PathBuf> },
    /// Any other job body, run under the same guarantees.
    Custom {
        label: String,
        total: usize,
        run: JobFn,
    },
}

impl fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchJob::Convert { files } => f.debug_struct("Convert").field("files", files).finish(),
            BatchJob::Merge { files, order } => f
                .debug_struct("Merge")
                .field("files", files)
                .field("order", order)
                .finish(),
            BatchJob::ConvertAndMerge { files } => f
                .debug_struct("ConvertAndMerge")
                .field("files", files)
                .finish(),
            BatchJob::Custom { label, total, .. } => f
                .debug_struct("Custom")
                .field("label", label)
                .field("total", total)
                .finish_non_exhaustive(),
        }
    }
}

impl BatchJob {
    /// Number of input files.
    pub fn total(&self) -> usize {
        match self {
            BatchJob::Convert { files }
            | BatchJob::Merge { files, .. }
            | BatchJob::ConvertAndMerge { files } => files.len(),
            BatchJob::Custom { total, .. } => *total,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            BatchJob::Convert { .. } => "convert",
            BatchJob::Merge { .. } => "merge",
            BatchJob::ConvertAndMerge { .. } => "convert and merge",
            BatchJob::Custom { label, .. } => label,
        }
    }

    /// Check the job's preconditions without doing any work.
    pub fn validate(&self, config: &ConversionConfig) -> Result<(), ToneError> {
        match self {
            BatchJob::Convert { files } | BatchJob::ConvertAndMerge { files } => {
                convert::validate_conversion(files, config)
            }
            BatchJob::Merge { files, order } => {
                convert::validate_merge(files, config)?;
                order.apply(files).map(|_| ())
            }
            BatchJob::Custom { .. } => Ok(()),
        }
    }

    fn run(
        self,
        config: &ConversionConfig,
        registry: &BackendRegistry,
        progress: &mut ProgressReporter,
    ) -> Result<BatchReport, ToneError> {
        match self {
            BatchJob::Convert { files } => convert::convert_batch(&files, config, registry, progress),
            BatchJob::Merge { files, order } => convert::merge_batch(&files, &order, config, progress),
            BatchJob::ConvertAndMerge { files } => {
                convert::convert_and_merge(&files, config, registry, progress)
            }
            BatchJob::Custom { run, .. } => run(config, registry, progress),
        }
    }
}

/// Observable state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running,
}

/// Runs at most one [`BatchJob`] at a time on a dedicated worker thread.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    running: Arc<AtomicBool>,
    registry: Arc<BackendRegistry>,
}

/// Resets the runner to Idle when dropped.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchRunner {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn state(&self) -> RunnerState {
        if self.running.load(Ordering::Acquire) {
            RunnerState::Running
        } else {
            RunnerState::Idle
        }
    }

    /// Validate `job` and start it on a new worker thread.
    ///
    /// # Errors
    /// - [`ToneError::Validation`] when the job's preconditions fail
    /// - [`ToneError::Busy`] when another job is still running
    pub fn submit(&self, job: BatchJob, config: ConversionConfig) -> Result<BatchHandle, ToneError> {
        job.validate(&config)?;

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ToneError::Busy);
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        let total = job.total();
        let label = job.label().to_string();
        let (event_tx, event_rx) = mpsc::channel(config.progress_capacity.max(1));
        let (report_tx, report_rx) = oneshot::channel();
        let registry = Arc::clone(&self.registry);

        info!("Starting {} batch ({} files)", label, total);
        let worker = move || {
            let mut reporter = ProgressReporter::new(event_tx);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                job.run(&config, &registry, &mut reporter)
            }));
            let report = match outcome {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("{} batch failed: {}", label, e);
                    BatchReport::aborted(total, e.to_string())
                }
                Err(payload) => {
                    let cause = panic_message(payload.as_ref());
                    error!("{} batch panicked: {}", label, cause);
                    BatchReport::aborted(total, format!("unexpected error: {cause}"))
                }
            };
            drop(reporter);
            // Back to Idle before the consumer can observe the report.
            drop(guard);
            // The consumer may have dropped its handle; the report is then unused.
            let _ = report_tx.send(report);
        };

        // A failed spawn drops the closure, and with it the guard.
        std::thread::Builder::new()
            .name("pdftone-batch".into())
            .spawn(worker)
            .map_err(|e| ToneError::Internal(format!("cannot start worker thread: {e}")))?;

        Ok(BatchHandle {
            events: event_rx,
            report: report_rx,
            total,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Consumer side of a running batch.
#[derive(Debug)]
pub struct BatchHandle {
    events: mpsc::Receiver<ProgressEvent>,
    report: oneshot::Receiver<BatchReport>,
    total: usize,
}

impl BatchHandle {
    /// Next progress event, or `None` once the worker stopped reporting.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        self.events.recv().await
    }

    /// Drain all progress events through `on_event`, then return the report.
    pub async fn wait_with(mut self, mut on_event: impl FnMut(&ProgressEvent)) -> BatchReport {
        while let Some(event) = self.events.recv().await {
            on_event(&event);
        }
        let total = self.total;
        self.report
            .await
            .unwrap_or_else(|_| BatchReport::aborted(total, "worker exited without a report"))
    }

    /// Discard progress and wait for the report.
    pub async fn wait(self) -> BatchReport {
        self.wait_with(|_| {}).await
    }

    /// Blocking variant of [`BatchHandle::wait_with`] for callers outside an
    /// async runtime.
    pub fn wait_blocking(mut self, mut on_event: impl FnMut(&ProgressEvent)) -> BatchReport {
        while let Some(event) = self.events.blocking_recv() {
            on_event(&event);
        }
        let total = self.total;
        self.report
            .blocking_recv()
            .unwrap_or_else(|_| BatchReport::aborted(total, "worker exited without a report"))
    }
}
