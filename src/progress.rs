//! Progress events sent from a batch worker to its consumer.
//!
//! The worker thread never touches caller state. It pushes
//! [`ProgressEvent`]s into a bounded `tokio::sync::mpsc` channel and the
//! owning thread (CLI progress bar, GUI event loop, test) drains them at its
//! own pace. When the channel is full the worker waits; when the receiver has
//! been dropped events are silently discarded and the batch still finishes.
//!
//! Percentages are monotonically non-decreasing: [`ProgressReporter`]
//! refuses to move backwards, so a late or out-of-phase report can never make
//! a progress bar jump back.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One progress update: percent complete in `[0, 100]` plus a status line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: f32,
    pub message: String,
}

/// Percentage reported before file `index` (0-based) of `total` starts.
///
/// `completed / total * 100`: the first file reports 0, and 100 is only
/// reached once every file is done.
pub fn file_start_percent(index: usize, total: usize) -> f32 {
    if total == 0 {
        return 100.0;
    }
    (index as f32 / total as f32) * 100.0
}

/// Sending half used by the worker thread.
///
/// Must be used from a plain thread, not from inside an async task:
/// [`mpsc::Sender::blocking_send`] panics on a runtime thread.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    last: f32,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            tx: Some(tx),
            last: 0.0,
        }
    }

    /// A reporter that drops every event; for direct, synchronous calls.
    pub fn disabled() -> Self {
        Self { tx: None, last: 0.0 }
    }

    /// Last percentage actually reported.
    pub fn last_percent(&self) -> f32 {
        self.last
    }

    /// Report `percent` (clamped to `[last, 100]`) with `message`.
    pub fn report(&mut self, percent: f32, message: impl Into<String>) {
        let percent = percent.clamp(self.last, 100.0);
        self.last = percent;

        let Some(ref tx) = self.tx else {
            return;
        };
        let event = ProgressEvent {
            percent,
            message: message.into(),
        };
        if tx.blocking_send(event).is_err() {
            // Receiver gone: the consumer no longer cares about progress.
            self.tx = None;
        }
    }
}
