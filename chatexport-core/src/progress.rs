//! Progress reporting and cooperative cancellation.
//!
//! Reporting is fire-and-forget: a sink that cannot keep up drops events and
//! the engine never waits on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Session-scoped cancellation flag. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: String,
    pub detail: String,
    /// 0..=100
    pub percent: u8,
    pub message_count: usize,
}

impl ProgressEvent {
    pub fn new(
        phase: impl Into<String>,
        detail: impl Into<String>,
        percent: u8,
        message_count: usize,
    ) -> Self {
        Self {
            phase: phase.into(),
            detail: detail.into(),
            percent: percent.min(100),
            message_count,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Logs each event at debug level.
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, event: ProgressEvent) {
        debug!(
            phase = %event.phase,
            percent = event.percent,
            messages = event.message_count,
            "{}",
            event.detail
        );
    }
}

/// Forwards events to a bounded channel; a full or closed channel drops them.
pub struct ChannelProgress {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        if self.tx.try_send(event).is_err() {
            debug!("progress event dropped");
        }
    }
}

/// Share of `done` over `total` mapped onto a `width`-point band starting at
/// `base`, rounded.
pub(crate) fn band_percent(base: u8, width: f64, done: f64, total: f64) -> u8 {
    let ratio = if total > 0.0 { (done / total).clamp(0.0, 1.0) } else { 0.0 };
    (ratio * width).round() as u8 + base
}
