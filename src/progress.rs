// src/progress.rs

//! Percentage progress reporting
//!
//! Every tracker the engine sees runs from 0 to [`PERCENT`]. Long
//! operations hand a nested step a window of their own range through
//! [`ScaledProgress`]; concurrent per-item work (downloads) shares one range
//! through [`WeightedProgress`].
//!
//! # Trackers
//!
//! - `CliProgress`: indicatif bar for the command line
//! - `LogProgress`: logs every tenth of the range through tracing
//! - `SilentProgress`: records the position and nothing else
//! - `CallbackProgress`: hands each new percentage to a closure
//!
//! # Example
//!
//! ```
//! use updraft::progress::{ProgressTracker, ScaledProgress, SilentProgress};
//!
//! let overall = SilentProgress::percent();
//!
//! // Downloading fills the middle third of the bar
//! let download = ScaledProgress::window(&overall, 33, 66);
//! download.set_position(50);
//! assert_eq!(overall.position(), 49);
//! ```

use indicatif::ProgressBar;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Full scale of every tracker
pub const PERCENT: u64 = 100;

/// Sink for percentage progress
///
/// Shared across threads: downloads report from tokio tasks, delta
/// application from the blocking pool.
pub trait ProgressTracker: Send + Sync {
    /// Move to `percent`; values above [`PERCENT`] are clamped
    fn set_position(&self, percent: u64);

    fn position(&self) -> u64;

    /// Describe the current step
    fn set_message(&self, _message: &str) {}

    fn finish_with_message(&self, message: &str);

    fn finish_with_error(&self, message: &str);
}

/// Tracker that only remembers where it is
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent() -> Arc<dyn ProgressTracker> {
        Arc::new(Self::new())
    }
}

impl ProgressTracker for SilentProgress {
    fn set_position(&self, percent: u64) {
        self.position.store(percent.min(PERCENT), Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.set_position(PERCENT);
    }

    fn finish_with_error(&self, _message: &str) {}
}

/// Tracker that logs each tenth of the range it crosses
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_position(&self, percent: u64) {
        let percent = percent.min(PERCENT);
        let previous = self.position.swap(percent, Ordering::Relaxed);
        if percent / 10 != previous / 10 {
            info!("{}: {}%", self.name, percent);
        }
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }

    fn finish_with_message(&self, message: &str) {
        self.position.store(PERCENT, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        warn!("{}: {}", self.name, message);
    }
}

/// Tracker that calls `callback` with every new percentage.
///
/// This is how an embedding application drives its own UI. Repeated
/// reports of the same value are not forwarded.
pub struct CallbackProgress<F>
where
    F: Fn(u64) + Send + Sync,
{
    callback: F,
    position: AtomicU64,
}

impl<F> CallbackProgress<F>
where
    F: Fn(u64) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            position: AtomicU64::new(0),
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(u64) + Send + Sync,
{
    fn set_position(&self, percent: u64) {
        let percent = percent.min(PERCENT);
        if self.position.swap(percent, Ordering::Relaxed) != percent {
            (self.callback)(percent);
        }
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.set_position(PERCENT);
    }

    fn finish_with_error(&self, _message: &str) {}
}

/// Maps a child's full range onto `[start, end]` of a parent
pub struct ScaledProgress {
    parent: Arc<dyn ProgressTracker>,
    start: u64,
    end: u64,
    position: AtomicU64,
}

impl ScaledProgress {
    pub fn new(parent: Arc<dyn ProgressTracker>, start: u64, end: u64) -> Self {
        let end = end.min(PERCENT);
        Self {
            parent,
            start: start.min(end),
            end,
            position: AtomicU64::new(0),
        }
    }

    /// [`ScaledProgress::new`] behind an `Arc`, ready to pass down
    pub fn window(parent: &Arc<dyn ProgressTracker>, start: u64, end: u64) -> Arc<dyn ProgressTracker> {
        Arc::new(Self::new(parent.clone(), start, end))
    }
}

impl ProgressTracker for ScaledProgress {
    fn set_position(&self, percent: u64) {
        let percent = percent.min(PERCENT);
        self.position.store(percent, Ordering::Relaxed);
        self.parent
            .set_position(self.start + (self.end - self.start) * percent / PERCENT);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn set_message(&self, message: &str) {
        self.parent.set_message(message);
    }

    fn finish_with_message(&self, _message: &str) {
        self.set_position(PERCENT);
    }

    fn finish_with_error(&self, message: &str) {
        self.parent.set_message(message);
    }
}

/// Splits a parent's range evenly across `items` concurrent items; the
/// parent sees the average of the slots
pub struct WeightedProgress {
    parent: Arc<dyn ProgressTracker>,
    slots: Arc<Vec<AtomicU64>>,
}

impl WeightedProgress {
    pub fn new(parent: Arc<dyn ProgressTracker>, items: usize) -> Self {
        Self {
            parent,
            slots: Arc::new((0..items.max(1)).map(|_| AtomicU64::new(0)).collect()),
        }
    }

    /// Tracker for item `index`
    pub fn slot(&self, index: usize) -> Arc<dyn ProgressTracker> {
        Arc::new(SlotProgress {
            parent: self.parent.clone(),
            slots: self.slots.clone(),
            index: index.min(self.slots.len() - 1),
        })
    }
}

struct SlotProgress {
    parent: Arc<dyn ProgressTracker>,
    slots: Arc<Vec<AtomicU64>>,
    index: usize,
}

impl ProgressTracker for SlotProgress {
    fn set_position(&self, percent: u64) {
        self.slots[self.index].store(percent.min(PERCENT), Ordering::Relaxed);
        let total: u64 = self.slots.iter().map(|s| s.load(Ordering::Relaxed)).sum();
        self.parent.set_position(total / self.slots.len() as u64);
    }

    fn position(&self) -> u64 {
        self.slots[self.index].load(Ordering::Relaxed)
    }

    fn set_message(&self, message: &str) {
        self.parent.set_message(message);
    }

    fn finish_with_message(&self, _message: &str) {
        self.set_position(PERCENT);
    }

    fn finish_with_error(&self, message: &str) {
        self.parent.set_message(message);
    }
}

/// Terminal percentage bar
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new(PERCENT);
        if let Ok(style) =
            indicatif::ProgressStyle::with_template("{msg} [{bar:40.green/dim}] {percent}%")
        {
            bar.set_style(style.progress_chars("##-"));
        }
        bar.set_message(message.to_string());
        Self { bar }
    }

    pub fn percent(message: &str) -> Arc<dyn ProgressTracker> {
        Arc::new(Self::new(message))
    }
}

impl ProgressTracker for CliProgress {
    fn set_position(&self, percent: u64) {
        self.bar.set_position(percent.min(PERCENT));
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn finish_with_message(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn finish_with_error(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }
}
