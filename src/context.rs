use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::info;

/// Receives coarse progress updates (0–100) with a phase label.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn on_progress(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_progress(&self, _percent: u8, _message: &str) {}
}

/// Renders progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_progress(&self, percent: u8, message: &str) {
        info!("[{percent:>3}%] {message}");
    }
}

/// Cooperative stop signal shared between the caller and a running merge.
#[derive(Debug, Default, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Everything a merge needs from its caller besides the inputs.
pub struct MergeContext<'a> {
    pub cancel: CancellationToken,
    pub progress: &'a dyn ProgressSink,
    /// Upper bound on concurrent file reads; `0` picks the available
    /// parallelism.
    pub jobs: usize,
}

impl<'a> MergeContext<'a> {
    pub fn new(progress: &'a dyn ProgressSink) -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress,
            jobs: 0,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub(crate) fn report(&self, percent: f64, message: &str) {
        let clamped = percent.clamp(0.0, 100.0) as u8;
        self.progress.on_progress(clamped, message);
    }
}

impl Default for MergeContext<'static> {
    fn default() -> Self {
        MergeContext::new(&SilentProgress)
    }
}
