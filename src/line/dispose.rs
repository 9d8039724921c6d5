use super::LineManagement;
use crate::error::{Result, VoiceError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Disposal flags shared between a [`Line`](super::Line) and its handles.
///
/// Every flag only ever goes from `false` to `true`.
pub(crate) struct DisposeState {
    line_number: u32,
    triggered: AtomicBool,
    observed: AtomicBool,
    disposed: AtomicBool,
    wake: CancellationToken,
}

impl DisposeState {
    pub(crate) fn new(line_number: u32) -> Self {
        Self {
            line_number,
            triggered: AtomicBool::new(false),
            observed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            wake: CancellationToken::new(),
        }
    }

    pub(crate) fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Raise the flag before waking so a woken waiter always sees it.
    pub(crate) fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.wake.cancel();
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    /// Pre-check every public operation runs first.
    pub(crate) fn check(&self) -> Result<()> {
        trace!(line = self.line_number, "check dispose");
        if self.is_disposed() {
            debug!(line = self.line_number, "operation on a disposed line");
            return Err(VoiceError::Disposed {
                line_number: self.line_number,
            });
        }
        self.check_disposing()
    }

    pub(crate) fn check_disposing(&self) -> Result<()> {
        if self.is_triggered() {
            return Err(self.disposing());
        }
        Ok(())
    }

    /// Build the disposing error, noting the first time the owner sees it.
    pub(crate) fn disposing(&self) -> VoiceError {
        if !self.observed.swap(true, Ordering::SeqCst) {
            debug!(line = self.line_number, "dispose trigger observed by owner");
        }
        VoiceError::Disposing
    }

    pub(crate) fn was_observed(&self) -> bool {
        self.observed.load(Ordering::SeqCst)
    }

    /// Run `op` until it finishes, the line is told to stop, or `cancel` fires.
    pub(crate) async fn guard<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.wake.cancelled() => Err(self.disposing()),
            _ = cancel.cancelled() => Err(VoiceError::Cancelled),
            result = op => match result {
                Err(VoiceError::Disposing) => Err(self.disposing()),
                other => other,
            },
        }
    }
}

/// Thread-safe handle used to stop a line owned by another thread.
///
/// Cloning is cheap; every clone refers to the same line.
#[derive(Clone)]
pub struct LineHandle {
    pub(crate) state: Arc<DisposeState>,
    pub(crate) backend: Arc<dyn LineManagement>,
}

impl LineHandle {
    pub fn line_number(&self) -> u32 {
        self.state.line_number
    }

    /// Ask the owning thread to stop. Idempotent; a no-op once disposed.
    ///
    /// The owner's current or next operation fails with
    /// [`VoiceError::Disposing`].
    pub fn trigger_dispose(&self) {
        let line = self.state.line_number;
        debug!(line, "trigger dispose");
        if self.state.is_disposed() {
            debug!(line, "line has already been disposed");
            return;
        }
        self.backend.trigger_dispose();
        self.state.trigger();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    pub fn is_dispose_triggered(&self) -> bool {
        self.state.is_triggered()
    }
}

impl std::fmt::Debug for LineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineHandle")
            .field("line_number", &self.state.line_number)
            .field("triggered", &self.state.is_triggered())
            .field("disposed", &self.state.is_disposed())
            .finish()
    }
}
