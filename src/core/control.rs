//! Operator control surface
//!
//! The only external command is "unwind". It is raised by creating the
//! configured flag file; `watch_unwind_flag` polls for it and flips the
//! shared `UnwindSwitch`, which wakes the strategy loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Notify};

#[derive(Debug, Default)]
struct SwitchInner {
    requested: AtomicBool,
    notify: Notify,
}

/// Shared "unwind requested" flag
#[derive(Debug, Clone, Default)]
pub struct UnwindSwitch {
    inner: Arc<SwitchInner>,
}

impl UnwindSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; idempotent
    pub fn request(&self) {
        if !self.inner.requested.swap(true, Ordering::AcqRel) {
            tracing::warn!("[UNWIND] Unwind requested");
        }
        self.inner.notify.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Resolves once `request` has been called (immediately if already raised)
    pub async fn requested(&self) {
        while !self.is_requested() {
            self.inner.notify.notified().await;
        }
    }
}

/// Poll `path` every `poll` and raise `switch` when the file appears
pub async fn watch_unwind_flag(
    path: PathBuf,
    poll: Duration,
    switch: UnwindSwitch,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tracing::info!(path = %path.display(), "[UNWIND] Watching for unwind flag file");
    let mut ticker = tokio::time::interval(poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("[UNWIND] Flag watcher shutting down");
                break;
            }
            _ = ticker.tick() => {
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    tracing::warn!(path = %path.display(), "[UNWIND] Flag file found");
                    switch.request();
                    break;
                }
            }
        }
    }
}
