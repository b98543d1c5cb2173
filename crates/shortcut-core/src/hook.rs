//! Hook backend seam: the boundary between an OS hook thread and the core.
//!
//! A backend installs a process-wide input hook and forwards everything it
//! sees into an [`EventSink`]. The sink normalizes on the hook thread (cheap,
//! pure) and enqueues with `try_send`, so the hook callback never blocks on
//! consumer code.

use crate::event::{normalize, InputEvent, RawEvent};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Errors from hook installation and operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// The process lacks the privilege required for global input interception.
    #[error("process lacks permission to install a global input hook")]
    PermissionDenied,
    /// A hook from this process is already installed.
    #[error("a global input hook is already installed in this process")]
    AlreadyInstalled,
    /// OS-level installation failure.
    #[error("hook installation failed: {0}")]
    Install(String),
    /// The OS revoked or broke the hook while it was running.
    #[error("hook lost: {0}")]
    Lost(String),
}

/// Messages flowing from the hook thread to the dispatch worker.
#[derive(Debug, Clone)]
pub(crate) enum HookSignal {
    Event(InputEvent),
    Lost(HookError),
}

/// Write half of the dispatch queue, handed to a platform backend.
///
/// The only operations a hook callback performs are [`EventSink::push`] and,
/// on terminal failure, [`EventSink::fail`].
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<HookSignal>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<HookSignal>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Normalize and enqueue a raw event.
    ///
    /// Raw categories outside the canonical taxonomy are dropped here. When
    /// the queue is full the event is discarded and the overflow counter
    /// incremented; this is observable, not fatal.
    pub fn push(&self, raw: RawEvent) {
        let Some(event) = normalize(raw) else {
            return;
        };
        match self.tx.try_send(HookSignal::Event(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(total, "dispatch queue full, dropping event");
            }
            // Listener already shut down; nothing to deliver to.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Report that the hook died (e.g. revoked by the OS).
    ///
    /// The dispatch worker deactivates the listener and records the fault.
    pub fn fail(&self, error: HookError) {
        let _ = self.tx.send(HookSignal::Lost(error));
    }
}

/// A platform-specific global hook installer.
pub trait HookBackend: Send + Sync {
    /// Install the process-wide hook and start feeding `sink`.
    ///
    /// Synchronous: returns only once the OS registration has succeeded or
    /// failed, so permission problems surface directly from `start`.
    fn install(&self, sink: EventSink) -> Result<Box<dyn InstalledHook>, HookError>;
}

/// Ownership of an installed hook.
pub trait InstalledHook: Send {
    /// Remove the hook. Safe from any thread; a no-op if the hook is
    /// already gone.
    fn uninstall(self: Box<Self>);
}
