//! Dispatch bridge: drains the event queue on a dedicated worker thread.
//!
//! The hook thread is the sole writer of the queue and the worker its sole
//! reader, so consumer code can never stall OS input delivery. Events are
//! handed to the callback in exact arrival order.

use crate::event::{EventType, InputEvent};
use crate::filter::KeyFilter;
use crate::hook::{HookError, HookSignal};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Consumer callback invoked for each delivered event.
pub type EventCallback = Box<dyn FnMut(InputEvent) + Send + 'static>;

/// Shared state the worker consults on every event.
pub(crate) struct DispatchContext {
    /// Delivery gate; cleared by `stop` and on hook loss.
    pub active: Arc<AtomicBool>,
    /// Where a terminal hook failure is recorded.
    pub fault: Arc<Mutex<Option<HookError>>>,
    pub filter: KeyFilter,
    /// Deliver KeyDown once per physical press, discarding OS auto-repeat.
    pub suppress_key_repeat: bool,
}

/// Handle to the dispatch worker thread.
pub(crate) struct DispatchWorker {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    /// Spawn the worker draining `signal_rx` into `callback`.
    pub fn spawn(
        signal_rx: Receiver<HookSignal>,
        callback: EventCallback,
        ctx: DispatchContext,
    ) -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        let thread = thread::spawn(move || run_worker(signal_rx, stop_rx, callback, ctx));
        Self {
            stop_tx,
            thread: Some(thread),
        }
    }

    /// Stop the worker and wait for it to exit.
    ///
    /// No callback invocation happens after this returns.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run_worker(
    signal_rx: Receiver<HookSignal>,
    stop_rx: Receiver<()>,
    mut callback: EventCallback,
    ctx: DispatchContext,
) {
    debug!("dispatch worker started");
    let mut held_keys: HashSet<u32> = HashSet::new();

    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(signal_rx) -> msg => {
                let signal = match msg {
                    Ok(signal) => signal,
                    // All senders gone; the hook has been torn down.
                    Err(_) => break,
                };
                match signal {
                    HookSignal::Event(event) => {
                        if !ctx.active.load(Ordering::SeqCst) {
                            continue;
                        }
                        if !ctx.filter.matches(&event) {
                            continue;
                        }
                        if ctx.suppress_key_repeat && !track_key(&mut held_keys, &event) {
                            continue;
                        }
                        callback(event);
                    }
                    HookSignal::Lost(hook_error) => {
                        error!(%hook_error, "hook lost, deactivating listener");
                        if let Ok(mut fault) = ctx.fault.lock() {
                            *fault = Some(hook_error);
                        }
                        ctx.active.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
        }
    }

    debug!("dispatch worker exiting");
}

/// Track held keys; returns `false` when a KeyDown repeats a key that is
/// already down. Mouse events always pass.
fn track_key(held: &mut HashSet<u32>, event: &InputEvent) -> bool {
    match event.event_type {
        EventType::KeyDown => held.insert(event.code),
        EventType::KeyUp => {
            held.remove(&event.code);
            true
        }
        EventType::MouseDown | EventType::MouseUp => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(event_type: EventType, code: u32) -> InputEvent {
        InputEvent { event_type, code }
    }

    #[test]
    fn test_track_key_suppresses_repeats() {
        let mut held = HashSet::new();
        assert!(track_key(&mut held, &key(EventType::KeyDown, 5)));
        assert!(!track_key(&mut held, &key(EventType::KeyDown, 5)));
        assert!(track_key(&mut held, &key(EventType::KeyUp, 5)));
        assert!(track_key(&mut held, &key(EventType::KeyDown, 5)));
    }

    #[test]
    fn test_track_key_ignores_mouse() {
        let mut held = HashSet::new();
        assert!(track_key(&mut held, &key(EventType::MouseDown, 1)));
        assert!(track_key(&mut held, &key(EventType::MouseDown, 1)));
        assert!(track_key(&mut held, &key(EventType::MouseUp, 1)));
    }
}
