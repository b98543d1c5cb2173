//! Listener lifecycle manager: the single owner of the hook state machine.
//!
//! State machine: Inactive --start--> Active; Active --stop--> Inactive;
//! Inactive --stop--> Inactive (no-op); Active --start--> error, no change.
//! At most one active hook exists per process.

use crate::dispatch::{DispatchContext, DispatchWorker};
use crate::event::InputEvent;
use crate::filter::KeyFilter;
use crate::hook::{EventSink, HookBackend, HookError, InstalledHook};
use crossbeam_channel::bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::info;

/// Errors returned by [`Listener::start`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    /// The process lacks the privilege for global input interception.
    #[error("process lacks permission to install a global input hook")]
    PermissionDenied,
    /// A listener is already running in this process; stop it first.
    #[error("a listener is already active in this process")]
    AlreadyActive,
    /// Any other hook-level failure.
    #[error(transparent)]
    Hook(HookError),
}

/// Tuning knobs for the listener pipeline.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Capacity of the dispatch queue. Overflow drops events and counts them.
    pub queue_capacity: usize,
    /// Deliver KeyDown once per physical press, discarding OS auto-repeat.
    pub suppress_key_repeat: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            suppress_key_repeat: true,
        }
    }
}

struct ListenerInner {
    hook: Option<Box<dyn InstalledHook>>,
    worker: Option<DispatchWorker>,
}

/// Global input listener wiring a hook backend to a consumer callback.
pub struct Listener {
    backend: Box<dyn HookBackend>,
    config: ListenerConfig,
    inner: Mutex<ListenerInner>,
    active: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    fault: Arc<Mutex<Option<HookError>>>,
}

impl Listener {
    /// Create an inactive listener with default configuration.
    pub fn new(backend: Box<dyn HookBackend>) -> Self {
        Self::with_config(backend, ListenerConfig::default())
    }

    /// Create an inactive listener with the given configuration.
    pub fn with_config(backend: Box<dyn HookBackend>, config: ListenerConfig) -> Self {
        Self {
            backend,
            config,
            inner: Mutex::new(ListenerInner {
                hook: None,
                worker: None,
            }),
            active: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            fault: Arc::new(Mutex::new(None)),
        }
    }

    /// Install the hook and start delivering events matching `filter` to
    /// `callback`.
    ///
    /// Fails with [`ListenerError::AlreadyActive`] if a listener is running;
    /// the running listener is left untouched. The callback runs on the
    /// dispatch worker thread, never on the OS hook thread.
    pub fn start<F>(&self, callback: F, filter: KeyFilter) -> Result<(), ListenerError>
    where
        F: FnMut(InputEvent) + Send + 'static,
    {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.active.load(Ordering::SeqCst) {
            return Err(ListenerError::AlreadyActive);
        }

        // Reclaim leftovers from a previous hook-loss fault.
        Self::teardown(&mut inner);
        if let Ok(mut fault) = self.fault.lock() {
            fault.take();
        }

        let (event_tx, event_rx) = bounded(self.config.queue_capacity);
        let worker = DispatchWorker::spawn(
            event_rx,
            Box::new(callback),
            DispatchContext {
                active: self.active.clone(),
                fault: self.fault.clone(),
                filter,
                suppress_key_repeat: self.config.suppress_key_repeat,
            },
        );

        // Gate opens before the hook goes live so the first event can pass.
        self.active.store(true, Ordering::SeqCst);
        let sink = EventSink::new(event_tx, self.dropped.clone());
        match self.backend.install(sink) {
            Ok(hook) => {
                inner.hook = Some(hook);
                inner.worker = Some(worker);
                info!(?filter, "listener started");
                Ok(())
            }
            Err(hook_error) => {
                self.active.store(false, Ordering::SeqCst);
                worker.shutdown();
                Err(match hook_error {
                    HookError::PermissionDenied => ListenerError::PermissionDenied,
                    other => ListenerError::Hook(other),
                })
            }
        }
    }

    /// Uninstall the hook, discard queued events, and stop delivery.
    ///
    /// A no-op when inactive. Safe to call concurrently with in-flight
    /// dispatch: once this returns, the consumer callback will not run again.
    pub fn stop(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        let was_active = self.active.swap(false, Ordering::SeqCst);
        Self::teardown(&mut inner);
        if was_active {
            info!("listener stopped");
        }
    }

    /// Hook uninstall happens before the worker join so the producer is gone
    /// while the queue drains.
    fn teardown(inner: &mut ListenerInner) {
        if let Some(hook) = inner.hook.take() {
            hook.uninstall();
        }
        if let Some(worker) = inner.worker.take() {
            worker.shutdown();
        }
    }

    /// Whether a listener is currently active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Total events discarded because the dispatch queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Consume the fault recorded when the OS revoked the hook mid-flight.
    ///
    /// A `Some` return means the listener transitioned to inactive on its
    /// own; `start` may be called again afterwards.
    pub fn take_fault(&self) -> Option<HookError> {
        self.fault.lock().ok().and_then(|mut fault| fault.take())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, RawEvent, BUTTON_LEFT};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Test backend: exposes the sink so tests can inject raw events.
    #[derive(Clone, Default)]
    struct FakeBackend {
        sink: Arc<Mutex<Option<EventSink>>>,
        installed: Arc<AtomicBool>,
        fail_install: Arc<Mutex<Option<HookError>>>,
    }

    impl FakeBackend {
        fn push(&self, raw: RawEvent) {
            let slot = self.sink.lock().unwrap();
            slot.as_ref().expect("hook not installed").push(raw);
        }

        fn fail_hook(&self, error: HookError) {
            let slot = self.sink.lock().unwrap();
            slot.as_ref().expect("hook not installed").fail(error);
        }
    }

    impl HookBackend for FakeBackend {
        fn install(&self, sink: EventSink) -> Result<Box<dyn InstalledHook>, HookError> {
            if let Some(error) = self.fail_install.lock().unwrap().take() {
                return Err(error);
            }
            *self.sink.lock().unwrap() = Some(sink);
            self.installed.store(true, Ordering::SeqCst);
            Ok(Box::new(FakeHook {
                sink: self.sink.clone(),
                installed: self.installed.clone(),
            }))
        }
    }

    struct FakeHook {
        sink: Arc<Mutex<Option<EventSink>>>,
        installed: Arc<AtomicBool>,
    }

    impl InstalledHook for FakeHook {
        fn uninstall(self: Box<Self>) {
            self.sink.lock().unwrap().take();
            self.installed.store(false, Ordering::SeqCst);
        }
    }

    type Delivered = Arc<Mutex<Vec<InputEvent>>>;

    fn recording_callback() -> (Delivered, impl FnMut(InputEvent) + Send + 'static) {
        let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        (delivered, move |event| sink.lock().unwrap().push(event))
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn listener_with(backend: &FakeBackend) -> Listener {
        Listener::new(Box::new(backend.clone()))
    }

    #[test]
    fn test_events_delivered_in_order_and_lossless() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        for code in 1..=10 {
            backend.push(RawEvent::KeyPress { code });
            backend.push(RawEvent::KeyRelease { code });
        }

        wait_until(|| delivered.lock().unwrap().len() == 20);
        let events = delivered.lock().unwrap();
        for (i, pair) in events.chunks(2).enumerate() {
            assert_eq!(pair[0].event_type, EventType::KeyDown);
            assert_eq!(pair[1].event_type, EventType::KeyUp);
            assert_eq!(pair[0].code, i as u32 + 1);
            assert_eq!(pair[1].code, i as u32 + 1);
        }
        assert_eq!(listener.dropped_events(), 0);
    }

    #[test]
    fn test_start_then_stop_delivers_nothing() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        listener.stop();

        assert!(!listener.is_active());
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn test_second_start_fails_and_first_keeps_running() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        let result = listener.start(|_| {}, KeyFilter::All);
        assert_eq!(result, Err(ListenerError::AlreadyActive));
        assert!(listener.is_active());

        backend.push(RawEvent::KeyPress { code: 42 });
        wait_until(|| delivered.lock().unwrap().len() == 1);
        assert_eq!(delivered.lock().unwrap()[0].code, 42);
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        listener.stop();
        listener.stop();
        assert!(!listener.is_active());
    }

    #[test]
    fn test_filter_applies_to_all_event_types() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::Only(7)).unwrap();
        backend.push(RawEvent::KeyPress { code: 5 });
        backend.push(RawEvent::KeyRelease { code: 7 });
        backend.push(RawEvent::KeyPress { code: 7 });
        backend.push(RawEvent::ButtonPress { button: BUTTON_LEFT });

        wait_until(|| delivered.lock().unwrap().len() == 2);
        thread::sleep(Duration::from_millis(20));
        let events = delivered.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            *events,
            vec![
                InputEvent {
                    event_type: EventType::KeyUp,
                    code: 7
                },
                InputEvent {
                    event_type: EventType::KeyDown,
                    code: 7
                },
            ]
        );
    }

    #[test]
    fn test_no_filter_delivers_everything() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::from_code(0)).unwrap();
        backend.push(RawEvent::KeyPress { code: 5 });
        backend.push(RawEvent::KeyRelease { code: 7 });
        backend.push(RawEvent::KeyPress { code: 7 });

        wait_until(|| delivered.lock().unwrap().len() == 3);
        let codes: Vec<u32> = delivered.lock().unwrap().iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![5, 7, 7]);
    }

    #[test]
    fn test_no_delivery_after_stop_returns() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        for code in 1..=100 {
            backend.push(RawEvent::KeyPress { code });
        }
        listener.stop();

        let count = delivered.lock().unwrap().len();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(delivered.lock().unwrap().len(), count);
    }

    #[test]
    fn test_key_repeat_suppressed_until_release() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        backend.push(RawEvent::KeyPress { code: 30 });
        backend.push(RawEvent::KeyPress { code: 30 });
        backend.push(RawEvent::KeyPress { code: 30 });
        backend.push(RawEvent::KeyRelease { code: 30 });
        backend.push(RawEvent::KeyPress { code: 30 });
        // Mouse buttons are not subject to repeat suppression.
        backend.push(RawEvent::ButtonPress { button: BUTTON_LEFT });
        backend.push(RawEvent::ButtonPress { button: BUTTON_LEFT });

        wait_until(|| delivered.lock().unwrap().len() == 5);
        thread::sleep(Duration::from_millis(20));
        let types: Vec<EventType> = delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                EventType::KeyDown,
                EventType::KeyUp,
                EventType::KeyDown,
                EventType::MouseDown,
                EventType::MouseDown,
            ]
        );
    }

    #[test]
    fn test_repeat_suppression_can_be_disabled() {
        let backend = FakeBackend::default();
        let listener = Listener::with_config(
            Box::new(backend.clone()),
            ListenerConfig {
                suppress_key_repeat: false,
                ..ListenerConfig::default()
            },
        );
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        backend.push(RawEvent::KeyPress { code: 30 });
        backend.push(RawEvent::KeyPress { code: 30 });

        wait_until(|| delivered.lock().unwrap().len() == 2);
    }

    #[test]
    fn test_permission_error_surfaces_from_start() {
        let backend = FakeBackend::default();
        *backend.fail_install.lock().unwrap() = Some(HookError::PermissionDenied);
        let listener = listener_with(&backend);

        let result = listener.start(|_| {}, KeyFilter::All);
        assert_eq!(result, Err(ListenerError::PermissionDenied));
        assert!(!listener.is_active());
        assert!(!backend.installed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_hook_loss_deactivates_and_records_fault() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (delivered, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        backend.fail_hook(HookError::Lost("revoked by os".into()));

        wait_until(|| !listener.is_active());
        assert_eq!(
            listener.take_fault(),
            Some(HookError::Lost("revoked by os".into()))
        );
        assert!(listener.take_fault().is_none());
        assert!(delivered.lock().unwrap().is_empty());

        // The listener is restartable after a fault.
        listener.start(|_| {}, KeyFilter::All).unwrap();
        assert!(listener.is_active());
        listener.stop();
    }

    #[test]
    fn test_restart_after_stop() {
        let backend = FakeBackend::default();
        let listener = listener_with(&backend);
        let (first, callback) = recording_callback();

        listener.start(callback, KeyFilter::All).unwrap();
        listener.stop();

        let (second, callback) = recording_callback();
        listener.start(callback, KeyFilter::All).unwrap();
        backend.push(RawEvent::KeyPress { code: 9 });

        wait_until(|| second.lock().unwrap().len() == 1);
        assert!(first.lock().unwrap().is_empty());
        listener.stop();
    }
}
