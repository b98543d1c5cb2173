//! macOS hook backend.
//!
//! Uses a listen-only CGEventTap on a dedicated CFRunLoop thread. Keycodes
//! are forwarded numerically, so nothing here touches the Text Services
//! Manager and the tap can run off the main thread.
//!
//! Modifier keys do not produce KeyDown/KeyUp on macOS; they arrive as
//! FlagsChanged and are synthesized into press/release by comparing the
//! modifier flag state.
//!
//! A null tap means the process lacks the Accessibility permission.

use core_foundation::base::TCFType;
use core_foundation::runloop::{
    kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource,
};
use core_graphics::event::{
    CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement, CGEventType,
};
use crossbeam_channel::{bounded, Sender};
use shortcut_core::{EventSink, HookBackend, HookError, InstalledHook, RawEvent};
use std::cell::RefCell;
use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

// FFI declarations for functions not exposed by the core-graphics crate
type CFMachPortRef = *mut c_void;
type CFRunLoopSourceRef = *mut c_void;
type CFAllocatorRef = *const c_void;
type CFIndex = i64;
type CGEventRef = *mut c_void;
type CGEventFlags = u64;

// Event field constants
const KEYBOARD_EVENT_KEYCODE: u32 = 9;
const MOUSE_EVENT_BUTTON_NUMBER: u32 = 3;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventTapCreate(
        tap: u32,
        place: u32,
        options: u32,
        events_of_interest: u64,
        callback: CGEventTapCallback,
        user_info: *mut c_void,
    ) -> CFMachPortRef;

    fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

    fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
    fn CGEventGetFlags(event: CGEventRef) -> CGEventFlags;
}

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    fn CFMachPortCreateRunLoopSource(
        allocator: CFAllocatorRef,
        port: CFMachPortRef,
        order: CFIndex,
    ) -> CFRunLoopSourceRef;
}

type CGEventTapCallback = extern "C" fn(
    proxy: *mut c_void,
    event_type: CGEventType,
    cg_event: CGEventRef,
    user_info: *mut c_void,
) -> CGEventRef;

// One hook per process.
static HOOK_ACTIVE: AtomicBool = AtomicBool::new(false);

// Teardown request for the run-loop thread.
static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

// Last seen modifier flags, for synthesizing press/release from FlagsChanged.
static LAST_FLAGS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

/// Backend using a Core Graphics event tap.
pub struct MacosBackend;

impl HookBackend for MacosBackend {
    fn install(&self, sink: EventSink) -> Result<Box<dyn InstalledHook>, HookError> {
        if HOOK_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(HookError::AlreadyInstalled);
        }
        STOP_REQUESTED.store(false, Ordering::SeqCst);

        let (ready_tx, ready_rx) = bounded(1);
        let thread = thread::spawn(move || run_event_tap(sink, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(MacosHook {
                thread: Some(thread),
            })),
            Ok(Err(error)) => {
                let _ = thread.join();
                HOOK_ACTIVE.store(false, Ordering::SeqCst);
                Err(error)
            }
            Err(_) => {
                let _ = thread.join();
                HOOK_ACTIVE.store(false, Ordering::SeqCst);
                Err(HookError::Install(
                    "event tap thread exited before signaling readiness".into(),
                ))
            }
        }
    }
}

struct MacosHook {
    thread: Option<JoinHandle<()>>,
}

impl MacosHook {
    fn shutdown(&mut self) {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };
        STOP_REQUESTED.store(true, Ordering::SeqCst);
        let _ = thread.join();
        HOOK_ACTIVE.store(false, Ordering::SeqCst);
    }
}

impl InstalledHook for MacosHook {
    fn uninstall(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for MacosHook {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Callback function for CGEventTap. Runs on the run-loop thread.
extern "C" fn event_tap_callback(
    _proxy: *mut c_void,
    event_type: CGEventType,
    cg_event: CGEventRef,
    _user_info: *mut c_void,
) -> CGEventRef {
    match event_type {
        CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
            SINK.with(|slot| {
                if let Some(ref sink) = *slot.borrow() {
                    sink.fail(HookError::Lost("event tap disabled by the OS".into()));
                }
            });
            STOP_REQUESTED.store(true, Ordering::SeqCst);
        }
        _ => {
            if let Some(raw) = convert_event(event_type, cg_event) {
                SINK.with(|slot| {
                    if let Some(ref sink) = *slot.borrow() {
                        sink.push(raw);
                    }
                });
            }
        }
    }
    // Listen-only tap: return the event unchanged.
    cg_event
}

fn keycode(event: CGEventRef) -> u32 {
    unsafe { CGEventGetIntegerValueField(event, KEYBOARD_EVENT_KEYCODE) as u32 }
}

/// CGEvent button numbers start at 0 (left); our wire numbering starts at 1.
fn button_number(event: CGEventRef) -> u32 {
    let number = unsafe { CGEventGetIntegerValueField(event, MOUSE_EVENT_BUTTON_NUMBER) };
    number as u32 + 1
}

fn convert_event(event_type: CGEventType, event: CGEventRef) -> Option<RawEvent> {
    match event_type {
        CGEventType::KeyDown => Some(RawEvent::KeyPress {
            code: keycode(event),
        }),
        CGEventType::KeyUp => Some(RawEvent::KeyRelease {
            code: keycode(event),
        }),
        CGEventType::LeftMouseDown
        | CGEventType::RightMouseDown
        | CGEventType::OtherMouseDown => Some(RawEvent::ButtonPress {
            button: button_number(event),
        }),
        CGEventType::LeftMouseUp | CGEventType::RightMouseUp | CGEventType::OtherMouseUp => {
            Some(RawEvent::ButtonRelease {
                button: button_number(event),
            })
        }
        CGEventType::FlagsChanged => {
            let code = keycode(event);
            let flags = unsafe { CGEventGetFlags(event) };
            let old_flags = LAST_FLAGS.swap(flags, Ordering::SeqCst);
            if flags > old_flags {
                Some(RawEvent::KeyPress { code })
            } else {
                Some(RawEvent::KeyRelease { code })
            }
        }
        _ => None,
    }
}

/// Run the event tap until teardown is requested.
fn run_event_tap(sink: EventSink, ready_tx: Sender<Result<(), HookError>>) {
    info!("event tap thread started");
    SINK.with(|slot| *slot.borrow_mut() = Some(sink));

    let event_mask: u64 = (1 << CGEventType::LeftMouseDown as u64)
        | (1 << CGEventType::LeftMouseUp as u64)
        | (1 << CGEventType::RightMouseDown as u64)
        | (1 << CGEventType::RightMouseUp as u64)
        | (1 << CGEventType::OtherMouseDown as u64)
        | (1 << CGEventType::OtherMouseUp as u64)
        | (1 << CGEventType::KeyDown as u64)
        | (1 << CGEventType::KeyUp as u64)
        | (1 << CGEventType::FlagsChanged as u64);

    let tap = unsafe {
        CGEventTapCreate(
            CGEventTapLocation::HID as u32,
            CGEventTapPlacement::HeadInsertEventTap as u32,
            CGEventTapOptions::ListenOnly as u32,
            event_mask,
            event_tap_callback,
            ptr::null_mut(),
        )
    };

    if tap.is_null() {
        error!("failed to create event tap, accessibility permission may not be granted");
        let _ = ready_tx.send(Err(HookError::PermissionDenied));
        SINK.with(|slot| slot.borrow_mut().take());
        return;
    }
    debug!("event tap created");

    let run_loop_source = unsafe { CFMachPortCreateRunLoopSource(ptr::null(), tap, 0) };
    if run_loop_source.is_null() {
        error!("failed to create run loop source");
        let _ = ready_tx.send(Err(HookError::Install(
            "failed to create run loop source".into(),
        )));
        SINK.with(|slot| slot.borrow_mut().take());
        return;
    }

    let cf_source = unsafe { CFRunLoopSource::wrap_under_create_rule(run_loop_source as *mut _) };
    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&cf_source, unsafe { kCFRunLoopCommonModes });

    unsafe { CGEventTapEnable(tap, true) };
    let _ = ready_tx.send(Ok(()));
    info!("event tap enabled, servicing run loop");

    // Short run slices so a teardown request is honored promptly.
    while !STOP_REQUESTED.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }
    }

    unsafe { CGEventTapEnable(tap, false) };
    SINK.with(|slot| slot.borrow_mut().take());
    info!("event tap thread exiting");
}
