//! Windows hook backend.
//!
//! Installs WH_KEYBOARD_LL and WH_MOUSE_LL on a dedicated message-loop
//! thread. The hook procedures only translate the OS structures and enqueue
//! into the core's `EventSink`; everything else happens on the dispatch
//! worker. Teardown posts WM_QUIT to the hook thread and joins it.

use crossbeam_channel::{bounded, Sender};
use shortcut_core::{
    EventSink, HookBackend, HookError, InstalledHook, RawEvent, BUTTON_LEFT, BUTTON_MIDDLE,
    BUTTON_RIGHT, BUTTON_X1, BUTTON_X2,
};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use windows_sys::Win32::Foundation::{GetLastError, ERROR_ACCESS_DENIED, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, KBDLLHOOKSTRUCT, MSG,
    MSLLHOOKSTRUCT, PM_NOREMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP,
    WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE, WM_MOUSEWHEEL,
    WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN,
    WM_XBUTTONUP, XBUTTON1,
};

// One hook per process.
static HOOK_ACTIVE: AtomicBool = AtomicBool::new(false);

// Thread ID for posting the quit message.
static HOOK_THREAD_ID: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static SINK: RefCell<Option<EventSink>> = const { RefCell::new(None) };
}

/// Backend using the Win32 low-level hook API.
pub struct WindowsBackend;

impl HookBackend for WindowsBackend {
    fn install(&self, sink: EventSink) -> Result<Box<dyn InstalledHook>, HookError> {
        if HOOK_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(HookError::AlreadyInstalled);
        }

        let (ready_tx, ready_rx) = bounded(1);
        let thread = thread::spawn(move || run_hook_loop(sink, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(WindowsHook {
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
                    "hook thread exited before signaling readiness".into(),
                ))
            }
        }
    }
}

struct WindowsHook {
    thread: Option<JoinHandle<()>>,
}

impl WindowsHook {
    fn shutdown(&mut self) {
        let thread = match self.thread.take() {
            Some(thread) => thread,
            None => return,
        };
        let thread_id = HOOK_THREAD_ID.load(Ordering::SeqCst);
        if thread_id != 0 {
            unsafe { PostThreadMessageW(thread_id, WM_QUIT, 0, 0) };
        }
        let _ = thread.join();
        HOOK_ACTIVE.store(false, Ordering::SeqCst);
    }
}

impl InstalledHook for WindowsHook {
    fn uninstall(mut self: Box<Self>) {
        self.shutdown();
    }
}

impl Drop for WindowsHook {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn install_error(hook_name: &str) -> HookError {
    let code = unsafe { GetLastError() };
    if code == ERROR_ACCESS_DENIED {
        HookError::PermissionDenied
    } else {
        HookError::Install(format!("{hook_name} failed, error {code}"))
    }
}

/// Entry point for the dedicated hook thread.
fn run_hook_loop(sink: EventSink, ready_tx: Sender<Result<(), HookError>>) {
    info!("hook thread started (WH_KEYBOARD_LL + WH_MOUSE_LL)");

    HOOK_THREAD_ID.store(unsafe { GetCurrentThreadId() }, Ordering::SeqCst);
    SINK.with(|slot| *slot.borrow_mut() = Some(sink));

    // Force message queue creation so WM_QUIT can reach this thread even if
    // teardown races the first GetMessageW call.
    let mut msg: MSG = unsafe { std::mem::zeroed() };
    unsafe { PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_NOREMOVE) };

    let keyboard_hook = unsafe {
        SetWindowsHookExW(
            WH_KEYBOARD_LL,
            Some(keyboard_proc),
            GetModuleHandleW(std::ptr::null()),
            0,
        )
    };
    if keyboard_hook.is_null() {
        let _ = ready_tx.send(Err(install_error("WH_KEYBOARD_LL")));
        cleanup_thread_state();
        return;
    }

    let mouse_hook = unsafe {
        SetWindowsHookExW(
            WH_MOUSE_LL,
            Some(mouse_proc),
            GetModuleHandleW(std::ptr::null()),
            0,
        )
    };
    if mouse_hook.is_null() {
        let error = install_error("WH_MOUSE_LL");
        unsafe { UnhookWindowsHookEx(keyboard_hook) };
        let _ = ready_tx.send(Err(error));
        cleanup_thread_state();
        return;
    }

    debug!("hooks installed, entering message loop");
    let _ = ready_tx.send(Ok(()));

    loop {
        let ret = unsafe { GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) };
        if ret <= 0 {
            // WM_QUIT or error
            break;
        }
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }

    unsafe {
        UnhookWindowsHookEx(keyboard_hook);
        UnhookWindowsHookEx(mouse_hook);
    }
    cleanup_thread_state();
    info!("hook thread exiting");
}

fn cleanup_thread_state() {
    SINK.with(|slot| slot.borrow_mut().take());
    HOOK_THREAD_ID.store(0, Ordering::SeqCst);
}

fn push_event(raw: RawEvent) {
    SINK.with(|slot| {
        if let Some(ref sink) = *slot.borrow() {
            sink.push(raw);
        }
    });
}

/// Low-level keyboard hook procedure. Runs on the hook thread with a strict
/// OS time budget; it must only enqueue.
unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = &*(lparam as *const KBDLLHOOKSTRUCT);
        let key = info.vkCode;
        let raw = match wparam as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(RawEvent::KeyPress { code: key }),
            WM_KEYUP | WM_SYSKEYUP => Some(RawEvent::KeyRelease { code: key }),
            _ => None,
        };
        if let Some(raw) = raw {
            push_event(raw);
        }
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}

fn xbutton_code(mouse_data: u32) -> u32 {
    if (mouse_data >> 16) as u16 == XBUTTON1 {
        BUTTON_X1
    } else {
        BUTTON_X2
    }
}

/// Low-level mouse hook procedure.
unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = &*(lparam as *const MSLLHOOKSTRUCT);
        let raw = match wparam as u32 {
            WM_LBUTTONDOWN => Some(RawEvent::ButtonPress {
                button: BUTTON_LEFT,
            }),
            WM_LBUTTONUP => Some(RawEvent::ButtonRelease {
                button: BUTTON_LEFT,
            }),
            WM_RBUTTONDOWN => Some(RawEvent::ButtonPress {
                button: BUTTON_RIGHT,
            }),
            WM_RBUTTONUP => Some(RawEvent::ButtonRelease {
                button: BUTTON_RIGHT,
            }),
            WM_MBUTTONDOWN => Some(RawEvent::ButtonPress {
                button: BUTTON_MIDDLE,
            }),
            WM_MBUTTONUP => Some(RawEvent::ButtonRelease {
                button: BUTTON_MIDDLE,
            }),
            WM_XBUTTONDOWN => Some(RawEvent::ButtonPress {
                button: xbutton_code(info.mouseData),
            }),
            WM_XBUTTONUP => Some(RawEvent::ButtonRelease {
                button: xbutton_code(info.mouseData),
            }),
            WM_MOUSEMOVE => Some(RawEvent::MouseMove {
                x: info.pt.x as f64,
                y: info.pt.y as f64,
            }),
            WM_MOUSEWHEEL => Some(RawEvent::Wheel {
                delta_x: 0,
                delta_y: (((info.mouseData >> 16) as i16) as i64) / 120,
            }),
            _ => None,
        };
        if let Some(raw) = raw {
            push_event(raw);
        }
    }
    CallNextHookEx(std::ptr::null_mut(), code, wparam, lparam)
}
