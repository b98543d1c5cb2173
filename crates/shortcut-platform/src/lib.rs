//! shortcut-platform: OS hook backends and the process-global listening
//! facade.
//!
//! Platform implementations of the core's `HookBackend`:
//! - Windows: WH_KEYBOARD_LL + WH_MOUSE_LL on a message-loop thread
//!   (`windows.rs`)
//! - macOS: CGEventTap on a CFRunLoop thread (`macos.rs`)
//! - Linux: rdev listener on a process-lifetime thread (`linux.rs`)
//!
//! The facade mirrors the historical public surface: one listener per
//! process, `start_listening(callback, specific_key)` with `0` meaning all
//! keys, and an unconditionally safe `stop_listening`.

#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
compile_error!("shortcut-platform supports Windows, macOS, and Linux only");

#[cfg(target_os = "windows")]
pub use windows::WindowsBackend as PlatformBackend;

#[cfg(target_os = "macos")]
pub use macos::MacosBackend as PlatformBackend;

#[cfg(target_os = "linux")]
pub use linux::LinuxBackend as PlatformBackend;

pub use shortcut_core::{
    EventType, HookError, InputEvent, KeyFilter, Listener, ListenerConfig, ListenerError,
};

use std::sync::OnceLock;

static GLOBAL_LISTENER: OnceLock<Listener> = OnceLock::new();

/// The process-wide listener backed by this platform's native hook.
pub fn global_listener() -> &'static Listener {
    GLOBAL_LISTENER.get_or_init(|| Listener::new(Box::new(PlatformBackend)))
}

/// Start delivering global input events to `callback`.
///
/// `specific_key` of `0` listens to every code; any other value delivers
/// only events whose code matches, regardless of event type. The callback
/// runs on a dedicated dispatch thread.
pub fn start_listening<F>(callback: F, specific_key: u32) -> Result<(), ListenerError>
where
    F: FnMut(InputEvent) + Send + 'static,
{
    global_listener().start(callback, KeyFilter::from_code(specific_key))
}

/// Stop the active listener and release the hook.
///
/// A no-op when nothing is listening. Once this returns, the callback will
/// not be invoked again.
pub fn stop_listening() {
    global_listener().stop();
}
