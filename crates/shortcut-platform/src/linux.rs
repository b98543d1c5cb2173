//! Linux hook backend.
//!
//! Built on `rdev::listen`, which grabs X11/evdev input but can never be
//! stopped once started. The listener thread therefore lives for the rest of
//! the process and install/uninstall bind and clear a single subscriber
//! slot; an empty slot means events go nowhere.

use rdev::{listen, Button, Event, EventType, Key};
use shortcut_core::{
    EventSink, HookBackend, HookError, InstalledHook, RawEvent, BUTTON_LEFT, BUTTON_MIDDLE,
    BUTTON_RIGHT, BUTTON_X1, BUTTON_X2,
};
use std::sync::{Mutex, OnceLock};
use std::thread;
use tracing::{error, info};

// The active subscriber, fed by the listener thread.
static SLOT: Mutex<Option<EventSink>> = Mutex::new(None);

// Listener thread is spawned at most once per process.
static LISTENER_STARTED: OnceLock<()> = OnceLock::new();

// Set when rdev::listen fails; later installs fail synchronously.
static LISTENER_FAULT: Mutex<Option<String>> = Mutex::new(None);

/// Backend using the rdev global listener.
pub struct LinuxBackend;

impl HookBackend for LinuxBackend {
    fn install(&self, sink: EventSink) -> Result<Box<dyn InstalledHook>, HookError> {
        if let Ok(fault) = LISTENER_FAULT.lock() {
            if let Some(reason) = fault.as_ref() {
                error!(%reason, "input listener previously failed");
                return Err(HookError::PermissionDenied);
            }
        }

        {
            let mut slot = match SLOT.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_some() {
                return Err(HookError::AlreadyInstalled);
            }
            *slot = Some(sink);
        }

        LISTENER_STARTED.get_or_init(|| {
            thread::spawn(run_listener);
        });

        Ok(Box::new(LinuxHook))
    }
}

struct LinuxHook;

impl InstalledHook for LinuxHook {
    fn uninstall(self: Box<Self>) {
        if let Ok(mut slot) = SLOT.lock() {
            slot.take();
        }
    }
}

fn run_listener() {
    info!("input listener thread started (rdev)");

    let result = listen(|event: Event| {
        if let Some(raw) = convert_event(&event.event_type) {
            if let Ok(slot) = SLOT.lock() {
                if let Some(ref sink) = *slot {
                    sink.push(raw);
                }
            }
        }
    });

    if let Err(listen_error) = result {
        let reason = format!("{listen_error:?}");
        error!(%reason, "input listener failed");
        if let Ok(mut fault) = LISTENER_FAULT.lock() {
            *fault = Some(reason.clone());
        }
        if let Ok(mut slot) = SLOT.lock() {
            if let Some(sink) = slot.take() {
                sink.fail(HookError::Lost(reason));
            }
        }
    }

    info!("input listener thread exiting");
}

fn convert_event(event_type: &EventType) -> Option<RawEvent> {
    match event_type {
        EventType::KeyPress(key) => Some(RawEvent::KeyPress {
            code: key_code(*key),
        }),
        EventType::KeyRelease(key) => Some(RawEvent::KeyRelease {
            code: key_code(*key),
        }),
        EventType::ButtonPress(button) => Some(RawEvent::ButtonPress {
            button: button_code(*button),
        }),
        EventType::ButtonRelease(button) => Some(RawEvent::ButtonRelease {
            button: button_code(*button),
        }),
        EventType::MouseMove { x, y } => Some(RawEvent::MouseMove { x: *x, y: *y }),
        EventType::Wheel { delta_x, delta_y } => Some(RawEvent::Wheel {
            delta_x: *delta_x,
            delta_y: *delta_y,
        }),
    }
}

fn button_code(button: Button) -> u32 {
    match button {
        Button::Left => BUTTON_LEFT,
        Button::Right => BUTTON_RIGHT,
        Button::Middle => BUTTON_MIDDLE,
        // X11 numbers the side buttons 8 and 9.
        Button::Unknown(8) => BUTTON_X1,
        Button::Unknown(9) => BUTTON_X2,
        Button::Unknown(code) => code as u32,
    }
}

/// Map an rdev key to its evdev keycode (input-event-codes.h).
fn key_code(key: Key) -> u32 {
    match key {
        Key::Escape => 1,
        Key::Num1 => 2,
        Key::Num2 => 3,
        Key::Num3 => 4,
        Key::Num4 => 5,
        Key::Num5 => 6,
        Key::Num6 => 7,
        Key::Num7 => 8,
        Key::Num8 => 9,
        Key::Num9 => 10,
        Key::Num0 => 11,
        Key::Minus => 12,
        Key::Equal => 13,
        Key::Backspace => 14,
        Key::Tab => 15,
        Key::KeyQ => 16,
        Key::KeyW => 17,
        Key::KeyE => 18,
        Key::KeyR => 19,
        Key::KeyT => 20,
        Key::KeyY => 21,
        Key::KeyU => 22,
        Key::KeyI => 23,
        Key::KeyO => 24,
        Key::KeyP => 25,
        Key::LeftBracket => 26,
        Key::RightBracket => 27,
        Key::Return => 28,
        Key::ControlLeft => 29,
        Key::KeyA => 30,
        Key::KeyS => 31,
        Key::KeyD => 32,
        Key::KeyF => 33,
        Key::KeyG => 34,
        Key::KeyH => 35,
        Key::KeyJ => 36,
        Key::KeyK => 37,
        Key::KeyL => 38,
        Key::SemiColon => 39,
        Key::Quote => 40,
        Key::BackQuote => 41,
        Key::ShiftLeft => 42,
        Key::BackSlash => 43,
        Key::IntlBackslash => 43,
        Key::KeyZ => 44,
        Key::KeyX => 45,
        Key::KeyC => 46,
        Key::KeyV => 47,
        Key::KeyB => 48,
        Key::KeyN => 49,
        Key::KeyM => 50,
        Key::Comma => 51,
        Key::Dot => 52,
        Key::Slash => 53,
        Key::ShiftRight => 54,
        Key::KpMultiply => 55,
        Key::Alt => 56,
        Key::Space => 57,
        Key::CapsLock => 58,
        Key::F1 => 59,
        Key::F2 => 60,
        Key::F3 => 61,
        Key::F4 => 62,
        Key::F5 => 63,
        Key::F6 => 64,
        Key::F7 => 65,
        Key::F8 => 66,
        Key::F9 => 67,
        Key::F10 => 68,
        Key::NumLock => 69,
        Key::ScrollLock => 70,
        Key::Kp7 => 71,
        Key::Kp8 => 72,
        Key::Kp9 => 73,
        Key::KpMinus => 74,
        Key::Kp4 => 75,
        Key::Kp5 => 76,
        Key::Kp6 => 77,
        Key::KpPlus => 78,
        Key::Kp1 => 79,
        Key::Kp2 => 80,
        Key::Kp3 => 81,
        Key::Kp0 => 82,
        Key::KpDelete => 83,
        Key::F11 => 87,
        Key::F12 => 88,
        Key::KpReturn => 96,
        Key::ControlRight => 97,
        Key::KpDivide => 98,
        Key::PrintScreen => 99,
        Key::AltGr => 100,
        Key::Home => 102,
        Key::UpArrow => 103,
        Key::PageUp => 104,
        Key::LeftArrow => 105,
        Key::RightArrow => 106,
        Key::End => 107,
        Key::DownArrow => 108,
        Key::PageDown => 109,
        Key::Insert => 110,
        Key::Delete => 111,
        Key::Pause => 119,
        Key::MetaLeft => 125,
        Key::MetaRight => 126,
        Key::Function => 464,
        Key::Unknown(code) => code,
    }
}
