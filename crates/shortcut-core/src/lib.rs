//! shortcut-core: platform-independent pipeline of the global input listener.
//!
//! This crate provides everything except the OS hooks themselves:
//!
//! - `event` - Canonical event taxonomy and raw-event normalization
//! - `filter` - Optional single-key filter
//! - `hook` - The `HookBackend` seam platform crates implement
//! - `dispatch` - Queue + worker pair isolating the OS hook thread from
//!   consumer code
//! - `listener` - Lifecycle manager enforcing "one active hook per process"
//!
//! Platform backends live in `shortcut-platform`; this crate is fully
//! testable without installing a real hook.

mod dispatch;
mod event;
mod filter;
mod hook;
mod listener;

pub use dispatch::EventCallback;
pub use event::{
    normalize, EventType, InputEvent, RawEvent, BUTTON_LEFT, BUTTON_MIDDLE, BUTTON_RIGHT,
    BUTTON_X1, BUTTON_X2,
};
pub use filter::KeyFilter;
pub use hook::{EventSink, HookBackend, HookError, InstalledHook};
pub use listener::{Listener, ListenerConfig, ListenerError};
