//! Optional single-key filter gating event delivery.

use crate::event::InputEvent;

/// Which event codes the listener delivers.
///
/// The public facade treats code `0` as "listen to everything"; internally
/// that sentinel is resolved into an explicit variant so a legitimate key
/// code can never be confused with "no filter".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyFilter {
    /// Deliver every event.
    #[default]
    All,
    /// Deliver only events whose code matches.
    Only(u32),
}

impl KeyFilter {
    /// Build a filter from the wire representation (`0` means all keys).
    pub fn from_code(code: u32) -> Self {
        if code == 0 {
            KeyFilter::All
        } else {
            KeyFilter::Only(code)
        }
    }

    /// Whether `event` passes the filter.
    ///
    /// The comparison is on `code` only; all four event types are treated
    /// identically.
    pub fn matches(&self, event: &InputEvent) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Only(code) => event.code == *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn event(event_type: EventType, code: u32) -> InputEvent {
        InputEvent { event_type, code }
    }

    #[test]
    fn test_zero_code_means_all() {
        assert_eq!(KeyFilter::from_code(0), KeyFilter::All);
        assert_eq!(KeyFilter::from_code(7), KeyFilter::Only(7));
    }

    #[test]
    fn test_all_matches_everything() {
        let filter = KeyFilter::All;
        assert!(filter.matches(&event(EventType::KeyDown, 5)));
        assert!(filter.matches(&event(EventType::MouseUp, 1)));
    }

    #[test]
    fn test_only_matches_by_code_across_types() {
        let filter = KeyFilter::Only(7);
        assert!(filter.matches(&event(EventType::KeyDown, 7)));
        assert!(filter.matches(&event(EventType::KeyUp, 7)));
        assert!(filter.matches(&event(EventType::MouseDown, 7)));
        assert!(!filter.matches(&event(EventType::KeyDown, 5)));
    }
}
