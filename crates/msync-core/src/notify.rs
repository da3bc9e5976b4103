use std::time::Duration;

/// How long a toast stays up before its dismiss timer fires.
pub const TOAST_DURATION: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
}

/// Single-slot notification surface. Showing a toast always replaces the
/// current one. Each toast carries a generation number; a dismiss only
/// clears the slot if its generation still matches, so a timer scheduled
/// for an already-replaced toast can never hide its successor.
#[derive(Debug, Default)]
pub struct Notifier {
    slot: Option<Toast>,
    generation: u64,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot and return the generation the caller should hand
    /// to its dismiss timer.
    pub fn show(&mut self, message: impl Into<String>, severity: Severity) -> u64 {
        self.generation += 1;
        self.slot = Some(Toast {
            message: message.into(),
            severity,
        });
        self.generation
    }

    /// Clear the slot if `generation` identifies the toast currently
    /// shown. Returns whether anything was cleared.
    pub fn dismiss(&mut self, generation: u64) -> bool {
        if self.slot.is_some() && self.generation == generation {
            self.slot = None;
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&Toast> {
        self.slot.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_replaces_current_toast() {
        let mut notifier = Notifier::new();
        notifier.show("first", Severity::Success);
        notifier.show("second", Severity::Error);
        let current = notifier.current().unwrap();
        assert_eq!(current.message, "second");
        assert_eq!(current.severity, Severity::Error);
    }

    #[test]
    fn dismiss_clears_matching_generation() {
        let mut notifier = Notifier::new();
        let generation = notifier.show("hello", Severity::Success);
        assert!(notifier.dismiss(generation));
        assert!(notifier.current().is_none());
    }

    #[test]
    fn stale_timer_cannot_hide_a_newer_toast() {
        // Regression for the replacement race: A's timer fires after B
        // was shown and must leave B visible.
        let mut notifier = Notifier::new();
        let a = notifier.show("A", Severity::Error);
        let b = notifier.show("B", Severity::Success);
        assert!(!notifier.dismiss(a));
        assert_eq!(notifier.current().unwrap().message, "B");
        assert!(notifier.dismiss(b));
        assert!(notifier.current().is_none());
    }

    #[test]
    fn dismiss_on_empty_slot_is_a_no_op() {
        let mut notifier = Notifier::new();
        let generation = notifier.show("once", Severity::Success);
        assert!(notifier.dismiss(generation));
        assert!(!notifier.dismiss(generation));
    }
}
