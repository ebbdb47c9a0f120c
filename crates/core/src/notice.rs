//! Removal notices and their auto-dismiss timer.
//!
//! The notice slot holds at most one notice. Showing a notice bumps a
//! generation counter and hands back a [`NoticeHandle`]; whoever runs the
//! timer calls [`NoticeSlot::expire`] with that handle when it fires. A
//! handle from a superseded notice no longer matches and expiring it is a
//! no-op, so a late timer can never dismiss a newer notice.

use std::time::Duration;

use serde::Serialize;

/// How long a removal notice stays up before it dismisses itself.
pub const NOTICE_DISMISS_AFTER: Duration = Duration::from_secs(6);

/// `"1 recipient"`, `"3 recipients"`.
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// A toast-style message, optionally offering undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub show_undo: bool,
}

impl Notice {
    /// Notice for a removal of `count` rows.
    pub fn removed(count: usize) -> Self {
        Self {
            message: format!("Removed {}", pluralize(count, "recipient", "recipients")),
            show_undo: true,
        }
    }
}

/// Identifies one scheduled dismissal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoticeHandle {
    generation: u64,
    /// Delay after which the dismissal should fire.
    #[serde(skip)]
    pub dismiss_after: Duration,
}

impl NoticeHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoticeSlot {
    current: Option<(Notice, u64)>,
    generation: u64,
}

impl NoticeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `notice`, superseding any notice already up.
    pub fn show(&mut self, notice: Notice, dismiss_after: Duration) -> NoticeHandle {
        self.generation += 1;
        self.current = Some((notice, self.generation));
        NoticeHandle {
            generation: self.generation,
            dismiss_after,
        }
    }

    pub fn current(&self) -> Option<&Notice> {
        self.current.as_ref().map(|(notice, _)| notice)
    }

    pub fn is_current(&self, handle: NoticeHandle) -> bool {
        matches!(self.current, Some((_, generation)) if generation == handle.generation)
    }

    /// Dismiss whatever is showing. Returns `true` if something was.
    pub fn dismiss(&mut self) -> bool {
        self.current.take().is_some()
    }

    /// Timer callback: dismiss only if `handle` is still the live notice.
    pub fn expire(&mut self, handle: NoticeHandle) -> bool {
        if self.is_current(handle) {
            self.current = None;
            true
        } else {
            false
        }
    }
}
