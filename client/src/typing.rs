use std::time::Duration;

use tokio::time::Instant;

/// Quiet window after which a typing indication auto-expires without a
/// renewing ping.
pub const QUIET_WINDOW: Duration = Duration::from_secs(3);

/// Typing indication for the active room: Idle or TypingShown(username).
///
/// A ping (re)arms the quiet-window deadline — a debounce, not a throttle —
/// and message arrival is treated as an implicit end-of-typing signal.
#[derive(Debug)]
pub struct TypingTracker {
    quiet_window: Duration,
    shown: Option<Shown>,
}

#[derive(Debug)]
struct Shown {
    username: String,
    deadline: Instant,
}

impl TypingTracker {
    pub fn new(quiet_window: Duration) -> Self {
        Self {
            quiet_window,
            shown: None,
        }
    }

    /// Record a ping from a (non-self) participant. A fresh ping cancels and
    /// restarts the pending expiry; a ping from a different user replaces the
    /// shown indication.
    pub fn note_ping(&mut self, username: &str) {
        self.shown = Some(Shown {
            username: username.to_string(),
            deadline: Instant::now() + self.quiet_window,
        });
    }

    /// The user whose indicator is currently shown, if any.
    pub fn typing_user(&self) -> Option<&str> {
        self.shown.as_ref().map(|shown| shown.username.as_str())
    }

    /// When the current indication should expire, if one is shown.
    pub fn deadline(&self) -> Option<Instant> {
        self.shown.as_ref().map(|shown| shown.deadline)
    }

    /// Timer-expiry transition. Clears only if the deadline has actually
    /// passed — a fresh ping may have re-armed it since the timer was set.
    /// Returns whether the indication was cleared.
    pub fn expire(&mut self, now: Instant) -> bool {
        match &self.shown {
            Some(shown) if shown.deadline <= now => {
                self.shown = None;
                true
            }
            _ => false,
        }
    }

    /// Unconditional reset (message arrival, local send, room switch).
    /// Returns whether an indication was actually shown.
    pub fn clear(&mut self) -> bool {
        self.shown.take().is_some()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(QUIET_WINDOW)
    }
}
