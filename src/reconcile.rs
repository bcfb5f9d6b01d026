//! Client-side optimistic reconciliation.
//!
//! One [`Reconciler`] per logical control (each valve toggle, the fan
//! level). A user action renders immediately and opens a bounded window
//! during which server updates that *contradict* the prediction are
//! presumed stale and suppressed, while updates that *confirm* it are
//! accepted at once. After the window lapses, server truth wins
//! unconditionally — covering commands that were rejected or superseded.
//!
//! ```text
//!            user input            confirming update
//!   IDLE ───────────────▶ PENDING ──────────────────▶ IDLE
//!     ▲                     │   │
//!     │   window lapsed /   │   │ contradicting update,
//!     └─────────────────────┘   │ window still open
//!         error reply           ▼
//!                            (suppressed)
//! ```
//!
//! Expiry is a wall-clock comparison against the armed deadline, not a
//! rescheduled timer, so the machine is insensitive to tick granularity.
//! Callers pass `now` explicitly; tests never need to sleep.

use std::time::{Duration, Instant};

/// Reference window: longer than one command round-trip, well under the
/// telemetry period, so confirmations always win before the next tick.
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

/// What to do with an incoming server value for this control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition<T> {
    /// Render this value.
    Render(T),
    /// Discard it — presumed stale relative to the user's last action.
    Suppress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase<T> {
    Idle,
    Pending { predicted: T, expires_at: Instant },
}

/// Per-control optimistic state machine.
#[derive(Debug, Clone)]
pub struct Reconciler<T> {
    window: Duration,
    phase: Phase<T>,
    /// Most recent server-truth value, including ones that were suppressed
    /// from rendering. This is what an error reply reverts to.
    last_authoritative: Option<T>,
}

impl<T: Copy + PartialEq> Reconciler<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            phase: Phase::Idle,
            last_authoritative: None,
        }
    }

    /// The user acted on this control: record the prediction, arm the
    /// window, and return the value to render immediately.
    pub fn user_input(&mut self, predicted: T, now: Instant) -> T {
        self.phase = Phase::Pending {
            predicted,
            expires_at: now + self.window,
        };
        predicted
    }

    /// A server state update arrived for this control.
    pub fn server_update(&mut self, value: T, now: Instant) -> Disposition<T> {
        // Every received value is server truth, rendered or not.
        self.last_authoritative = Some(value);

        match self.phase {
            Phase::Idle => Disposition::Render(value),
            Phase::Pending {
                predicted,
                expires_at,
            } => {
                if value == predicted {
                    // Confirmation arrived — accept early.
                    self.phase = Phase::Idle;
                    Disposition::Render(value)
                } else if now < expires_at {
                    Disposition::Suppress
                } else {
                    // Window lapsed: the command was rejected or superseded.
                    self.phase = Phase::Idle;
                    Disposition::Render(value)
                }
            }
        }
    }

    /// An error reply tied to the user's last command: drop the prediction
    /// and return the value to revert the display to, if one is known.
    pub fn command_failed(&mut self) -> Option<T> {
        self.phase = Phase::Idle;
        self.last_authoritative
    }

    /// Transport loss: every pending prediction is abandoned. The next
    /// server event re-establishes the authoritative value.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Whether a prediction is still armed at `now`.
    pub fn is_pending(&self, now: Instant) -> bool {
        matches!(self.phase, Phase::Pending { expires_at, .. } if now < expires_at)
    }

    /// Last value received from the server, rendered or suppressed.
    pub fn last_authoritative(&self) -> Option<T> {
        self.last_authoritative
    }
}

impl<T: Copy + PartialEq> Default for Reconciler<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn confirmation_accepts_early_and_renders() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        assert!(r.user_input(true, base));
        assert_eq!(r.server_update(true, at(base, 100)), Disposition::Render(true));
        assert!(!r.is_pending(at(base, 100)));
    }

    #[test]
    fn contradiction_is_suppressed_inside_the_window() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(true, base);
        assert_eq!(r.server_update(false, at(base, 100)), Disposition::Suppress);
        assert!(r.is_pending(at(base, 100)), "prediction must survive the echo");
    }

    #[test]
    fn contradiction_wins_after_the_window() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(true, base);
        assert_eq!(
            r.server_update(false, at(base, 600)),
            Disposition::Render(false),
            "server truth wins once the window has lapsed"
        );
        assert!(!r.is_pending(at(base, 600)));
    }

    #[test]
    fn idle_renders_everything() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        assert_eq!(r.server_update(3_u8, base), Disposition::Render(3));
        assert_eq!(r.server_update(7_u8, at(base, 1)), Disposition::Render(7));
    }

    #[test]
    fn error_reply_reverts_to_last_authoritative() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.server_update(false, base);
        r.user_input(true, at(base, 10));
        assert_eq!(r.command_failed(), Some(false));
        assert!(!r.is_pending(at(base, 20)));
    }

    #[test]
    fn suppressed_values_still_count_as_authoritative() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(true, base);
        // A contradicting echo is suppressed from rendering but is still
        // the latest server truth an error reply should revert to.
        assert_eq!(r.server_update(false, at(base, 50)), Disposition::Suppress);
        assert_eq!(r.command_failed(), Some(false));
    }

    #[test]
    fn repeated_input_rearms_the_window() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(true, base);
        r.user_input(false, at(base, 400));
        // 700 ms after the first input but only 300 ms after the second:
        // the contradiction of the *latest* prediction is still suppressed.
        assert_eq!(r.server_update(true, at(base, 700)), Disposition::Suppress);
    }

    #[test]
    fn reset_abandons_pending_predictions() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(42_u8, base);
        r.reset();
        assert!(!r.is_pending(at(base, 1)));
        assert_eq!(r.server_update(10, at(base, 2)), Disposition::Render(10));
    }

    #[test]
    fn exact_expiry_instant_accepts_server_truth() {
        let base = Instant::now();
        let mut r = Reconciler::new(DEFAULT_WINDOW);

        r.user_input(true, base);
        // now == expires_at: the window is half-open — suppression applies
        // strictly before the deadline.
        assert_eq!(
            r.server_update(false, at(base, 500)),
            Disposition::Render(false)
        );
    }
}
