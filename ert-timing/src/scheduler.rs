use crate::clock::Clock;
use crate::sleep::precise_sleep;
use std::time::Duration;

/// Interval between input/clock checks while blocked in `wait_until`.
/// Bounds cancellation latency.
const POLL_INTERVAL: Duration = Duration::from_micros(500);

/// What the input poll reports on each iteration of a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    Continue,
    /// User asked to end the session.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The deadline passed; `clock.now() >= deadline` held at return.
    Elapsed,
    Cancelled,
}

/// The single next-flip deadline. Display changes are serialized
/// against it: a screen may only be committed once the deadline has
/// passed, and committing advances the deadline by that screen's
/// duration. The deadline only ever increases, except for an explicit
/// reset to "now" (after the scanner trigger, or after a keypress-ended
/// rating, where waiting latency must not become timing debt).
#[derive(Debug, Clone, Default)]
pub struct FlipScheduler {
    deadline: Duration,
}

impl FlipScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// deadline += increment. Zero and fractional-second increments are
    /// fine; no other side effects.
    pub fn advance(&mut self, increment: Duration) {
        self.deadline += increment;
    }

    pub fn reset_to(&mut self, now: Duration) {
        self.deadline = now;
    }

    pub fn reset_to_now<C: Clock>(&mut self, clock: &C) {
        self.deadline = clock.now();
    }

    pub fn is_due(&self, now: Duration) -> bool {
        now >= self.deadline
    }

    pub fn remaining(&self, now: Duration) -> Duration {
        self.deadline.saturating_sub(now)
    }

    /// Blocks until the deadline passes, servicing `poll` on every
    /// iteration so a cancel request is honored within one poll
    /// interval even mid-wait. There is no timeout: this waits
    /// indefinitely for either the deadline or a cancel.
    pub fn wait_until<C, F>(&self, clock: &C, mut poll: F) -> WaitOutcome
    where
        C: Clock,
        F: FnMut() -> Poll,
    {
        loop {
            if poll() == Poll::Cancel {
                return WaitOutcome::Cancelled;
            }
            if self.is_due(clock.now()) {
                return WaitOutcome::Elapsed;
            }
            precise_sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn advance_is_monotonic() {
        let mut sched = FlipScheduler::new();
        let mut prev = sched.deadline();
        for inc_ms in [0u64, 1, 250, 0, 1500] {
            sched.advance(Duration::from_millis(inc_ms));
            assert!(sched.deadline() >= prev);
            prev = sched.deadline();
        }
    }

    #[test]
    fn advance_accumulates_fractional_increments() {
        let mut sched = FlipScheduler::new();
        sched.advance(Duration::from_secs_f64(2.5));
        sched.advance(Duration::from_secs_f64(0.75));
        assert_eq!(sched.deadline(), Duration::from_secs_f64(3.25));
    }

    #[test]
    fn reset_moves_deadline_to_now() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(10));
        let mut sched = FlipScheduler::new();
        sched.advance(Duration::from_secs(99));
        sched.reset_to_now(&clock);
        assert_eq!(sched.deadline(), Duration::from_secs(10));
        assert!(sched.is_due(clock.now()));
    }

    #[test]
    fn wait_never_returns_elapsed_early() {
        let clock = ManualClock::new();
        let mut sched = FlipScheduler::new();
        sched.advance(Duration::from_millis(20));

        let poll_clock = clock.clone();
        let outcome = sched.wait_until(&clock, move || {
            // Simulate time passing one millisecond per poll.
            poll_clock.advance(Duration::from_millis(1));
            Poll::Continue
        });

        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert!(clock.now() >= sched.deadline());
    }

    #[test]
    fn cancel_is_honored_within_one_poll() {
        let clock = ManualClock::new();
        let mut sched = FlipScheduler::new();
        // Deadline far in the future; only the cancel can end the wait.
        sched.advance(Duration::from_secs(3600));

        let mut polls = 0u32;
        let outcome = sched.wait_until(&clock, || {
            polls += 1;
            Poll::Cancel
        });

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert_eq!(polls, 1);
    }

    #[test]
    fn due_deadline_returns_without_sleeping() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_secs(5));
        let mut sched = FlipScheduler::new();
        sched.reset_to(Duration::from_secs(5));

        let mut polls = 0u32;
        let outcome = sched.wait_until(&clock, || {
            polls += 1;
            Poll::Continue
        });
        assert_eq!(outcome, WaitOutcome::Elapsed);
        assert_eq!(polls, 1);
    }
}
