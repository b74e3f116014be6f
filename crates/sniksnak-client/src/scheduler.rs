//! Recurring poll timer.
//!
//! Deadline-based and sans-IO: the caller passes the current instant and the
//! scheduler answers whether a poll is due. The timer is armed at most once
//! and cancellation is permanent.

use std::{ops::Add, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState<I> {
    Idle,
    Armed { next_due: I },
    Cancelled,
}

/// Owned poll timer with explicit `start`/`cancel`.
#[derive(Debug, Clone)]
pub struct Scheduler<I> {
    interval: Duration,
    state: TimerState<I>,
}

impl<I> Scheduler<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Idle timer firing every `interval` once started.
    pub fn new(interval: Duration) -> Self {
        Self { interval, state: TimerState::Idle }
    }

    /// Arm the timer. The first poll is due one interval from `now`.
    ///
    /// Returns `false` if already armed or cancelled.
    pub fn start(&mut self, now: I) -> bool {
        match self.state {
            TimerState::Idle => {
                self.state = TimerState::Armed { next_due: now + self.interval };
                true
            },
            TimerState::Armed { .. } | TimerState::Cancelled => false,
        }
    }

    /// Tear the timer down for good.
    pub fn cancel(&mut self) {
        self.state = TimerState::Cancelled;
    }

    /// Whether the timer is armed.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed { .. })
    }

    /// Whether the timer has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, TimerState::Cancelled)
    }

    /// Next deadline, if armed.
    pub fn next_due(&self) -> Option<I> {
        match self.state {
            TimerState::Armed { next_due } => Some(next_due),
            TimerState::Idle | TimerState::Cancelled => None,
        }
    }

    /// Returns true if a poll is due at `now`, and schedules the next one.
    pub fn poll(&mut self, now: I) -> bool {
        match self.state {
            TimerState::Armed { next_due } if now >= next_due => {
                self.state = TimerState::Armed { next_due: now + self.interval };
                true
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn idle_timer_never_fires() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new(SECOND);

        assert!(!scheduler.poll(t0 + SECOND * 10));
        assert!(!scheduler.is_armed());
    }

    #[test]
    fn fires_each_interval() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new(SECOND);
        scheduler.start(t0);

        assert!(!scheduler.poll(t0 + SECOND / 2));
        assert!(scheduler.poll(t0 + SECOND));
        assert!(!scheduler.poll(t0 + SECOND));
        assert!(scheduler.poll(t0 + SECOND * 2));
    }

    #[test]
    fn armed_exactly_once() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new(SECOND);

        assert!(scheduler.start(t0));
        assert!(!scheduler.start(t0 + SECOND * 5));
        assert_eq!(scheduler.next_due(), Some(t0 + SECOND));
    }

    #[test]
    fn cancel_is_permanent() {
        let t0 = Instant::now();
        let mut scheduler = Scheduler::new(SECOND);
        scheduler.start(t0);
        scheduler.cancel();

        assert!(!scheduler.poll(t0 + SECOND * 3));
        assert!(!scheduler.start(t0));
        assert!(scheduler.is_cancelled());
        assert_eq!(scheduler.next_due(), None);
    }
}
