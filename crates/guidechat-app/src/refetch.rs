//! Fixed-interval refetch schedule.
//!
//! Used by views that poll a REST listing instead of holding a live
//! subscription. Independent of the room session state machine.

use std::{ops::Sub, time::Duration};

/// Tracks when a polled resource is next due.
#[derive(Debug, Clone)]
pub struct RefetchSchedule<I> {
    interval: Duration,
    last: Option<I>,
}

impl<I> RefetchSchedule<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Poll interval used by the message list view.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

    /// Shortest accepted interval.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

    /// Schedule with the given interval, raised to [`Self::MIN_INTERVAL`] if
    /// shorter. The first poll is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self { interval: interval.max(Self::MIN_INTERVAL), last: None }
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A fetch is due at `now`.
    pub fn is_due(&self, now: I) -> bool {
        self.last.is_none_or(|last| now - last >= self.interval)
    }

    /// Returns `true` and records the fetch if one is due.
    pub fn poll(&mut self, now: I) -> bool {
        if self.is_due(now) {
            self.last = Some(now);
            true
        } else {
            false
        }
    }

    /// Make the next poll due immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl<I> Default for RefetchSchedule<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}
