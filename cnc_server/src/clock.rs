//! Wall-clock sources for kinematics sampling and heartbeats.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::time::Duration;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock.
///
/// Time only moves through [`ManualClock::set`], [`ManualClock::advance`],
/// or the optional per-reading step.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualInner>,
}

#[derive(Debug)]
struct ManualInner {
    now: DateTime<Utc>,
    step: ChronoDuration,
}

impl ManualClock {
    /// Clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::stepping(start, Duration::ZERO)
    }

    /// Clock that returns `start` on the first reading and moves forward by
    /// `step` after every reading.
    pub fn stepping(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: start,
                step: to_chrono(step),
            }),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, now: DateTime<Utc>) {
        self.inner.lock().now = now;
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        let next = saturating_add(inner.now, to_chrono(by));
        inner.now = next;
    }

    /// Time the next reading will return, without consuming a step.
    pub fn peek(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut inner = self.inner.lock();
        let now = inner.now;
        let step = inner.step;
        inner.now = saturating_add(now, step);
        now
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or(ChronoDuration::MAX)
}

/// Pins at the latest representable instant instead of overflowing.
fn saturating_add(at: DateTime<Utc>, by: ChronoDuration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
