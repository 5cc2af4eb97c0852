//! Monotonic time source and periodic deadlines.
//!
//! The daemon never reads the clock directly: everything goes through a
//! [`Timer`] so the roam sequence's settle waits can run on virtual time
//! under test.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use quanta::{Clock, Instant, Mock};

/// Monotonic clock plus a blocking sleep.
pub trait Timer {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

impl<T: Timer + ?Sized> Timer for Box<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall-clock timer backed by the TSC-calibrated `quanta` clock.
#[derive(Debug, Clone)]
pub struct SystemTimer {
    clock: Clock,
}

impl SystemTimer {
    pub fn new() -> Self {
        SystemTimer {
            clock: Clock::new(),
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for SystemTimer {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual-time timer: `sleep` advances the mock clock instantly and is
/// recorded so tests can assert on the wait sequence.
pub struct ManualTimer {
    clock: Clock,
    mock: Arc<Mock>,
    sleeps: RefCell<Vec<Duration>>,
}

/// Starting offset so `now - age` arithmetic never saturates at zero.
const MANUAL_EPOCH: Duration = Duration::from_secs(3600);

impl ManualTimer {
    pub fn new() -> Self {
        let (clock, mock) = Clock::mock();
        mock.increment(MANUAL_EPOCH);
        ManualTimer {
            clock,
            mock,
            sleeps: RefCell::new(Vec::new()),
        }
    }

    /// A handle on the same virtual clock (e.g. for a scripted radio).
    pub fn clock(&self) -> Clock {
        self.clock.clone()
    }

    pub fn advance(&self, duration: Duration) {
        self.mock.increment(duration);
    }

    /// Every duration passed to [`Timer::sleep`] so far.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for ManualTimer {
    fn now(&self) -> Instant {
        self.clock.now()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.mock.increment(duration);
    }
}

/// A periodic task tracked by its next deadline. Due immediately after
/// construction; each run schedules the next one a full period later.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next_due: Option<Instant>,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        Cadence {
            period,
            next_due: None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_none_or(|due| now >= due)
    }

    pub fn mark_run(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    /// Time left until the next deadline (zero when already due).
    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
