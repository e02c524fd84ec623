//! Time source and suspension points for the capture sequence.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock plus sleep used by capture sessions.
pub trait Scheduler: Send + Sync {
    /// Current time in Unix epoch milliseconds.
    fn now_ms(&self) -> u64;

    /// Suspends the sequence for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock scheduler backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemScheduler;

impl Scheduler for SystemScheduler {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |duration| duration.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Fake clock that advances instantly and records every sleep.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualClockState>,
}

#[derive(Debug)]
struct ManualClockState {
    now_ms: u64,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    /// Creates a clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            state: Mutex::new(ManualClockState {
                now_ms: start_ms,
                sleeps: Vec::new(),
            }),
        }
    }

    /// Every sleep requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Moves the clock forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.lock();
        state.now_ms = state.now_ms.saturating_add(duration.as_millis() as u64);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClockState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Scheduler for ManualClock {
    fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.now_ms = state.now_ms.saturating_add(duration.as_millis() as u64);
        state.sleeps.push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_sleep() {
        let clock = ManualClock::new(1_000);
        clock.sleep(Duration::from_millis(250));
        clock.advance(Duration::from_millis(5));
        assert_eq!(clock.now_ms(), 1_255);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250)]);
    }
}
