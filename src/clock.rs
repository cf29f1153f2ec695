//! Wall clock abstraction
//!
//! Minute-edge evaluation and windowed queries read "now" through a
//! [`Clock`] so tests can drive time by hand.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_epoch_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Reads the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    epoch_seconds: AtomicI64,
}

impl ManualClock {
    pub fn new(epoch_seconds: i64) -> Self {
        Self {
            epoch_seconds: AtomicI64::new(epoch_seconds),
        }
    }

    pub fn set(&self, epoch_seconds: i64) {
        self.epoch_seconds.store(epoch_seconds, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.epoch_seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.now_epoch_seconds(), 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    fn now_epoch_seconds(&self) -> i64 {
        self.epoch_seconds.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(120);
        assert_eq!(clock.now_epoch_seconds(), 120);
        clock.advance(30);
        assert_eq!(clock.now().timestamp(), 150);
        clock.set(0);
        assert_eq!(clock.now_epoch_seconds(), 0);
    }
}
