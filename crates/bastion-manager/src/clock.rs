// crates/bastion-manager/src/clock.rs
//
// Time sources. Engine operations take an explicit `now`; module actors
// read it from an injected clock so tests can drive time by hand.

use parking_lot::Mutex;

/// Source of the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time from `chrono`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<u64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: u64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, secs: u64) {
        let mut now = self.now.lock();
        *now = now.saturating_add(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        *self.now.lock()
    }
}
