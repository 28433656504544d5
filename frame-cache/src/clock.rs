use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

/// Monotonic-enough wall clock in whole seconds, used for LRU timestamps
/// (spec §6). Strict monotonicity is not required; eviction ties break by
/// iteration order.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Real clock backed by [`SystemTime`].
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the unix epoch")
            .as_secs()
    }
}

/// Test clock that only advances when told to, so LRU-ordering tests are
/// deterministic instead of racing the wall clock.
#[derive(Debug, Default)]
pub struct FakeClock(AtomicU64);

impl FakeClock {
    pub fn new(start: u64) -> Self {
        FakeClock(AtomicU64::new(start))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for FakeClock {
    fn now_secs(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
