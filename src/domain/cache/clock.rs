//! Wall-clock source for entry timestamps

use std::fmt::Debug;

/// Source of the current time in millis since epoch
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> u64;
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}
