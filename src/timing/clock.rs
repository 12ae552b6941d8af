//! Wall-clock sources. Scheduler and timer code read the time only through a
//! [`Clock`] so tests can run against tokio's paused clock.

use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use tokio::time::Instant;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall time derived from tokio's monotonic clock: a wall-clock anchor plus
/// the tokio time elapsed since the clock was created. Follows
/// `tokio::time::pause`/`advance`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl TokioClock {
    pub fn new(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor: Instant::now(),
        }
    }

    /// Anchor at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.anchor.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.anchor_wall + elapsed
    }
}
