//! # Adaptive Deadline Timer
//!
//! Fires a callback at or after, never before, an absolute instant. Instead of
//! one long sleep the timer sleeps a fixed share of the remaining distance and
//! re-reads the clock on every wake, which tolerates drift and suspension of
//! the underlying timer. Once the remainder drops under the convergence
//! threshold the rest is slept in a single step.
//!
//! ```rust,no_run
//! use sequencer_core::config::DeadlineTimerConfig;
//! use sequencer_core::timing::{DeadlineTimer, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let mut timer = DeadlineTimer::new(Arc::new(SystemClock), DeadlineTimerConfig::default());
//! let target = chrono::Utc::now() + chrono::Duration::seconds(30);
//! timer.arm(target, || println!("deadline reached"));
//! # }
//! ```

use super::clock::Clock;
use crate::config::DeadlineTimerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Delay before the next re-check, or `None` once `remaining` has elapsed
pub fn next_delay(remaining: chrono::Duration, config: &DeadlineTimerConfig) -> Option<Duration> {
    let remaining = remaining.to_std().ok().filter(|r| !r.is_zero())?;

    if remaining < config.convergence_threshold() {
        return Some(remaining);
    }
    let step_ms = (remaining.as_secs_f64() * 1000.0 * config.convergence_factor).ceil();
    Some(Duration::from_millis(step_ms as u64))
}

/// Sleep until `clock` reads at or after `target`. Returns the number of
/// sleeps it took.
pub async fn wait_until(
    clock: &dyn Clock,
    target: DateTime<Utc>,
    config: &DeadlineTimerConfig,
) -> u32 {
    let mut steps = 0;
    while let Some(delay) = next_delay(target - clock.now(), config) {
        trace!(delay_ms = delay.as_millis() as u64, step = steps, "Deadline timer sleeping");
        tokio::time::sleep(delay).await;
        steps += 1;
    }
    steps
}

#[derive(Debug)]
struct ArmedChain {
    /// Open while the chain may still fire; closed on fire or cancel
    gate: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
    target: DateTime<Utc>,
}

/// Single-chain deadline timer. Arming replaces any pending chain; dropping
/// the timer cancels it.
#[derive(Debug)]
pub struct DeadlineTimer {
    clock: Arc<dyn Clock>,
    config: DeadlineTimerConfig,
    active: Option<ArmedChain>,
}

impl DeadlineTimer {
    pub fn new(clock: Arc<dyn Clock>, config: DeadlineTimerConfig) -> Self {
        Self {
            clock,
            config,
            active: None,
        }
    }

    /// Fire `callback` at or after `target`, cancelling any pending chain.
    /// A target that has already passed fires before `arm` returns.
    ///
    /// Must be called inside a tokio runtime.
    pub fn arm<F>(&mut self, target: DateTime<Utc>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        if self.clock.now() >= target {
            debug!(target = %target, "⏰ Deadline already passed, firing immediately");
            callback();
            return;
        }

        let gate = Arc::new(Mutex::new(true));
        let chain_gate = Arc::clone(&gate);
        let clock = Arc::clone(&self.clock);
        let config = self.config;

        let handle = tokio::spawn(async move {
            let steps = wait_until(clock.as_ref(), target, &config).await;
            let mut open = chain_gate.lock();
            if *open {
                *open = false;
                debug!(target = %target, steps = steps, "⏰ Deadline reached");
                callback();
            }
        });

        self.active = Some(ArmedChain {
            gate,
            handle,
            target,
        });
    }

    /// Stop the pending chain. Once this returns the callback will not run.
    pub fn cancel(&mut self) {
        if let Some(chain) = self.active.take() {
            *chain.gate.lock() = false;
            chain.handle.abort();
            trace!(target = %chain.target, "Deadline timer cancelled");
        }
    }

    /// A chain is pending and has not fired
    pub fn is_armed(&self) -> bool {
        self.active.as_ref().is_some_and(|chain| *chain.gate.lock())
    }

    /// Target of the pending chain
    pub fn target(&self) -> Option<DateTime<Utc>> {
        self.active
            .as_ref()
            .filter(|chain| *chain.gate.lock())
            .map(|chain| chain.target)
    }
}

impl Drop for DeadlineTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
