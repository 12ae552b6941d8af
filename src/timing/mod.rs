//! # Timing
//!
//! Clock sources and the adaptive deadline timer that drives scheduler
//! re-evaluation.

pub mod clock;
pub mod deadline_timer;

pub use clock::{Clock, SystemClock, TokioClock};
pub use deadline_timer::{next_delay, wait_until, DeadlineTimer};
