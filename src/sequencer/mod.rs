//! # Sequencer
//!
//! Long-running scheduler loop and the state it publishes.

pub mod service;
pub mod snapshot;

pub use service::{SequencerHandle, SequencerService};
pub use snapshot::{SequencerSnapshot, SequencerState};
