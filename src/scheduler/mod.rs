//! # Scheduler
//!
//! Resolution of the active and upcoming parts of a timeline and of the next
//! re-evaluation deadline.

pub mod metadata;
pub mod part_scheduler;
pub mod resolved_part;

pub use metadata::{
    checked_preload, default_metadata, FixedPreload, NoPreload, PartMetadata, PreloadByType,
};
pub use part_scheduler::{determine_part_index, PartScheduler, SchedulerDecision};
pub use resolved_part::ResolvedPart;
