//! # Timeline
//!
//! Raw session parts, the normalization that turns them into a canonical
//! millisecond timeline, and the memo that keeps normalization off the
//! per-tick path.

pub mod cache;
pub mod desired_state;
pub mod normalizer;
pub mod types;

pub use cache::{SequenceKey, TimelineCache};
pub use desired_state::extract_session;
pub use normalizer::normalize;
pub use types::{NormalizationDiagnostic, RawPart, RawSequence, Timeline, TimelinePart};
