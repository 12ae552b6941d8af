use proptest::prelude::*;
use sequencer_core::timeline::{RawPart, RawSequence};

use super::session_start;

/// Strategy for part type names
pub fn part_type_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["pre", "hello", "warmup", "live", "bye", "post", "ad"])
        .prop_map(str::to_string)
}

/// Strategy for a single raw part; offsets and durations are arbitrary and
/// may overlap, leave gaps or run past the sequence end
pub fn raw_part_strategy() -> impl Strategy<Value = RawPart> {
    (part_type_strategy(), 0.0f64..900.0, 0.001f64..240.0)
        .prop_map(|(part_type, offset, duration)| RawPart::new(part_type, offset, duration))
}

/// Strategy for a complete raw sequence
pub fn raw_sequence_strategy() -> impl Strategy<Value = RawSequence> {
    (prop::collection::vec(raw_part_strategy(), 1..12), 1.0f64..1_200.0)
        .prop_map(|(parts, duration)| RawSequence::new(session_start(), duration, parts))
}

/// Strategy for playback speeds
pub fn speed_strategy() -> impl Strategy<Value = f64> {
    prop::sample::select(vec![0.25, 0.5, 1.0, 1.5, 2.0, 10.0])
}
