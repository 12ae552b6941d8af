//! # Timeline Normalizer
//!
//! Turns a raw part list into a canonical timeline: parts sorted by offset,
//! overlaps clamped, gaps covered by synthetic null parts, and everything
//! scaled from seconds to milliseconds by `1000 / speed`. The resulting parts
//! exactly cover `[0, duration_ms)`.
//!
//! Part ends are scaled and rounded to whole milliseconds; each part starts
//! at the rounded end of its predecessor.

use super::types::{NormalizationDiagnostic, RawPart, RawSequence, Timeline, TimelinePart};
use crate::constants::timeline::NULL_PART_TYPE;
use crate::error::{Result, SequencerError};
use chrono::Duration;
use serde_json::Map;
use tracing::{debug, warn};

const CONTEXT: &str = "timeline";

/// Normalize `sequence` for playback at `speed`
pub fn normalize(sequence: &RawSequence, speed: f64) -> Result<Timeline> {
    validate_input(sequence, speed)?;

    let mut diagnostics = Vec::new();

    let mut sorted: Vec<RawPart> = sequence.parts.clone();
    sorted.sort_by(|a, b| a.offset.total_cmp(&b.offset));

    let clamped = clamp_overlaps(sorted, &mut diagnostics);
    let bounded = bound_to_sequence(clamped, sequence.duration, &mut diagnostics);
    let gapless = fill_gaps(bounded, sequence.duration, &mut diagnostics);
    let parts = scale(gapless, speed, &mut diagnostics);

    if parts.is_empty() {
        return Err(SequencerError::validation(
            CONTEXT,
            "no part has a positive length after normalization",
        ));
    }

    let duration_ms = parts.last().map(TimelinePart::end_ms).unwrap_or_default();
    let ends_at = i64::try_from(duration_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .and_then(|length| sequence.starts_at.checked_add_signed(length))
        .ok_or_else(|| SequencerError::validation(CONTEXT, "timeline end is out of range"))?;

    debug!(
        parts = parts.len(),
        duration_ms = duration_ms,
        speed = speed,
        corrections = diagnostics.len(),
        "Timeline normalized"
    );

    Ok(Timeline {
        starts_at: sequence.starts_at,
        ends_at,
        duration_ms,
        speed,
        parts,
        diagnostics,
    })
}

fn validate_input(sequence: &RawSequence, speed: f64) -> Result<()> {
    if !speed.is_finite() || speed <= 0.0 {
        return Err(SequencerError::validation(
            CONTEXT,
            format!("speed must be greater than zero, got {speed}"),
        ));
    }
    if !sequence.duration.is_finite() || sequence.duration <= 0.0 {
        return Err(SequencerError::validation(
            CONTEXT,
            format!("sequence duration must be positive, got {}", sequence.duration),
        ));
    }
    if sequence.parts.is_empty() {
        return Err(SequencerError::validation(CONTEXT, "part list is empty"));
    }

    for (index, part) in sequence.parts.iter().enumerate() {
        if part.part_type.trim().is_empty() {
            return Err(SequencerError::validation(
                CONTEXT,
                format!("part {index} has an empty type"),
            ));
        }
        if !part.offset.is_finite() || part.offset < 0.0 {
            return Err(SequencerError::validation(
                CONTEXT,
                format!("part {index} ({}) has invalid offset {}", part.part_type, part.offset),
            ));
        }
        if !part.duration.is_finite() || part.duration <= 0.0 {
            return Err(SequencerError::validation(
                CONTEXT,
                format!(
                    "part {index} ({}) has invalid duration {}",
                    part.part_type, part.duration
                ),
            ));
        }
    }
    Ok(())
}

/// Shorten every part that runs into its successor
fn clamp_overlaps(
    mut parts: Vec<RawPart>,
    diagnostics: &mut Vec<NormalizationDiagnostic>,
) -> Vec<RawPart> {
    for index in 0..parts.len().saturating_sub(1) {
        let next_offset = parts[index + 1].offset;
        let part = &mut parts[index];
        if part.end() > next_offset {
            let clamped = next_offset - part.offset;
            warn!(
                index = index,
                part_type = %part.part_type,
                "Adjusting the duration of sequence part because it overlaps with the next part"
            );
            diagnostics.push(NormalizationDiagnostic::DurationClamped {
                index,
                part_type: part.part_type.clone(),
                original: part.duration,
                clamped,
            });
            part.duration = clamped;
        }
    }
    parts
}

/// Drop parts starting past the sequence end and cut the one running over it
fn bound_to_sequence(
    parts: Vec<RawPart>,
    sequence_duration: f64,
    diagnostics: &mut Vec<NormalizationDiagnostic>,
) -> Vec<RawPart> {
    let mut bounded = Vec::with_capacity(parts.len());
    for (index, mut part) in parts.into_iter().enumerate() {
        if part.offset >= sequence_duration {
            warn!(part_type = %part.part_type, "Dropping sequence part that starts after the end");
            diagnostics.push(NormalizationDiagnostic::PartDropped {
                part_type: part.part_type,
                reason: "starts after the end of the sequence".to_string(),
            });
            continue;
        }
        if part.end() > sequence_duration {
            let truncated = sequence_duration - part.offset;
            warn!(part_type = %part.part_type, "Truncating sequence part at the end of the sequence");
            diagnostics.push(NormalizationDiagnostic::TruncatedAtEnd {
                index,
                part_type: part.part_type.clone(),
                original: part.duration,
                truncated,
            });
            part.duration = truncated;
        }
        bounded.push(part);
    }
    bounded
}

/// Insert null parts wherever the timeline is not covered. The flag marks
/// inserted parts.
fn fill_gaps(
    parts: Vec<RawPart>,
    sequence_duration: f64,
    diagnostics: &mut Vec<NormalizationDiagnostic>,
) -> Vec<(RawPart, bool)> {
    let mut gapless = Vec::with_capacity(parts.len() + 2);
    let mut cursor = 0.0_f64;

    for part in parts {
        if part.offset > cursor {
            gapless.push((null_part(cursor, part.offset - cursor, diagnostics), true));
        }
        cursor = part.end();
        gapless.push((part, false));
    }

    if sequence_duration > cursor {
        gapless.push((null_part(cursor, sequence_duration - cursor, diagnostics), true));
    }
    gapless
}

fn null_part(
    offset: f64,
    duration: f64,
    diagnostics: &mut Vec<NormalizationDiagnostic>,
) -> RawPart {
    warn!(offset = offset, duration = duration, "Adding a null part in a gap between parts");
    diagnostics.push(NormalizationDiagnostic::GapFilled { offset, duration });
    RawPart {
        part_type: NULL_PART_TYPE.to_string(),
        offset,
        duration,
        props: Map::new(),
    }
}

/// Convert seconds to milliseconds at the given speed. Each part starts where
/// the previous one ended, so rounding can never open a gap.
fn scale(
    parts: Vec<(RawPart, bool)>,
    speed: f64,
    diagnostics: &mut Vec<NormalizationDiagnostic>,
) -> Vec<TimelinePart> {
    let factor = 1000.0 / speed;
    let to_ms = |seconds: f64| (seconds * factor).round().max(0.0) as u64;

    let mut cursor_ms = 0_u64;
    let mut scaled = Vec::with_capacity(parts.len());
    for (part, synthetic) in parts {
        let end = to_ms(part.end());
        if end <= cursor_ms {
            diagnostics.push(NormalizationDiagnostic::PartDropped {
                part_type: part.part_type,
                reason: "shorter than one millisecond".to_string(),
            });
            continue;
        }
        scaled.push(TimelinePart {
            part_type: part.part_type,
            offset_ms: cursor_ms,
            duration_ms: end - cursor_ms,
            props: part.props,
            synthetic,
        });
        cursor_ms = end;
    }
    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(1979, 7, 1, 0, 0, 0).unwrap()
    }

    fn sequence(duration: f64, parts: Vec<RawPart>) -> RawSequence {
        RawSequence::new(start(), duration, parts)
    }

    fn assert_contiguous(timeline: &Timeline) {
        assert_eq!(timeline.parts[0].offset_ms, 0);
        for pair in timeline.parts.windows(2) {
            assert_eq!(pair[0].end_ms(), pair[1].offset_ms);
        }
        assert_eq!(timeline.parts.last().unwrap().end_ms(), timeline.duration_ms);
    }

    #[test]
    fn test_sorts_parts_by_offset() {
        let timeline = normalize(
            &sequence(
                300.0,
                vec![
                    RawPart::new("live", 60.0, 180.0),
                    RawPart::new("post", 240.0, 60.0),
                    RawPart::new("pre", 0.0, 60.0),
                ],
            ),
            1.0,
        )
        .unwrap();

        let types: Vec<&str> = timeline.parts.iter().map(|p| p.part_type.as_str()).collect();
        assert_eq!(types, vec!["pre", "live", "post"]);
        assert!(timeline.diagnostics.is_empty());
        assert_contiguous(&timeline);
    }

    #[test]
    fn test_clamps_overlapping_part() {
        let timeline = normalize(
            &sequence(
                100.0,
                vec![RawPart::new("a", 0.0, 70.0), RawPart::new("b", 50.0, 50.0)],
            ),
            1.0,
        )
        .unwrap();

        assert_eq!(timeline.parts[0].duration_ms, 50_000);
        assert!(matches!(
            timeline.diagnostics[0],
            NormalizationDiagnostic::DurationClamped { index: 0, .. }
        ));
        assert_contiguous(&timeline);
    }

    #[test]
    fn test_fills_gap_with_null_part() {
        let timeline = normalize(
            &sequence(
                100.0,
                vec![RawPart::new("a", 0.0, 40.0), RawPart::new("b", 60.0, 40.0)],
            ),
            1.0,
        )
        .unwrap();

        assert_eq!(timeline.parts.len(), 3);
        let gap = &timeline.parts[1];
        assert_eq!(gap.part_type, NULL_PART_TYPE);
        assert!(gap.synthetic);
        assert_eq!((gap.offset_ms, gap.duration_ms), (40_000, 20_000));
        assert_contiguous(&timeline);
    }

    #[test]
    fn test_single_part_needs_no_fill() {
        let timeline =
            normalize(&sequence(60.0, vec![RawPart::new("live", 0.0, 60.0)]), 1.0).unwrap();
        assert_eq!(timeline.parts.len(), 1);
        assert!(timeline.diagnostics.is_empty());
        assert_eq!(timeline.duration_ms, 60_000);
        assert_eq!(timeline.ends_at, start() + Duration::seconds(60));
    }

    #[test]
    fn test_speed_scales_every_boundary() {
        let timeline = normalize(
            &sequence(
                100.0,
                vec![RawPart::new("a", 0.0, 40.0), RawPart::new("b", 40.0, 60.0)],
            ),
            2.0,
        )
        .unwrap();

        assert_eq!(timeline.duration_ms, 50_000);
        assert_eq!(timeline.parts[1].offset_ms, 20_000);
        assert_eq!(timeline.parts[1].duration_ms, 30_000);
        assert_eq!(timeline.ends_at, start() + Duration::seconds(50));
    }

    #[test]
    fn test_leading_and_trailing_gaps_are_covered() {
        let timeline =
            normalize(&sequence(100.0, vec![RawPart::new("a", 10.0, 50.0)]), 1.0).unwrap();
        let types: Vec<&str> = timeline.parts.iter().map(|p| p.part_type.as_str()).collect();
        assert_eq!(types, vec![NULL_PART_TYPE, "a", NULL_PART_TYPE]);
        assert_contiguous(&timeline);
    }

    #[test]
    fn test_identical_offsets_drop_zero_length_part() {
        let timeline = normalize(
            &sequence(
                10.0,
                vec![RawPart::new("a", 0.0, 5.0), RawPart::new("b", 0.0, 10.0)],
            ),
            1.0,
        )
        .unwrap();
        assert_eq!(timeline.parts.len(), 1);
        assert_eq!(timeline.parts[0].part_type, "b");
        assert_contiguous(&timeline);
    }

    #[test]
    fn test_rejects_empty_parts() {
        let err = normalize(&sequence(10.0, vec![]), 1.0).unwrap_err();
        assert!(matches!(err, SequencerError::Validation { .. }));
    }

    #[test]
    fn test_rejects_timeline_ending_out_of_range() {
        let parts = vec![RawPart::new("a", 0.0, 780.0)];
        for (duration, speed) in [(780.0, 1e-12), (780.0, f64::MIN_POSITIVE), (1e200, 1.0)] {
            let seq = sequence(duration, parts.clone());
            let err = normalize(&seq, speed).unwrap_err();
            assert!(matches!(err, SequencerError::Validation { .. }), "{duration} at {speed}");
        }
    }

    #[test]
    fn test_rejects_invalid_speed_and_parts() {
        let parts = vec![RawPart::new("a", 0.0, 10.0)];
        assert!(normalize(&sequence(10.0, parts.clone()), 0.0).is_err());
        assert!(normalize(&sequence(10.0, parts), f64::NAN).is_err());
        assert!(normalize(&sequence(10.0, vec![RawPart::new("", 0.0, 10.0)]), 1.0).is_err());
        assert!(normalize(&sequence(10.0, vec![RawPart::new("a", -1.0, 10.0)]), 1.0).is_err());
        assert!(normalize(&sequence(10.0, vec![RawPart::new("a", 0.0, 0.0)]), 1.0).is_err());
    }
}
