//! Parts resolved against absolute time for a single scheduler evaluation.

use crate::error::{Result, SequencerError};
use crate::timeline::{Timeline, TimelinePart};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// A timeline part with absolute start/end instants. Derived fresh on every
/// evaluation and never stored beyond it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub props: Map<String, Value>,
    pub offset_ms: u64,
    pub duration_ms: u64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub first: bool,
    pub last: bool,
    pub preloading: bool,
}

impl ResolvedPart {
    /// Resolve `parts[index]` of `timeline`
    pub fn resolve(timeline: &Timeline, index: usize) -> Result<Self> {
        let part: &TimelinePart = timeline.parts.get(index).ok_or_else(|| {
            SequencerError::internal_consistency(
                "scheduler",
                format!(
                    "part index {index} outside timeline of {} parts",
                    timeline.parts.len()
                ),
            )
        })?;

        let resolved = Self {
            part_type: part.part_type.clone(),
            props: part.props.clone(),
            offset_ms: part.offset_ms,
            duration_ms: part.duration_ms,
            starts_at: timeline.instant_at(part.offset_ms),
            ends_at: timeline.instant_at(part.end_ms()),
            first: index == 0,
            last: index + 1 == timeline.parts.len(),
            preloading: false,
        };
        resolved.validate()?;
        Ok(resolved)
    }

    /// Structural check of a resolved part. A failure means the timeline it
    /// came from is corrupt.
    pub fn validate(&self) -> Result<()> {
        let problem = if self.part_type.trim().is_empty() {
            Some("part type is empty".to_string())
        } else if self.duration_ms < 1 {
            Some(format!("part '{}' has zero duration", self.part_type))
        } else if self.ends_at <= self.starts_at {
            Some(format!(
                "part '{}' ends at {} before it starts at {}",
                self.part_type, self.ends_at, self.starts_at
            ))
        } else {
            None
        };

        match problem {
            Some(message) => Err(SequencerError::internal_consistency("scheduler", message)),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ResolvedPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} - {}]",
            self.part_type,
            self.starts_at.format("%H:%M:%S%.3f"),
            self.ends_at.format("%H:%M:%S%.3f")
        )?;
        if self.preloading {
            write!(f, " (preloading)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{normalize, RawPart, RawSequence};
    use chrono::TimeZone;

    fn timeline() -> Timeline {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        normalize(
            &RawSequence::new(
                start,
                10.0,
                vec![RawPart::new("intro", 0.0, 4.0), RawPart::new("main", 4.0, 6.0)],
            ),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_sets_instants_and_flags() {
        let timeline = timeline();
        let intro = ResolvedPart::resolve(&timeline, 0).unwrap();
        let main = ResolvedPart::resolve(&timeline, 1).unwrap();

        assert!(intro.first && !intro.last);
        assert!(main.last && !main.first);
        assert_eq!(intro.ends_at, main.starts_at);
        assert_eq!(main.ends_at, timeline.ends_at);
        assert!(!main.preloading);
    }

    #[test]
    fn test_out_of_range_index_is_fatal() {
        let err = ResolvedPart::resolve(&timeline(), 5).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_rejects_corrupt_parts() {
        let mut part = ResolvedPart::resolve(&timeline(), 0).unwrap();
        part.part_type = " ".to_string();
        assert!(part.validate().unwrap_err().is_fatal());

        let mut part = ResolvedPart::resolve(&timeline(), 0).unwrap();
        part.duration_ms = 0;
        assert!(part.validate().is_err());
    }

    #[test]
    fn test_display_marks_preloading() {
        let mut part = ResolvedPart::resolve(&timeline(), 1).unwrap();
        part.preloading = true;
        assert_eq!(part.to_string(), "main [10:00:04.000 - 10:00:10.000] (preloading)");
    }
}
