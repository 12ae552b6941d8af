//! # Part Scheduler
//!
//! Stateless decision function over a normalized timeline. Given the current
//! instant it resolves the active part, the following part, and the next
//! instant at which the decision must be made again. It never sleeps and can
//! be called redundantly; the sequencer loop drives it from a deadline timer.

use super::metadata::{checked_preload, PartMetadata};
use super::resolved_part::ResolvedPart;
use crate::config::SchedulingConfig;
use crate::error::{Result, SequencerError};
use crate::timeline::{Timeline, TimelinePart};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Outcome of one scheduler evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerDecision {
    pub index: usize,
    pub current: ResolvedPart,
    pub next: Option<ResolvedPart>,
    /// Next instant at which the scheduler must be re-evaluated
    pub deadline: DateTime<Utc>,
    /// The whole timeline lies in the past
    pub ended: bool,
}

/// Index of the part active at `elapsed_ms` since the timeline start.
///
/// Before the first part resolves to the first part; at or after the end of
/// the last part resolves to the last. Intervals are half-open, so an exact
/// boundary belongs to the part that starts there.
pub fn determine_part_index(elapsed_ms: i64, parts: &[TimelinePart]) -> Result<usize> {
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return Err(SequencerError::internal_consistency(
            "scheduler",
            "timeline has no parts",
        ));
    };

    if elapsed_ms < first.offset_ms as i64 {
        return Ok(0);
    }
    if elapsed_ms >= last.end_ms() as i64 {
        return Ok(parts.len() - 1);
    }

    // Parts are sorted and contiguous; the first part ending after `elapsed`
    // is the one containing it.
    let index = parts.partition_point(|part| part.end_ms() as i64 <= elapsed_ms);
    match parts.get(index) {
        Some(part) if part.contains(elapsed_ms) => Ok(index),
        _ => Err(SequencerError::internal_consistency(
            "scheduler",
            format!("no part contains elapsed time {elapsed_ms}ms"),
        )),
    }
}

/// Scheduler tuning: idle poll interval and preload margin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartScheduler {
    idle_poll: Duration,
    preload_margin: Duration,
}

impl Default for PartScheduler {
    fn default() -> Self {
        Self::from_config(&SchedulingConfig::default())
    }
}

impl PartScheduler {
    pub fn new(idle_poll: Duration, preload_margin: Duration) -> Self {
        Self {
            idle_poll,
            preload_margin,
        }
    }

    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self::new(
            Duration::seconds(config.idle_poll_seconds as i64),
            Duration::milliseconds(config.preload_margin_ms as i64),
        )
    }

    /// Evaluate `timeline` at `now`
    pub fn evaluate(
        &self,
        timeline: &Timeline,
        now: DateTime<Utc>,
        metadata: &dyn PartMetadata,
    ) -> Result<SchedulerDecision> {
        let index = determine_part_index(timeline.elapsed_ms(now), &timeline.parts)?;
        let current = ResolvedPart::resolve(timeline, index)?;
        let mut next = if current.last {
            None
        } else {
            Some(ResolvedPart::resolve(timeline, index + 1)?)
        };

        let ended = now >= timeline.ends_at;
        let mut deadline = if ended {
            now + self.idle_poll
        } else {
            current.ends_at
        };

        if let Some(next) = next.as_mut() {
            if let Some(seconds) = checked_preload(metadata, next) {
                // A preload start before the representable range is already open
                match self.preload_start(next.starts_at, seconds) {
                    Some(preload_start) if now < preload_start && preload_start < deadline => {
                        deadline = preload_start;
                    }
                    _ => next.preloading = true,
                }
            }
        }

        Ok(SchedulerDecision {
            index,
            current,
            next,
            deadline,
            ended,
        })
    }

    /// Instant the preload window for a part starting at `starts_at` opens,
    /// or `None` when it lies outside the representable range
    fn preload_start(&self, starts_at: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
        let millis = (seconds * 1000.0).round();
        if millis >= i64::MAX as f64 {
            return None;
        }
        let lead = Duration::try_milliseconds(millis as i64)?.checked_add(&self.preload_margin)?;
        starts_at.checked_sub_signed(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{FixedPreload, NoPreload, PreloadByType};
    use crate::timeline::{normalize, RawPart, RawSequence};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()
    }

    fn pod_timeline() -> Timeline {
        let parts = vec![
            RawPart::new("pre", 0.0, 1.0),
            RawPart::new("hello", 1.0, 119.0),
            RawPart::new("warmup", 120.0, 120.0),
            RawPart::new("live", 240.0, 480.0),
            RawPart::new("bye", 720.0, 59.0),
            RawPart::new("post", 779.0, 1.0),
        ];
        normalize(&RawSequence::new(start(), 780.0, parts), 1.0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        start() + Duration::seconds(seconds)
    }

    #[test]
    fn test_part_index_boundaries() {
        let timeline = pod_timeline();
        let parts = &timeline.parts;

        assert_eq!(determine_part_index(-5_000, parts).unwrap(), 0);
        assert_eq!(determine_part_index(0, parts).unwrap(), 0);
        assert_eq!(determine_part_index(999, parts).unwrap(), 0);
        assert_eq!(determine_part_index(1_000, parts).unwrap(), 1);
        assert_eq!(determine_part_index(240_000, parts).unwrap(), 3);
        assert_eq!(determine_part_index(779_999, parts).unwrap(), 5);
        assert_eq!(determine_part_index(780_000, parts).unwrap(), 5);
        assert_eq!(determine_part_index(10_000_000, parts).unwrap(), 5);
    }

    #[test]
    fn test_part_index_on_empty_parts_is_fatal() {
        assert!(determine_part_index(0, &[]).unwrap_err().is_fatal());
    }

    #[test]
    fn test_inside_live_preload_window_not_open() {
        let scheduler = PartScheduler::default();
        let metadata = PreloadByType::new().with("bye", 3.0);

        let decision = scheduler.evaluate(&pod_timeline(), at(500), &metadata).unwrap();

        assert_eq!(decision.current.part_type, "live");
        let next = decision.next.unwrap();
        assert_eq!(next.part_type, "bye");
        assert!(!next.preloading);
        assert_eq!(decision.deadline, at(716));
        assert!(!decision.ended);
    }

    #[test]
    fn test_inside_preload_window_sets_preloading() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(717), &FixedPreload(3.0))
            .unwrap();

        assert_eq!(decision.current.part_type, "live");
        assert!(decision.next.as_ref().unwrap().preloading);
        assert_eq!(decision.deadline, at(720));
    }

    #[test]
    fn test_preload_start_exactly_now_sets_preloading() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(716), &FixedPreload(3.0))
            .unwrap();
        assert!(decision.next.unwrap().preloading);
        assert_eq!(decision.deadline, at(720));
    }

    #[test]
    fn test_after_end_polls_idle() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(1_000), &FixedPreload(3.0))
            .unwrap();

        assert_eq!(decision.current.part_type, "post");
        assert!(decision.current.last);
        assert!(decision.next.is_none());
        assert!(!decision.current.preloading);
        assert_eq!(decision.deadline, at(1_060));
        assert!(decision.ended);
    }

    #[test]
    fn test_exact_end_counts_as_ended() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(780), &NoPreload)
            .unwrap();
        assert!(decision.ended);
        assert_eq!(decision.current.part_type, "post");
        assert_eq!(decision.deadline, at(840));
    }

    #[test]
    fn test_before_start_resolves_first_part() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(-30), &NoPreload)
            .unwrap();

        assert_eq!(decision.current.part_type, "pre");
        assert!(decision.current.first);
        assert_eq!(decision.next.unwrap().part_type, "hello");
        assert_eq!(decision.deadline, at(1));
    }

    #[test]
    fn test_no_preload_metadata_leaves_deadline_at_part_end() {
        let scheduler = PartScheduler::default();
        let decision = scheduler
            .evaluate(&pod_timeline(), at(300), &NoPreload)
            .unwrap();
        assert_eq!(decision.deadline, at(720));
        assert!(!decision.next.unwrap().preloading);
    }

    #[test]
    fn test_custom_margin_and_idle_poll() {
        let scheduler = PartScheduler::new(Duration::seconds(5), Duration::zero());
        let decision = scheduler
            .evaluate(&pod_timeline(), at(500), &FixedPreload(3.0))
            .unwrap();
        assert_eq!(decision.deadline, at(717));

        let ended = scheduler
            .evaluate(&pod_timeline(), at(900), &NoPreload)
            .unwrap();
        assert_eq!(ended.deadline, at(905));
    }

    #[test]
    fn test_unrepresentable_preload_opens_window() {
        let scheduler = PartScheduler::default();
        for seconds in [f64::MAX, 1e300, 9.3e15] {
            let decision = scheduler
                .evaluate(&pod_timeline(), at(0), &FixedPreload(seconds))
                .unwrap();
            assert_eq!(decision.current.part_type, "pre");
            assert!(decision.next.unwrap().preloading);
            assert_eq!(decision.deadline, at(1));
        }
    }

    #[test]
    fn test_redundant_evaluation_is_stable() {
        let scheduler = PartScheduler::default();
        let timeline = pod_timeline();
        let first = scheduler.evaluate(&timeline, at(42), &FixedPreload(15.0)).unwrap();
        let second = scheduler.evaluate(&timeline, at(42), &FixedPreload(15.0)).unwrap();
        assert_eq!(first, second);
    }
}
