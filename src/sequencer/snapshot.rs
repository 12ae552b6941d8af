//! Observable sequencer state.

use crate::scheduler::{ResolvedPart, SchedulerDecision};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of the latest evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerSnapshot {
    pub current: ResolvedPart,
    pub next: Option<ResolvedPart>,
    pub deadline: DateTime<Utc>,
    pub ended: bool,
    pub speed: f64,
    pub evaluated_at: DateTime<Utc>,
    /// Evaluations since the service started
    pub evaluations: u64,
}

impl SequencerSnapshot {
    pub fn from_decision(
        decision: SchedulerDecision,
        evaluated_at: DateTime<Utc>,
        evaluations: u64,
        speed: f64,
    ) -> Self {
        Self {
            current: decision.current,
            next: decision.next,
            deadline: decision.deadline,
            ended: decision.ended,
            speed,
            evaluated_at,
            evaluations,
        }
    }

    /// The next part, when it is preloading
    pub fn preloading(&self) -> Option<&ResolvedPart> {
        self.next.as_ref().filter(|next| next.preloading)
    }

    /// One-line summary of the current and next parts
    pub fn debug_summary(&self) -> String {
        let next = match &self.next {
            Some(next) => format!(
                "{} at {} (preloading: {})",
                next.part_type,
                next.starts_at.format("%H:%M:%S"),
                if next.preloading { "yes" } else { "no" }
            ),
            None => "-".to_string(),
        };
        format!(
            "current: {} {}-{} | next: {} | deadline: {}{}",
            self.current.part_type,
            self.current.starts_at.format("%H:%M:%S"),
            self.current.ends_at.format("%H:%M:%S"),
            next,
            self.deadline.format("%H:%M:%S%.3f"),
            if self.ended { " | ended" } else { "" }
        )
    }
}

/// State published by the sequencer service
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", content = "snapshot", rename_all = "snake_case")]
pub enum SequencerState {
    /// No sequence is loaded
    #[default]
    Idle,
    Active(SequencerSnapshot),
    /// The service stopped on a consistency violation
    Faulted(String),
}

impl SequencerState {
    pub fn snapshot(&self) -> Option<&SequencerSnapshot> {
        match self {
            Self::Active(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Type of the active part, if any
    pub fn current_type(&self) -> Option<&str> {
        self.snapshot().map(|s| s.current.part_type.as_str())
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}
