//! Timeline data model: raw session parts as delivered in the device shadow
//! and the canonical millisecond timeline derived from them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A part as supplied by the session document. Offsets and durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub offset: f64,
    pub duration: f64,
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl RawPart {
    pub fn new(part_type: impl Into<String>, offset: f64, duration: f64) -> Self {
        Self {
            part_type: part_type.into(),
            offset,
            duration,
            props: Map::new(),
        }
    }

    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }
}

/// A session sequence as supplied by the session document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSequence {
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Total length in seconds
    pub duration: f64,
    pub parts: Vec<RawPart>,
    /// Session fields the sequencer does not interpret (booking, class instance, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawSequence {
    pub fn new(starts_at: DateTime<Utc>, duration: f64, parts: Vec<RawPart>) -> Self {
        Self {
            starts_at,
            ends_at: None,
            duration,
            parts,
            extra: Map::new(),
        }
    }
}

/// A part on the normalized timeline. Offsets are relative to the timeline start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelinePart {
    pub part_type: String,
    pub offset_ms: u64,
    pub duration_ms: u64,
    pub props: Map<String, Value>,
    /// Inserted by normalization to cover a gap
    pub synthetic: bool,
}

impl TimelinePart {
    pub fn end_ms(&self) -> u64 {
        self.offset_ms + self.duration_ms
    }

    /// Half-open containment: the end boundary belongs to the following part
    pub fn contains(&self, elapsed_ms: i64) -> bool {
        elapsed_ms >= self.offset_ms as i64 && elapsed_ms < self.end_ms() as i64
    }
}

/// Non-fatal corrections applied while normalizing a sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizationDiagnostic {
    /// A part overlapped its successor and was shortened
    DurationClamped {
        index: usize,
        part_type: String,
        original: f64,
        clamped: f64,
    },
    /// A null part was inserted to cover a gap
    GapFilled { offset: f64, duration: f64 },
    /// A part was cut at the end of the sequence
    TruncatedAtEnd {
        index: usize,
        part_type: String,
        original: f64,
        truncated: f64,
    },
    /// A part had no remaining length and was removed
    PartDropped { part_type: String, reason: String },
}

/// Canonical, gapless, non-overlapping timeline in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub speed: f64,
    pub parts: Vec<TimelinePart>,
    pub diagnostics: Vec<NormalizationDiagnostic>,
}

impl Timeline {
    /// Absolute instant at `offset_ms` from the start
    pub fn instant_at(&self, offset_ms: u64) -> DateTime<Utc> {
        self.starts_at + Duration::milliseconds(offset_ms as i64)
    }

    /// Milliseconds elapsed since the timeline start; negative before it
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.starts_at).num_milliseconds()
    }

    pub fn first(&self) -> Option<&TimelinePart> {
        self.parts.first()
    }

    pub fn last(&self) -> Option<&TimelinePart> {
        self.parts.last()
    }
}
