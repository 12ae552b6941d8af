//! Single-slot memo for normalized timelines.
//!
//! Normalization runs once per distinct (sequence content, speed) pair. Only
//! the latest timeline is ever needed, so the cache holds exactly one entry and
//! replaces it whenever the key changes.

use super::normalizer::normalize;
use super::types::{RawSequence, Timeline};
use crate::error::{Result, SequencerError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::debug;

/// Identity of a normalization input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    identity: SequenceIdentity,
    speed_bits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SequenceIdentity {
    Digest(u64),
    Version(u64),
}

impl SequenceKey {
    /// Derive the key from the serialized sequence content and the speed
    pub fn of(sequence: &RawSequence, speed: f64) -> Result<Self> {
        let encoded = serde_json::to_vec(sequence).map_err(|e| {
            SequencerError::validation("timeline", format!("sequence is not serializable: {e}"))
        })?;
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        Ok(Self {
            identity: SequenceIdentity::Digest(hasher.finish()),
            speed_bits: speed.to_bits(),
        })
    }

    /// Key a sequence by a version the owner bumps whenever it replaces the
    /// sequence. Constant time, so it can be derived on every evaluation.
    pub fn versioned(version: u64, speed: f64) -> Self {
        Self {
            identity: SequenceIdentity::Version(version),
            speed_bits: speed.to_bits(),
        }
    }
}

#[derive(Debug, Default)]
pub struct TimelineCache {
    slot: Option<(SequenceKey, Arc<Timeline>)>,
    hits: u64,
    misses: u64,
}

impl TimelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached timeline for this input or normalize it.
    /// A failed normalization leaves the previous entry in place.
    pub fn get_or_normalize(&mut self, sequence: &RawSequence, speed: f64) -> Result<Arc<Timeline>> {
        let key = SequenceKey::of(sequence, speed)?;
        self.get_or_normalize_keyed(key, sequence, speed)
    }

    /// Like [`get_or_normalize`](Self::get_or_normalize) with a key supplied
    /// by the caller, typically [`SequenceKey::versioned`]
    pub fn get_or_normalize_keyed(
        &mut self,
        key: SequenceKey,
        sequence: &RawSequence,
        speed: f64,
    ) -> Result<Arc<Timeline>> {
        if let Some((cached_key, timeline)) = &self.slot {
            if *cached_key == key {
                self.hits += 1;
                return Ok(Arc::clone(timeline));
            }
        }

        let timeline = Arc::new(normalize(sequence, speed)?);
        self.misses += 1;
        debug!(misses = self.misses, "Timeline cache replaced");
        self.slot = Some((key, Arc::clone(&timeline)));
        Ok(timeline)
    }

    /// Currently cached timeline, if any
    pub fn current(&self) -> Option<Arc<Timeline>> {
        self.slot.as_ref().map(|(_, timeline)| Arc::clone(timeline))
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::RawPart;
    use chrono::Utc;

    fn sequence() -> RawSequence {
        RawSequence::new(Utc::now(), 10.0, vec![RawPart::new("live", 0.0, 10.0)])
    }

    #[test]
    fn test_same_input_hits_cache() {
        let mut cache = TimelineCache::new();
        let seq = sequence();

        let first = cache.get_or_normalize(&seq, 1.0).unwrap();
        let second = cache.get_or_normalize(&seq.clone(), 1.0).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!((cache.hits(), cache.misses()), (1, 1));
    }

    #[test]
    fn test_speed_or_content_change_recomputes() {
        let mut cache = TimelineCache::new();
        let seq = sequence();

        let normal = cache.get_or_normalize(&seq, 1.0).unwrap();
        let fast = cache.get_or_normalize(&seq, 2.0).unwrap();
        assert_eq!(normal.duration_ms, 10_000);
        assert_eq!(fast.duration_ms, 5_000);

        let mut changed = seq.clone();
        changed.parts[0].part_type = "bye".to_string();
        let replaced = cache.get_or_normalize(&changed, 2.0).unwrap();
        assert_eq!(replaced.parts[0].part_type, "bye");
        assert_eq!(cache.misses(), 3);
    }

    #[test]
    fn test_versioned_key_skips_content() {
        let mut cache = TimelineCache::new();
        let seq = sequence();

        let first = cache
            .get_or_normalize_keyed(SequenceKey::versioned(1, 1.0), &seq, 1.0)
            .unwrap();
        let again = cache
            .get_or_normalize_keyed(SequenceKey::versioned(1, 1.0), &seq, 1.0)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        // A content key never matches a versioned one
        let hashed = cache.get_or_normalize(&seq, 1.0).unwrap();
        assert!(!Arc::ptr_eq(&first, &hashed));

        let bumped = cache
            .get_or_normalize_keyed(SequenceKey::versioned(2, 1.0), &seq, 1.0)
            .unwrap();
        assert!(!Arc::ptr_eq(&hashed, &bumped));
        assert_eq!((cache.hits(), cache.misses()), (1, 3));
    }

    #[test]
    fn test_failed_normalization_keeps_previous_entry() {
        let mut cache = TimelineCache::new();
        let seq = sequence();
        cache.get_or_normalize(&seq, 1.0).unwrap();

        let mut broken = seq.clone();
        broken.parts.clear();
        assert!(cache.get_or_normalize(&broken, 1.0).is_err());
        assert_eq!(cache.current().unwrap().parts[0].part_type, "live");
    }
}
