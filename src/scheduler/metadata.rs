//! Per-part metadata consulted by the scheduler.
//!
//! The only field the scheduler reads is the preload lead: how many seconds
//! before its start a part must begin loading.

use super::resolved_part::ResolvedPart;
use crate::config::SchedulingConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Lookup of per-part metadata
pub trait PartMetadata: Send + Sync {
    /// Preload lead in seconds for `part`, or `None` when it needs no preloading
    fn preload_duration(&self, part: &ResolvedPart) -> Option<f64>;
}

/// Every part preloads with the same lead
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPreload(pub f64);

impl PartMetadata for FixedPreload {
    fn preload_duration(&self, _part: &ResolvedPart) -> Option<f64> {
        Some(self.0)
    }
}

/// No part ever preloads
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreload;

impl PartMetadata for NoPreload {
    fn preload_duration(&self, _part: &ResolvedPart) -> Option<f64> {
        None
    }
}

/// Preload leads keyed by part type, with an optional fallback
#[derive(Debug, Clone, Default)]
pub struct PreloadByType {
    leads: HashMap<String, f64>,
    fallback: Option<f64>,
}

impl PreloadByType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part_type: impl Into<String>, seconds: f64) -> Self {
        self.leads.insert(part_type.into(), seconds);
        self
    }

    pub fn with_fallback(mut self, seconds: f64) -> Self {
        self.fallback = Some(seconds);
        self
    }
}

impl PartMetadata for PreloadByType {
    fn preload_duration(&self, part: &ResolvedPart) -> Option<f64> {
        self.leads.get(&part.part_type).copied().or(self.fallback)
    }
}

impl<F> PartMetadata for F
where
    F: Fn(&ResolvedPart) -> Option<f64> + Send + Sync,
{
    fn preload_duration(&self, part: &ResolvedPart) -> Option<f64> {
        self(part)
    }
}

/// Metadata used when the application supplies none: a fixed lead from
/// `default_preload_seconds`, or no preloading when it is unset
pub fn default_metadata(config: &SchedulingConfig) -> Arc<dyn PartMetadata> {
    match config.default_preload_seconds {
        Some(seconds) => Arc::new(FixedPreload(seconds)),
        None => Arc::new(NoPreload),
    }
}

/// Query `metadata` and discard values the scheduler cannot use
pub fn checked_preload(metadata: &dyn PartMetadata, part: &ResolvedPart) -> Option<f64> {
    match metadata.preload_duration(part) {
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds),
        Some(seconds) => {
            warn!(
                part_type = %part.part_type,
                preload = seconds,
                "⚠️ Ignoring invalid preload duration"
            );
            None
        }
        None => None,
    }
}
