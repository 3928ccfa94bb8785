//! In-process metrics registry.
//!
//! No external exporter is implemented (CloudWatch emission is out of
//! scope); this mirrors the *shape* the original pipeline used —
//! namespaced counters and histograms, readable via [`Metrics::snapshot`]
//! for whatever process wants to ship them onward, and logged at debug
//! level as they're recorded so they show up in `tracing` output during
//! development.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Default)]
struct Histogram {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Histogram {
    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.count,
            sum: self.sum,
            min: self.min,
            max: self.max,
        }
    }
}

/// Process-wide metrics registry. One instance is shared (`Arc`) across
/// every component that needs to record a counter or histogram.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<&'static str, u64>>,
    histograms: RwLock<HashMap<&'static str, Histogram>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, name: &'static str) {
        self.incr_by(name, 1);
    }

    pub fn incr_by(&self, name: &'static str, delta: u64) {
        let mut counters = self.counters.write().unwrap();
        *counters.entry(name).or_insert(0) += delta;
        tracing::trace!(metric = name, delta, "counter incremented");
    }

    pub fn observe(&self, name: &'static str, value: f64) {
        let mut histograms = self.histograms.write().unwrap();
        histograms.entry(name).or_default().record(value);
        tracing::trace!(metric = name, value, "histogram observed");
    }

    pub fn counter(&self, name: &'static str) -> u64 {
        *self.counters.read().unwrap().get(name).unwrap_or(&0)
    }

    /// Snapshot every counter and histogram recorded so far, for an
    /// external exporter (or a test) to inspect.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read().unwrap().clone();
        let histograms = self
            .histograms
            .read()
            .unwrap()
            .iter()
            .map(|(k, v)| (*k, v.snapshot()))
            .collect();
        MetricsSnapshot { counters, histograms }
    }

    /// Ratio helper for cache-hit / success-ratio style metrics:
    /// `hits / (hits + misses)`, `0.0` when both are zero.
    pub fn ratio(&self, hits: &'static str, misses: &'static str) -> f64 {
        let hits = self.counter(hits) as f64;
        let misses = self.counter(misses) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<&'static str, u64>,
    pub histograms: HashMap<&'static str, HistogramSnapshot>,
}

// Well-known metric names, grouped by component so call sites don't
// drift into ad-hoc strings.
pub mod names {
    pub const TRANSLATION_CACHE_HIT: &str = "translation.cache.hit";
    pub const TRANSLATION_CACHE_MISS: &str = "translation.cache.miss";
    pub const FANOUT_DURATION_MS: &str = "fanout.duration_ms";
    pub const FANOUT_LANGUAGE_FAILURE: &str = "fanout.language_failure";
    pub const BROADCAST_SUCCESS: &str = "broadcast.success";
    pub const BROADCAST_FAILURE: &str = "broadcast.failure";
    pub const BROADCAST_STALE: &str = "broadcast.stale";
    pub const BUFFER_OVERFLOW: &str = "audio.buffer.overflow";
    pub const RATE_LIMIT_REJECTED: &str = "rate_limit.rejected";
    pub const PARTIAL_FORWARDED: &str = "partial.forwarded";
    pub const PARTIAL_SUPPRESSED_DEDUP: &str = "partial.suppressed_dedup";
    pub const PARTIAL_SUPPRESSED_GATE: &str = "partial.suppressed_gate";
    pub const PARTIAL_ORPHAN_DROPPED: &str = "partial.orphan_dropped";
    pub const DISCREPANCY_WARN: &str = "partial.discrepancy_warn";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_zero_with_no_samples() {
        let m = Metrics::new();
        assert_eq!(m.ratio("a", "b"), 0.0);
    }

    #[test]
    fn ratio_reflects_hits_and_misses() {
        let m = Metrics::new();
        m.incr(names::TRANSLATION_CACHE_HIT);
        m.incr(names::TRANSLATION_CACHE_HIT);
        m.incr(names::TRANSLATION_CACHE_MISS);
        assert!((m.ratio(names::TRANSLATION_CACHE_HIT, names::TRANSLATION_CACHE_MISS) - 0.6667).abs() < 0.001);
    }

    #[test]
    fn histogram_tracks_min_max_sum() {
        let m = Metrics::new();
        m.observe("x", 1.0);
        m.observe("x", 5.0);
        m.observe("x", 2.0);
        let snap = m.snapshot();
        let h = &snap.histograms["x"];
        assert_eq!(h.count, 3);
        assert_eq!(h.min, 1.0);
        assert_eq!(h.max, 5.0);
        assert_eq!(h.sum, 8.0);
    }
}
