//! Partial Result Buffer & Handler: mediates between the speaker's
//! need for low perceived latency and the listener's need for stable
//! text, via four forwarding gates, a dedup cache, and a
//! final-vs-partial discrepancy check.

pub mod dedup;
pub mod rollout;

use crate::config::PartialResultsConfig;
use crate::types::{SessionId, TranscriptResult};
use chrono::{DateTime, Duration, Utc};
use dedup::DedupCache;
use rollout::RolloutFlag;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone)]
struct BufferedResult {
    result: TranscriptResult,
    added_at: DateTime<Utc>,
    forwarded: bool,
}

fn ends_at_sentence_boundary(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.') | Some('!') | Some('?'))
}

/// Levenshtein edit distance, used for the partial-vs-final
/// discrepancy check.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut row: Vec<usize> = (0..=m).collect();
    for i in 1..=n {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=m {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + row[j].min(row[j - 1]).min(prev_diag)
            };
            prev_diag = temp;
        }
    }
    row[m]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardDecision {
    Forward,
    Suppress,
}

pub struct PartialResultHandler {
    config: PartialResultsConfig,
    rollout: RolloutFlag,
    dedup: DedupCache,
    buffers: Mutex<HashMap<SessionId, Vec<BufferedResult>>>,
}

impl PartialResultHandler {
    pub fn new(config: PartialResultsConfig) -> Self {
        let rollout = RolloutFlag::new(config.enabled, config.rollout_percentage);
        let dedup = DedupCache::new(Duration::seconds(config.dedup_ttl_secs), config.dedup_max_entries);
        Self { config, rollout, dedup, buffers: Mutex::new(HashMap::new()) }
    }

    /// Handle an ASR `Partial` event: buffer it, then walk the
    /// session's buffer forwarding any entries that now qualify.
    pub fn on_partial(&self, result: TranscriptResult) -> Vec<TranscriptResult> {
        let session_id = result.session_id.clone();
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers.entry(session_id.clone()).or_default();
        buffer.push(BufferedResult { result, added_at: Utc::now(), forwarded: false });

        let mut forwarded = Vec::new();
        for entry in buffer.iter_mut() {
            if entry.forwarded {
                continue;
            }
            if self.qualifies(&session_id, entry) {
                entry.forwarded = true;
                self.dedup.insert(&entry.result.text);
                forwarded.push(entry.result.clone());
            }
        }
        forwarded
    }

    fn qualifies(&self, session_id: &SessionId, entry: &BufferedResult) -> bool {
        if !self.rollout.enabled_for(session_id) {
            return false;
        }
        if entry.result.stability_score.unwrap_or(0.0) < self.config.min_stability {
            return false;
        }
        let timed_out =
            (Utc::now() - entry.added_at).num_milliseconds() as f64 >= self.config.max_buffer_timeout_secs * 1000.0;
        if !ends_at_sentence_boundary(&entry.result.text) && !timed_out {
            return false;
        }
        if self.dedup.contains(&entry.result.text) {
            return false;
        }
        true
    }

    /// Handle an ASR `Final` event. Removes the partials it
    /// supersedes, logs a discrepancy warning if any removed partial
    /// had already been forwarded with materially different text, and
    /// returns `Forward` unless the final's normalized text is already
    /// in the dedup cache (meaning a forwarded partial pre-empted it).
    pub fn on_final(&self, result: &TranscriptResult) -> ForwardDecision {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers.entry(result.session_id.clone()).or_default();

        let removed = remove_corresponding(buffer, result);
        for partial in removed.iter().filter(|p| p.forwarded) {
            let discrepancy = discrepancy_pct(&partial.result.text, &result.text);
            if discrepancy >= self.config.discrepancy_threshold_pct {
                warn!(
                    session_id = %result.session_id,
                    result_id = %result.result_id,
                    discrepancy_pct = discrepancy,
                    "final result diverges from a forwarded partial"
                );
            }
        }

        if self.dedup.contains(&result.text) {
            ForwardDecision::Suppress
        } else {
            self.dedup.insert(&result.text);
            ForwardDecision::Forward
        }
    }

    /// Drop buffered partials older than `orphanTimeout`, returning how
    /// many were swept, so callers can bump a counter.
    pub fn sweep_orphans(&self, session_id: &SessionId) -> usize {
        let mut buffers = self.buffers.lock().unwrap();
        let Some(buffer) = buffers.get_mut(session_id) else { return 0 };
        let cutoff = Duration::milliseconds((self.config.orphan_timeout_secs * 1000.0) as i64);
        let before = buffer.len();
        buffer.retain(|entry| Utc::now() - entry.added_at < cutoff);
        before - buffer.len()
    }
}

fn remove_corresponding(buffer: &mut Vec<BufferedResult>, result: &TranscriptResult) -> Vec<BufferedResult> {
    let mut removed = Vec::new();
    if let Some(replaces) = result.replaces_result_ids.as_ref().filter(|ids| !ids.is_empty()) {
        let ids: std::collections::HashSet<&str> = replaces.iter().map(|s| s.as_str()).collect();
        let mut i = 0;
        while i < buffer.len() {
            if ids.contains(buffer[i].result.result_id.as_str()) {
                removed.push(buffer.remove(i));
            } else {
                i += 1;
            }
        }
    } else {
        let window_start = result.timestamp - Duration::seconds(5);
        let mut i = 0;
        while i < buffer.len() {
            let ts = buffer[i].result.timestamp;
            if ts >= window_start && ts <= result.timestamp {
                removed.push(buffer.remove(i));
            } else {
                i += 1;
            }
        }
    }
    removed
}

fn discrepancy_pct(partial: &str, final_text: &str) -> f64 {
    let distance = levenshtein(partial, final_text);
    let max_len = partial.chars().count().max(final_text.chars().count()).max(1);
    (distance as f64 / max_len as f64) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, session: &str, text: &str, stability: f32, is_final: bool) -> TranscriptResult {
        TranscriptResult {
            result_id: id.into(),
            session_id: SessionId(session.into()),
            source_language: "en".into(),
            text: text.into(),
            timestamp: Utc::now(),
            is_final,
            stability_score: Some(stability),
            replaces_result_ids: None,
        }
    }

    fn config() -> PartialResultsConfig {
        PartialResultsConfig { rollout_percentage: 100, ..PartialResultsConfig::default() }
    }

    #[test]
    fn low_stability_partial_is_not_forwarded() {
        let handler = PartialResultHandler::new(config());
        let r = result("p1", "golden-eagle-427", "hello there.", 0.5, false);
        assert!(handler.on_partial(r).is_empty());
    }

    #[test]
    fn stable_sentence_boundary_partial_is_forwarded() {
        let handler = PartialResultHandler::new(config());
        let r = result("p1", "golden-eagle-427", "hello there.", 0.95, false);
        let forwarded = handler.on_partial(r);
        assert_eq!(forwarded.len(), 1);
    }

    #[test]
    fn mid_sentence_stable_partial_waits_for_timeout() {
        let handler = PartialResultHandler::new(config());
        let r = result("p1", "golden-eagle-427", "hello there", 0.95, false);
        assert!(handler.on_partial(r).is_empty());
    }

    #[test]
    fn dedup_suppresses_repeated_normalized_text() {
        let handler = PartialResultHandler::new(config());
        let r1 = result("p1", "golden-eagle-427", "hello there.", 0.95, false);
        assert_eq!(handler.on_partial(r1).len(), 1);
        let r2 = result("p2", "golden-eagle-427", "Hello, there!", 0.95, false);
        assert!(handler.on_partial(r2).is_empty());
    }

    #[test]
    fn final_is_suppressed_when_its_partial_already_forwarded() {
        let handler = PartialResultHandler::new(config());
        let partial = result("p1", "golden-eagle-427", "hello there.", 0.95, false);
        handler.on_partial(partial);
        let mut fin = result("f1", "golden-eagle-427", "hello there.", 1.0, true);
        fin.replaces_result_ids = Some(vec!["p1".into()]);
        assert_eq!(handler.on_final(&fin), ForwardDecision::Suppress);
    }

    #[test]
    fn final_is_forwarded_when_no_partial_preempted_it() {
        let handler = PartialResultHandler::new(config());
        let fin = result("f1", "golden-eagle-427", "totally fresh text.", 1.0, true);
        assert_eq!(handler.on_final(&fin), ForwardDecision::Forward);
    }

    #[test]
    fn rollout_disabled_suppresses_all_partials() {
        let handler = PartialResultHandler::new(PartialResultsConfig { rollout_percentage: 0, ..config() });
        let r = result("p1", "golden-eagle-427", "hello there.", 0.95, false);
        assert!(handler.on_partial(r).is_empty());
    }

    #[test]
    fn orphan_sweep_drops_stale_partials() {
        let handler = PartialResultHandler::new(PartialResultsConfig {
            orphan_timeout_secs: 0.0,
            min_stability: 2.0, // never qualifies, stays buffered
            ..config()
        });
        let session = SessionId("golden-eagle-427".into());
        handler.on_partial(result("p1", "golden-eagle-427", "hello.", 0.5, false));
        assert_eq!(handler.sweep_orphans(&session), 1);
    }

    #[test]
    fn discrepancy_calculation_matches_edit_distance_over_max_len() {
        assert_eq!(discrepancy_pct("hello", "hello"), 0.0);
        assert!((discrepancy_pct("hello", "jello") - 20.0).abs() < 0.01);
    }
}
