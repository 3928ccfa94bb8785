//! Audio quality analyzers: best-effort, parallel, never gate the
//! pipeline. Ported from a signal-processing service that ran these
//! checks as advisory quality events rather than ASR admission gates.

use crate::types::VolumeLevel;
use std::collections::VecDeque;

fn to_normalized(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

/// Rolling-window SNR estimator: noise floor from quiet frames
/// (|amplitude| < -40 dB), signal RMS from the whole chunk.
pub struct SnrCalculator {
    history: VecDeque<f32>,
    window_measurements: usize,
}

impl SnrCalculator {
    pub fn new(window_chunks: usize) -> Self {
        Self { history: VecDeque::new(), window_measurements: window_chunks }
    }

    pub fn calculate(&mut self, samples: &[i16]) -> f32 {
        let normalized = to_normalized(samples);
        let signal_rms = rms(&normalized);

        const NOISE_THRESHOLD: f32 = 0.01;
        let noise_frames: Vec<f32> = normalized.iter().copied().filter(|s| s.abs() < NOISE_THRESHOLD).collect();
        let noise_rms = if noise_frames.is_empty() { 1e-10 } else { rms(&noise_frames).max(1e-10) };

        let snr_db = if signal_rms > 0.0 { 20.0 * (signal_rms / noise_rms).log10() } else { -100.0 };
        let snr_db = snr_db.min(100.0);

        self.history.push_back(snr_db);
        while self.history.len() > self.window_measurements {
            self.history.pop_front();
        }
        snr_db
    }

    pub fn rolling_average(&self) -> Option<f32> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f32>() / self.history.len() as f32)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippingResult {
    pub percentage: f32,
    pub clipped_count: usize,
    pub is_clipping: bool,
}

/// Fraction of samples at or above `threshold_percent` of full scale,
/// flagged if it exceeds `clipping_threshold_percent` of the chunk.
pub fn detect_clipping(samples: &[i16], threshold_percent: f32, clipping_threshold_percent: f32) -> ClippingResult {
    const MAX_AMPLITUDE: f32 = i16::MAX as f32;
    let threshold = MAX_AMPLITUDE * (threshold_percent / 100.0);
    let clipped_count = samples.iter().filter(|&&s| (s as f32).abs() >= threshold).count();
    let percentage = if samples.is_empty() { 0.0 } else { (clipped_count as f32 / samples.len() as f32) * 100.0 };
    ClippingResult { percentage, clipped_count, is_clipping: percentage > clipping_threshold_percent }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoResult {
    pub echo_level_db: f32,
    pub delay_ms: f32,
    pub has_echo: bool,
}

/// Autocorrelation-based echo detector over the 10-500ms delay range,
/// flagging a peak above `threshold_db` relative to the zero-lag
/// autocorrelation.
pub fn detect_echo(samples: &[i16], sample_rate: u32, min_delay_ms: u32, max_delay_ms: u32, threshold_db: f32) -> EchoResult {
    let normalized = to_normalized(samples);
    let min_lag = (min_delay_ms as u64 * sample_rate as u64 / 1000) as usize;
    let max_lag = (max_delay_ms as u64 * sample_rate as u64 / 1000) as usize;

    if normalized.len() <= max_lag.max(1) {
        return EchoResult { echo_level_db: -100.0, delay_ms: 0.0, has_echo: false };
    }

    let zero_lag: f32 = normalized.iter().map(|s| s * s).sum();
    if zero_lag <= 0.0 {
        return EchoResult { echo_level_db: -100.0, delay_ms: 0.0, has_echo: false };
    }

    let mut best_lag = min_lag;
    let mut best_corr = f32::MIN;
    for lag in min_lag..=max_lag.min(normalized.len() - 1) {
        let corr: f32 = (0..normalized.len() - lag).map(|i| normalized[i] * normalized[i + lag]).sum();
        if corr > best_corr {
            best_corr = corr;
            best_lag = lag;
        }
    }

    let normalized_corr = (best_corr / zero_lag).max(1e-10);
    let echo_level_db = 20.0 * normalized_corr.log10();
    let delay_ms = (best_lag as f32 * 1000.0) / sample_rate as f32;
    EchoResult { echo_level_db, delay_ms, has_echo: echo_level_db > threshold_db }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilenceResult {
    pub is_silent: bool,
    pub duration_s: f32,
    pub energy_db: f32,
}

/// Two-threshold hysteresis silence detector: below `silence_threshold_db`
/// starts (or continues) the silence timer; above `reset_threshold_db`
/// clears it. Flags only once continuous silence exceeds
/// `duration_threshold_s`, so brief speech pauses never trigger it.
pub struct SilenceDetector {
    silence_threshold_db: f32,
    reset_threshold_db: f32,
    duration_threshold_s: f32,
    silence_start: Option<f32>,
}

impl SilenceDetector {
    pub fn new(silence_threshold_db: f32, duration_threshold_s: f32) -> Self {
        Self { silence_threshold_db, reset_threshold_db: -40.0, duration_threshold_s, silence_start: None }
    }

    pub fn detect(&mut self, samples: &[i16], timestamp_s: f32) -> SilenceResult {
        let normalized = to_normalized(samples);
        let signal_rms = rms(&normalized);
        let energy_db = if signal_rms > 0.0 { 20.0 * signal_rms.log10() } else { -100.0 };

        let duration_s = if energy_db < self.silence_threshold_db {
            let start = *self.silence_start.get_or_insert(timestamp_s);
            timestamp_s - start
        } else if energy_db > self.reset_threshold_db {
            self.silence_start = None;
            0.0
        } else if let Some(start) = self.silence_start {
            timestamp_s - start
        } else {
            0.0
        };

        SilenceResult { is_silent: duration_s > self.duration_threshold_s, duration_s, energy_db }
    }

    pub fn reset(&mut self) {
        self.silence_start = None;
    }
}

/// Maps a measured energy level (the same `energy_db` a
/// [`SilenceDetector`] computes from RMS) to a [`VolumeLevel`],
/// preserving the relative dB cutoffs of the original loud/medium/
/// soft/whisper thresholds (-10/-20/-30 dB) against this crate's
/// four-variant scale.
pub fn classify_volume(energy_db: f32) -> VolumeLevel {
    if energy_db >= -10.0 {
        VolumeLevel::XLoud
    } else if energy_db >= -20.0 {
        VolumeLevel::Loud
    } else if energy_db >= -30.0 {
        VolumeLevel::Normal
    } else {
        VolumeLevel::Soft
    }
}

/// Energy-based onset counter: a rising edge through `onset_threshold`
/// (normalized RMS) is counted as one onset, debounced by `min_gap_s`
/// so a single syllable isn't double-counted. Words-per-minute is
/// derived from the onset count over a rolling time window, clamped to
/// the 60-240 wpm range a plausible speaking rate falls in.
pub struct SpeakingRateEstimator {
    onset_threshold: f32,
    min_gap_s: f32,
    window_s: f32,
    above_threshold: bool,
    onsets: VecDeque<f32>,
}

impl SpeakingRateEstimator {
    pub fn new(onset_threshold: f32, min_gap_s: f32, window_s: f32) -> Self {
        Self { onset_threshold, min_gap_s, window_s, above_threshold: false, onsets: VecDeque::new() }
    }

    pub fn update(&mut self, samples: &[i16], timestamp_s: f32) -> u32 {
        let normalized = to_normalized(samples);
        let level = rms(&normalized);

        if level >= self.onset_threshold {
            if !self.above_threshold {
                let debounced = self.onsets.back().map(|t| timestamp_s - t >= self.min_gap_s).unwrap_or(true);
                if debounced {
                    self.onsets.push_back(timestamp_s);
                }
            }
            self.above_threshold = true;
        } else {
            self.above_threshold = false;
        }

        while let Some(&front) = self.onsets.front() {
            if timestamp_s - front > self.window_s {
                self.onsets.pop_front();
            } else {
                break;
            }
        }

        self.wpm()
    }

    fn wpm(&self) -> u32 {
        let Some(&first) = self.onsets.front() else { return 150 };
        let Some(&last) = self.onsets.back() else { return 150 };
        if self.onsets.len() < 2 {
            return 150;
        }
        let span = (last - first).max(0.5);
        let rate = (self.onsets.len() as f32 / span) * 60.0;
        rate.clamp(60.0, 240.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq_hz: f32, sample_rate: u32, n: usize, amplitude: f32) -> Vec<i16> {
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * std::f32::consts::PI * freq_hz * t).sin() * amplitude * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn loud_tone_reports_positive_signal_vs_near_zero_samples() {
        let loud = tone(440.0, 16000, 1600, 0.9);
        let mut snr = SnrCalculator::new(20);
        let loud_db = snr.calculate(&loud);
        assert!(loud_db > 0.0, "expected a clear tone to register a positive SNR, got {loud_db}");
    }

    #[test]
    fn full_scale_samples_are_flagged_as_clipping() {
        let samples = vec![i16::MAX; 1000];
        let result = detect_clipping(&samples, 98.0, 1.0);
        assert!(result.is_clipping);
        assert_eq!(result.clipped_count, 1000);
    }

    #[test]
    fn quiet_samples_are_not_flagged_as_clipping() {
        let samples = tone(440.0, 16000, 1600, 0.01);
        let result = detect_clipping(&samples, 98.0, 1.0);
        assert!(!result.is_clipping);
    }

    #[test]
    fn sustained_silence_is_detected_after_duration_threshold() {
        let silence = vec![0i16; 100];
        let mut detector = SilenceDetector::new(-50.0, 5.0);
        let r1 = detector.detect(&silence, 0.0);
        assert!(!r1.is_silent);
        let r2 = detector.detect(&silence, 6.0);
        assert!(r2.is_silent);
    }

    #[test]
    fn loud_audio_resets_the_silence_timer() {
        let silence = vec![0i16; 100];
        let loud = tone(440.0, 16000, 100, 0.9);
        let mut detector = SilenceDetector::new(-50.0, 5.0);
        detector.detect(&silence, 0.0);
        let reset = detector.detect(&loud, 1.0);
        assert_eq!(reset.duration_s, 0.0);
        let r = detector.detect(&silence, 2.0);
        assert!(!r.is_silent);
    }

    #[test]
    fn echo_detector_handles_short_chunks_gracefully() {
        let samples = vec![0i16; 10];
        let result = detect_echo(&samples, 16000, 10, 500, -15.0);
        assert!(!result.has_echo);
    }

    #[test]
    fn volume_classification_follows_the_db_cutoffs() {
        assert_eq!(classify_volume(-5.0), VolumeLevel::XLoud);
        assert_eq!(classify_volume(-15.0), VolumeLevel::Loud);
        assert_eq!(classify_volume(-25.0), VolumeLevel::Normal);
        assert_eq!(classify_volume(-60.0), VolumeLevel::Soft);
    }

    #[test]
    fn speaking_rate_counts_debounced_onsets_within_the_window() {
        let mut estimator = SpeakingRateEstimator::new(0.1, 0.2, 10.0);
        let loud = tone(440.0, 16000, 160, 0.9);
        let quiet = vec![0i16; 160];
        // Five syllables spaced 0.5s apart, well past the debounce gap.
        for i in 0..5 {
            let t = i as f32 * 0.5;
            estimator.update(&loud, t);
            estimator.update(&quiet, t + 0.1);
        }
        let wpm = estimator.update(&quiet, 2.5);
        assert!((60..=240).contains(&wpm), "expected a clamped plausible rate, got {wpm}");
    }

    #[test]
    fn speaking_rate_defaults_to_a_neutral_pace_with_no_onsets() {
        let mut estimator = SpeakingRateEstimator::new(0.5, 0.2, 10.0);
        let silence = vec![0i16; 160];
        assert_eq!(estimator.update(&silence, 0.0), 150);
    }
}
