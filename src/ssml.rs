//! SSML Generator: wraps translated text in a `<speak><prosody>` envelope
//! whose rate/volume attributes are derived from measured speaker dynamics,
//! with emotion-driven adjustments layered on top.

use crate::types::{Emotion, EmotionDynamics, VolumeLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rate {
    XSlow,
    Slow,
    Medium,
    Fast,
    XFast,
}

impl Rate {
    fn as_str(self) -> &'static str {
        match self {
            Rate::XSlow => "x-slow",
            Rate::Slow => "slow",
            Rate::Medium => "medium",
            Rate::Fast => "fast",
            Rate::XFast => "x-fast",
        }
    }

    fn slower(self) -> Rate {
        match self {
            Rate::XFast => Rate::Fast,
            Rate::Fast => Rate::Medium,
            Rate::Medium => Rate::Slow,
            Rate::Slow | Rate::XSlow => Rate::XSlow,
        }
    }

    fn faster(self) -> Rate {
        match self {
            Rate::XSlow => Rate::Slow,
            Rate::Slow => Rate::Medium,
            Rate::Medium => Rate::Fast,
            Rate::Fast | Rate::XFast => Rate::XFast,
        }
    }
}

/// `rateWpm` thresholds classifying a measured speaking rate into one of
/// the five SSML `prosody rate` buckets.
fn classify_rate(rate_wpm: u32) -> Rate {
    match rate_wpm {
        0..=100 => Rate::XSlow,
        101..=130 => Rate::Slow,
        131..=170 => Rate::Medium,
        171..=200 => Rate::Fast,
        _ => Rate::XFast,
    }
}

fn classify_volume(volume_level: VolumeLevel) -> &'static str {
    match volume_level {
        VolumeLevel::Soft => "soft",
        VolumeLevel::Normal => "medium",
        VolumeLevel::Loud => "loud",
        VolumeLevel::XLoud => "x-loud",
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Builds `<speak><prosody rate=.. volume=..>text</prosody></speak>` for
/// the translated text of one target language, shaped by the measured
/// emotion dynamics of the source segment.
pub fn generate(translated_text: &str, dynamics: EmotionDynamics) -> String {
    let mut rate = classify_rate(dynamics.rate_wpm);
    let volume = classify_volume(dynamics.volume_level);
    let escaped = xml_escape(translated_text);

    let body = match dynamics.emotion {
        Emotion::Sad => {
            rate = rate.slower();
            insert_clause_breaks(&escaped)
        }
        Emotion::Excited => {
            rate = rate.faster();
            escaped
        }
        _ => escaped,
    };

    format!(r#"<speak><prosody rate="{}" volume="{}">{}</prosody></speak>"#, rate.as_str(), volume, body)
}

/// Inserts a short pause at clause boundaries (commas) for a sad-toned
/// segment; periods already get natural TTS pausing.
fn insert_clause_breaks(text: &str) -> String {
    text.replace(',', r#",<break time="300ms"/>"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamics(emotion: Emotion, rate_wpm: u32, volume_level: VolumeLevel) -> EmotionDynamics {
        EmotionDynamics { emotion, intensity: 0.5, rate_wpm, volume_level }
    }

    #[test]
    fn neutral_passes_through_with_medium_rate() {
        let ssml = generate("hola", dynamics(Emotion::Neutral, 150, VolumeLevel::Normal));
        assert_eq!(ssml, r#"<speak><prosody rate="medium" volume="medium">hola</prosody></speak>"#);
    }

    #[test]
    fn sad_biases_slower_and_inserts_breaks_at_commas() {
        let ssml = generate("hola, amigo", dynamics(Emotion::Sad, 150, VolumeLevel::Normal));
        assert!(ssml.contains(r#"rate="slow""#));
        assert!(ssml.contains(r#"<break time="300ms"/>"#));
    }

    #[test]
    fn excited_biases_faster() {
        let ssml = generate("vamos", dynamics(Emotion::Excited, 150, VolumeLevel::Normal));
        assert!(ssml.contains(r#"rate="fast""#));
    }

    #[test]
    fn extreme_rate_biases_clamp_at_the_edges() {
        let ssml = generate("hola", dynamics(Emotion::Sad, 50, VolumeLevel::Normal));
        assert!(ssml.contains(r#"rate="x-slow""#));
        let ssml = generate("hola", dynamics(Emotion::Excited, 250, VolumeLevel::Normal));
        assert!(ssml.contains(r#"rate="x-fast""#));
    }

    #[test]
    fn xml_special_characters_are_escaped() {
        let ssml = generate(r#"<tag> & "quote" 'apos'"#, dynamics(Emotion::Neutral, 150, VolumeLevel::Normal));
        assert!(ssml.contains("&lt;tag&gt; &amp; &quot;quote&quot; &apos;apos&apos;"));
    }

    #[test]
    fn loud_and_soft_volumes_map_to_their_ssml_names() {
        assert_eq!(classify_volume(VolumeLevel::Soft), "soft");
        assert_eq!(classify_volume(VolumeLevel::XLoud), "x-loud");
    }
}
