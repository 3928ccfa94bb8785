//! Human-readable session-id generation: `adjective-noun-NNN`.
//!
//! Ported from the original service's word-list generator: draw an
//! adjective and a noun uniformly at random, reject blacklisted words,
//! sample a 3-digit number, and probe the store for uniqueness with
//! bounded retries.

use rand::Rng;
use std::collections::HashSet;

const ADJECTIVES: &[&str] = &[
    "golden", "silver", "quiet", "swift", "bright", "gentle", "bold", "calm",
    "distant", "eager", "faithful", "fierce", "graceful", "humble", "jolly",
    "keen", "lively", "mighty", "noble", "patient", "radiant", "serene",
    "steady", "tender", "vivid", "wandering", "wild", "amber", "azure",
    "crimson", "emerald", "frosty", "hidden", "lucky", "merry", "rustic",
    "sunny", "tranquil", "velvet", "windy", "ancient", "brave", "curious",
    "daring", "earnest", "floating", "glowing", "honest", "icy", "joyful",
];

const NOUNS: &[&str] = &[
    "eagle", "river", "meadow", "harbor", "summit", "canyon", "willow",
    "falcon", "otter", "glacier", "lantern", "compass", "horizon", "orchard",
    "beacon", "thicket", "cascade", "prairie", "boulder", "ember", "garden",
    "hollow", "island", "juniper", "kestrel", "lagoon", "maple", "nebula",
    "oasis", "pinnacle", "quarry", "ridge", "sparrow", "tundra", "utopia",
    "valley", "wren", "coral", "dune", "fjord", "grove", "haven", "ivy",
    "jasper", "knoll", "lynx", "mesa", "nectar", "opal", "plume",
];

/// Words that must never appear in a generated session id, regardless
/// of which list they came from.
const BLACKLIST: &[&str] = &["wild", "hollow"];

#[derive(Debug, thiserror::Error)]
pub enum SessionIdError {
    #[error("exhausted {0} attempts generating a unique session id")]
    Exhausted(u32),
}

/// Generates candidate session ids and checks them against a caller
/// supplied uniqueness predicate (normally "does this key already exist
/// in the store").
pub struct SessionIdGenerator {
    max_attempts: u32,
    blacklist: HashSet<&'static str>,
}

impl SessionIdGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            blacklist: BLACKLIST.iter().copied().collect(),
        }
    }

    fn is_blacklisted(&self, adjective: &str, noun: &str) -> bool {
        self.blacklist.contains(adjective) || self.blacklist.contains(noun)
    }

    fn candidate(&self) -> String {
        let mut rng = rand::rng();
        let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
        let noun = NOUNS[rng.random_range(0..NOUNS.len())];
        let number = rng.random_range(100..=999);
        format!("{adjective}-{noun}-{number}")
    }

    /// Generate a session id unique under `is_unique`, retrying up to
    /// `max_attempts` times within this call.
    pub fn generate(&self, mut is_unique: impl FnMut(&str) -> bool) -> Result<String, SessionIdError> {
        for _attempt in 0..self.max_attempts {
            let id = self.candidate();
            let mut parts = id.splitn(3, '-');
            let adjective = parts.next().unwrap_or_default();
            let noun = parts.next().unwrap_or_default();
            if self.is_blacklisted(adjective, noun) {
                continue;
            }
            if is_unique(&id) {
                return Ok(id);
            }
        }
        Err(SessionIdError::Exhausted(self.max_attempts))
    }

    /// `^[a-z]+-[a-z]+-\d{3}$`, `100 <= NNN <= 999`.
    pub fn validate_format(session_id: &str) -> bool {
        let parts: Vec<&str> = session_id.split('-').collect();
        if parts.len() != 3 {
            return false;
        }
        let (adjective, noun, number) = (parts[0], parts[1], parts[2]);
        if adjective.is_empty() || noun.is_empty() {
            return false;
        }
        if !adjective.chars().all(|c| c.is_ascii_lowercase()) {
            return false;
        }
        if !noun.chars().all(|c| c.is_ascii_lowercase()) {
            return false;
        }
        if number.len() != 3 || !number.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
        matches!(number.parse::<u32>(), Ok(n) if (100..=999).contains(&n))
    }
}

impl Default for SessionIdGenerator {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_format() {
        let gen = SessionIdGenerator::default();
        for _ in 0..200 {
            let id = gen.generate(|_| true).unwrap();
            assert!(SessionIdGenerator::validate_format(&id), "bad id: {id}");
        }
    }

    #[test]
    fn blacklisted_words_never_appear() {
        let gen = SessionIdGenerator::default();
        for _ in 0..500 {
            let id = gen.generate(|_| true).unwrap();
            for word in BLACKLIST {
                assert!(!id.contains(word), "blacklisted word leaked into {id}");
            }
        }
    }

    #[test]
    fn exhausts_after_max_attempts_when_never_unique() {
        let gen = SessionIdGenerator::new(5);
        let err = gen.generate(|_| false).unwrap_err();
        assert!(matches!(err, SessionIdError::Exhausted(5)));
    }

    #[test]
    fn validate_format_rejects_bad_shapes() {
        assert!(!SessionIdGenerator::validate_format("golden-eagle"));
        assert!(!SessionIdGenerator::validate_format("golden-eagle-42"));
        assert!(!SessionIdGenerator::validate_format("golden-eagle-4277"));
        assert!(!SessionIdGenerator::validate_format("Golden-eagle-427"));
        assert!(!SessionIdGenerator::validate_format("golden-eagle-099"));
        assert!(SessionIdGenerator::validate_format("golden-eagle-427"));
    }
}
