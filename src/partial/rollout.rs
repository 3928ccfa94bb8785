//! Consistent-hash feature-flag rollout: a session is assigned to a
//! stable 0-99 bucket via SHA-256 of its id, and its verdict never
//! flips for the lifetime of that configuration snapshot.

use crate::types::SessionId;
use sha2::{Digest, Sha256};

pub struct RolloutFlag {
    enabled: bool,
    rollout_percentage: u32,
}

impl RolloutFlag {
    pub fn new(enabled: bool, rollout_percentage: u32) -> Self {
        Self { enabled, rollout_percentage: rollout_percentage.min(100) }
    }

    pub fn enabled_for(&self, session_id: &SessionId) -> bool {
        if !self.enabled {
            return false;
        }
        if self.rollout_percentage >= 100 {
            return true;
        }
        bucket_for(session_id) < self.rollout_percentage
    }
}

/// SHA-256 the session id, take the first 4 bytes as a big-endian
/// integer, and reduce mod 100.
pub fn bucket_for(session_id: &SessionId) -> u32 {
    let digest = Sha256::digest(session_id.0.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    value % 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_session_never_flips_verdict() {
        let flag = RolloutFlag::new(true, 50);
        let session = SessionId("golden-eagle-427".into());
        let first = flag.enabled_for(&session);
        for _ in 0..20 {
            assert_eq!(flag.enabled_for(&session), first);
        }
    }

    #[test]
    fn globally_disabled_overrides_bucket() {
        let flag = RolloutFlag::new(false, 100);
        assert!(!flag.enabled_for(&SessionId("golden-eagle-427".into())));
    }

    #[test]
    fn full_rollout_enables_every_session() {
        let flag = RolloutFlag::new(true, 100);
        for i in 0..50 {
            assert!(flag.enabled_for(&SessionId(format!("session-{i}"))));
        }
    }

    #[test]
    fn bucket_is_within_0_to_99() {
        for i in 0..200 {
            let bucket = bucket_for(&SessionId(format!("session-{i}")));
            assert!(bucket < 100);
        }
    }
}
