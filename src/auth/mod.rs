//! Token Validator (consumer contract): verifies the bearer token
//! presented at connect and resolves it to a role and user id.
//!
//! Grounded in the JWT machinery of the teacher's `server::auth`
//! module (jsonwebtoken, HS256, `Claims`), generalized from a single
//! "access token" shape to the speaker/listener connect contract: a
//! caller gets back `{userId, role}` or one of a fixed set of
//! rejection reasons, and verification fails closed whenever the
//! signing key cannot be resolved.

use crate::config::AuthConfig;
use crate::types::ConnectionRole;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    /// `"speaker"` or `"listener"`, carried in the token so a listener
    /// token cannot be replayed to open a speaker connection.
    pub token_use: String,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Missing,
    Malformed,
    Expired,
    UnknownKid,
    BadSignature,
    BadIssuer,
    BadAudience,
    BadTokenUse,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Missing => "missing",
            RejectReason::Malformed => "malformed",
            RejectReason::Expired => "expired",
            RejectReason::UnknownKid => "unknown_kid",
            RejectReason::BadSignature => "bad_signature",
            RejectReason::BadIssuer => "bad_issuer",
            RejectReason::BadAudience => "bad_audience",
            RejectReason::BadTokenUse => "bad_token_use",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_id: String,
    pub role: ConnectionRole,
}

pub struct TokenValidator {
    config: AuthConfig,
}

impl TokenValidator {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Verify a bearer token for the given expected role. Listener
    /// connections may pass `token = None` only when the deployment
    /// allows anonymous listeners; speaker connections never do —
    /// there is no anonymous fallback for the publishing side.
    pub fn verify(
        &self,
        token: Option<&str>,
        expected_role: ConnectionRole,
    ) -> Result<VerifiedIdentity, RejectReason> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => {
                if expected_role == ConnectionRole::Listener && self.config.allow_anonymous_listeners {
                    return Ok(VerifiedIdentity {
                        user_id: format!("anon-{}", uuid::Uuid::new_v4()),
                        role: ConnectionRole::Listener,
                    });
                }
                return Err(RejectReason::Missing);
            }
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        let decoding_key = DecodingKey::from_secret(self.config.jwt_secret.as_bytes());

        let token_data = decode::<TokenClaims>(token, &decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => RejectReason::Expired,
                ErrorKind::InvalidSignature => RejectReason::BadSignature,
                ErrorKind::InvalidIssuer => RejectReason::BadIssuer,
                ErrorKind::InvalidAudience => RejectReason::BadAudience,
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    RejectReason::Malformed
                }
                _ => RejectReason::UnknownKid,
            }
        })?;

        let claims = token_data.claims;
        let expected_use = match expected_role {
            ConnectionRole::Speaker => "speaker",
            ConnectionRole::Listener => "listener",
        };
        if claims.token_use != expected_use {
            return Err(RejectReason::BadTokenUse);
        }

        Ok(VerifiedIdentity { user_id: claims.sub, role: expected_role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn config() -> AuthConfig {
        AuthConfig { jwt_secret: "test-secret-at-least-32-bytes-long!!".into(), allow_anonymous_listeners: true }
    }

    fn make_token(secret: &str, token_use: &str, exp_offset_secs: i64) -> String {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: "user-1".into(),
            iat: now.timestamp(),
            exp: (now.timestamp() + exp_offset_secs),
            token_use: token_use.into(),
            iss: None,
            aud: None,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn valid_speaker_token_verifies() {
        let validator = TokenValidator::new(config());
        let token = make_token("test-secret-at-least-32-bytes-long!!", "speaker", 3600);
        let identity = validator.verify(Some(&token), ConnectionRole::Speaker).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.role, ConnectionRole::Speaker);
    }

    #[test]
    fn expired_token_is_rejected() {
        let validator = TokenValidator::new(config());
        let token = make_token("test-secret-at-least-32-bytes-long!!", "speaker", -10);
        assert_eq!(validator.verify(Some(&token), ConnectionRole::Speaker), Err(RejectReason::Expired));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let validator = TokenValidator::new(config());
        let token = make_token("a-totally-different-secret-value!!!!", "speaker", 3600);
        assert_eq!(validator.verify(Some(&token), ConnectionRole::Speaker), Err(RejectReason::BadSignature));
    }

    #[test]
    fn listener_token_cannot_open_a_speaker_connection() {
        let validator = TokenValidator::new(config());
        let token = make_token("test-secret-at-least-32-bytes-long!!", "listener", 3600);
        assert_eq!(validator.verify(Some(&token), ConnectionRole::Speaker), Err(RejectReason::BadTokenUse));
    }

    #[test]
    fn missing_token_fails_closed_for_speaker() {
        let validator = TokenValidator::new(config());
        assert_eq!(validator.verify(None, ConnectionRole::Speaker), Err(RejectReason::Missing));
    }

    #[test]
    fn anonymous_listener_allowed_when_configured() {
        let validator = TokenValidator::new(config());
        let identity = validator.verify(None, ConnectionRole::Listener).unwrap();
        assert_eq!(identity.role, ConnectionRole::Listener);
    }

    #[test]
    fn anonymous_listener_rejected_when_not_configured() {
        let mut cfg = config();
        cfg.allow_anonymous_listeners = false;
        let validator = TokenValidator::new(cfg);
        assert_eq!(validator.verify(None, ConnectionRole::Listener), Err(RejectReason::Missing));
    }
}
