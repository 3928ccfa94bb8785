//! Sliding-window rate limiter, one counter per
//! `(operation, identifierType, identifierValue)`.
//!
//! Mirrors the in-process counter style of `store::memory` rather than
//! a fixed-window reset: each key tracks a rolling set of request
//! timestamps and a window is evaluated by pruning anything older than
//! the window length on every check.

use crate::error::ApiError;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Connect,
    SessionCreate,
    ListenerJoin,
    Heartbeat,
    AudioChunk,
    ControlMessage,
}

impl Operation {
    fn window(self) -> Duration {
        match self {
            Operation::Connect => Duration::from_secs(60),
            Operation::SessionCreate => Duration::from_secs(3600),
            Operation::ListenerJoin => Duration::from_secs(60),
            Operation::Heartbeat => Duration::from_secs(60),
            Operation::AudioChunk => Duration::from_secs(1),
            Operation::ControlMessage => Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

#[derive(Default)]
struct Window {
    hits: VecDeque<Instant>,
    violations_since_warning: u32,
    warned: bool,
}

pub struct RateLimiter {
    limits: HashMap<Operation, u32>,
    warning_threshold_violations: u32,
    close_threshold_violations: u32,
    windows: RwLock<HashMap<(Operation, String), Window>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    WarnAndAllow,
    CloseConnection,
}

impl RateLimiter {
    pub fn new(
        limits: HashMap<Operation, u32>,
        warning_threshold_violations: u32,
        close_threshold_violations: u32,
    ) -> Self {
        Self { limits, warning_threshold_violations, close_threshold_violations, windows: RwLock::new(HashMap::new()) }
    }

    /// Record one request for `identifier` under `operation`. Returns
    /// `Ok(())` when within budget; otherwise `Err` carrying how long
    /// until the oldest hit in the window rolls off.
    pub fn check(&self, operation: Operation, identifier: &str) -> Result<Verdict, RateLimitExceeded> {
        let limit = *self.limits.get(&operation).unwrap_or(&u32::MAX);
        let window_len = operation.window();
        let now = Instant::now();
        let key = (operation, identifier.to_string());

        let mut windows = self.windows.write().unwrap();
        let window = windows.entry(key).or_default();
        while let Some(front) = window.hits.front() {
            if now.duration_since(*front) > window_len {
                window.hits.pop_front();
            } else {
                break;
            }
        }
        window.hits.push_back(now);

        if (window.hits.len() as u32) <= limit {
            window.violations_since_warning = 0;
            return Ok(Verdict::Allowed);
        }

        window.violations_since_warning += 1;
        let retry_after = window.hits.front().map(|t| window_len.saturating_sub(now.duration_since(*t))).unwrap_or(window_len);

        if window.violations_since_warning >= self.close_threshold_violations {
            return Err(RateLimitExceeded { retry_after });
        }
        if window.violations_since_warning >= self.warning_threshold_violations && !window.warned {
            window.warned = true;
            return Ok(Verdict::WarnAndAllow);
        }
        Ok(Verdict::Allowed)
    }

    /// One-shot call sites (REST handlers, session creation): a
    /// violation simply fails the request, there's no persistent
    /// connection to warn on.
    pub fn enforce(&self, operation: Operation, identifier: &str, code: &'static str, message: impl Into<String>) -> Result<(), ApiError> {
        match self.check(operation, identifier) {
            Ok(_) => Ok(()),
            Err(e) => Err(ApiError::rate_limit(code, message, e.retry_after.as_millis() as u64)),
        }
    }

    /// Persistent-connection call sites: `Ok(None)` proceeds
    /// unremarked, `Ok(Some(_))` is a warning to deliver while still
    /// performing the request, `Err` means the close threshold has
    /// been crossed and the connection must be torn down.
    pub fn enforce_connection(
        &self,
        operation: Operation,
        identifier: &str,
        warn_code: &'static str,
        warn_message: impl Into<String>,
        close_code: &'static str,
        close_message: impl Into<String>,
    ) -> Result<Option<ApiError>, ApiError> {
        match self.check(operation, identifier) {
            Ok(Verdict::Allowed) => Ok(None),
            Ok(Verdict::WarnAndAllow) => Ok(Some(ApiError::rate_limit(warn_code, warn_message, 0))),
            Ok(Verdict::CloseConnection) => Err(ApiError::rate_limit(close_code, close_message, 0)),
            Err(e) => Err(ApiError::rate_limit(close_code, close_message, e.retry_after.as_millis() as u64)),
        }
    }
}
