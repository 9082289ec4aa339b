use crate::utils::error::{TransportError, TransportErrorKind};
use std::time::Duration;

/// Attempt ceiling and linear backoff for one recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    backoff_unit: Duration,
    fail_fast_on_auth: bool,
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff_unit: Duration) -> Self {
        Self {
            retries,
            backoff_unit,
            fail_fast_on_auth: false,
        }
    }

    pub fn with_fail_fast_on_auth(mut self, enabled: bool) -> Self {
        self.fail_fast_on_auth = enabled;
        self
    }

    /// First attempt plus `retries`.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after failed attempt number `attempt` (1-based): `unit * attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    pub fn should_retry(&self, attempt: u32, error: &TransportError) -> bool {
        if attempt >= self.max_attempts() {
            return false;
        }
        !(self.fail_fast_on_auth && error.kind == TransportErrorKind::Authentication)
    }
}
