use crate::backend::transport::EndpointKind;
use std::time::Duration;

///
/// RateLimit
///
/// Requests allowed per connection within one interval.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub interval: Duration,
}

impl RateLimit {
    #[must_use]
    pub const fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
        }
    }

    #[must_use]
    pub const fn per_millis(max_requests: u32, interval_ms: u64) -> Self {
        Self::new(max_requests, Duration::from_millis(interval_ms))
    }

    /// Both values set and non-zero.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.max_requests > 0 && !self.interval.is_zero()
    }
}

///
/// RateLimitRule
///
/// Limit applied to one method or feed name, counted per connection.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RateLimitRule {
    pub scope: EndpointKind,
    pub name: String,
    pub limit: RateLimit,
}

impl RateLimitRule {
    pub fn new(scope: EndpointKind, name: impl Into<String>, limit: RateLimit) -> Self {
        Self {
            scope,
            name: name.into(),
            limit,
        }
    }
}

///
/// RateLimiter
///

pub trait RateLimiter: Send + Sync {
    fn add_rule(&self, rule: RateLimitRule);
}
