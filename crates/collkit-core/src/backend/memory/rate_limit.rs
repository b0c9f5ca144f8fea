use crate::backend::{
    rate_limit::{RateLimitRule, RateLimiter},
    transport::EndpointKind,
};
use dashmap::DashMap;
use std::time::Instant;

type RuleKey = (EndpointKind, String);

///
/// MemoryRateLimiter
///
/// Sliding-window limiter: each (endpoint, connection) pair keeps the
/// instants of its recent requests and is refused once the window is full.
/// Endpoints without a rule are never limited.
///

#[derive(Debug, Default)]
pub struct MemoryRateLimiter {
    rules: DashMap<RuleKey, RateLimitRule>,
    requests: DashMap<(EndpointKind, String, String), Vec<Instant>>,
}

impl MemoryRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rule(&self, scope: EndpointKind, name: &str) -> Option<RateLimitRule> {
        self.rules
            .get(&(scope, name.to_string()))
            .map(|rule| rule.value().clone())
    }

    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Check whether a request is allowed and record it.
    pub fn check_and_record(&self, scope: EndpointKind, name: &str, connection_id: &str) -> bool {
        self.check_and_record_at(scope, name, connection_id, Instant::now())
    }

    fn check_and_record_at(
        &self,
        scope: EndpointKind,
        name: &str,
        connection_id: &str,
        now: Instant,
    ) -> bool {
        let Some(limit) = self
            .rules
            .get(&(scope, name.to_string()))
            .map(|rule| rule.limit)
        else {
            return true;
        };

        let mut entry = self
            .requests
            .entry((scope, name.to_string(), connection_id.to_string()))
            .or_default();

        // drop requests that fell out of the window
        entry.retain(|&at| now.saturating_duration_since(at) < limit.interval);

        if entry.len() >= limit.max_requests as usize {
            return false;
        }

        entry.push(now);
        true
    }

    /// Drop windows with no recent requests.
    pub fn cleanup(&self) {
        let now = Instant::now();

        self.requests.retain(|(scope, name, _), requests| {
            let interval = self
                .rules
                .get(&(*scope, name.clone()))
                .map(|rule| rule.limit.interval);

            match interval {
                Some(interval) => {
                    requests.retain(|&at| now.saturating_duration_since(at) < interval);
                    !requests.is_empty()
                }
                None => false,
            }
        });
    }
}

impl RateLimiter for MemoryRateLimiter {
    fn add_rule(&self, rule: RateLimitRule) {
        self.rules.insert((rule.scope, rule.name.clone()), rule);
    }
}
