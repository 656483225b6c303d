// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rate-limit governor for the Strava API.
//!
//! Interprets a provider response and decides whether the caller may proceed,
//! must wait before re-issuing the identical request, or should give up and
//! hand a resumable cursor back to the caller. The governor itself never
//! sleeps or retries.
//!
//! Usage-counter headers are parsed for observability only. Strava's counters
//! are approximate; throttling preemptively on them would reject requests the
//! provider was still willing to serve. Only an explicit 429 triggers backoff.

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Strava's rate-limit status code.
const RATE_LIMIT_STATUS: u16 = 429;

/// First backoff step when no `Retry-After` header is present.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// What the caller should do about the response it just received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Not rate-limited; carry on.
    Proceed,
    /// Sleep this long, then re-issue the identical request.
    Wait(Duration),
    /// Stop retrying inside this invocation.
    Abort(String),
}

/// Computes wait policy from rate-limit responses.
#[derive(Debug, Clone)]
pub struct RateLimitGovernor {
    max_attempts: u32,
    backoff_cap: Duration,
}

impl RateLimitGovernor {
    pub fn new(max_attempts: u32, backoff_cap: Duration) -> Self {
        Self {
            max_attempts,
            backoff_cap,
        }
    }

    /// Decide what to do after receiving `status` on retry number `attempt`
    /// (0-based). `retry_after` is the raw `Retry-After` header value, if any.
    pub fn evaluate(
        &self,
        status: u16,
        retry_after: Option<&str>,
        attempt: u32,
    ) -> RateLimitDecision {
        if status != RATE_LIMIT_STATUS {
            return RateLimitDecision::Proceed;
        }

        if attempt >= self.max_attempts {
            return RateLimitDecision::Abort(format!(
                "rate limit retry budget exhausted after {} attempts",
                attempt
            ));
        }

        // Honor Retry-After when it parses; a wait longer than the ceiling
        // cannot complete inside this invocation, so stop instead of sleeping.
        if let Some(secs) = retry_after.and_then(|raw| raw.trim().parse::<u64>().ok()) {
            let wait = Duration::from_secs(secs);
            if wait > self.backoff_cap {
                return RateLimitDecision::Abort(format!(
                    "Retry-After of {}s exceeds wait ceiling",
                    secs
                ));
            }
            return RateLimitDecision::Wait(wait);
        }

        let backoff = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt));
        RateLimitDecision::Wait(backoff.min(self.backoff_cap))
    }
}

/// Usage counters reported by Strava for the rolling 15-minute and daily
/// windows. Logged, never acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitUsage {
    pub short_term: u32,
    pub daily: u32,
    pub short_term_limit: Option<u32>,
    pub daily_limit: Option<u32>,
}

impl RateLimitUsage {
    /// Parse `X-RateLimit-Usage` (and `X-RateLimit-Limit` when present),
    /// formatted as "short,daily".
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let (short_term, daily) = headers
            .get("x-ratelimit-usage")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_pair)?;

        let limits = headers
            .get("x-ratelimit-limit")
            .and_then(|h| h.to_str().ok())
            .and_then(parse_pair);

        Some(Self {
            short_term,
            daily,
            short_term_limit: limits.map(|(s, _)| s),
            daily_limit: limits.map(|(_, d)| d),
        })
    }
}

fn parse_pair(raw: &str) -> Option<(u32, u32)> {
    let (short, daily) = raw.split_once(',')?;
    Some((short.trim().parse().ok()?, daily.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn governor() -> RateLimitGovernor {
        RateLimitGovernor::new(3, Duration::from_secs(30))
    }

    #[test]
    fn test_non_429_proceeds() {
        assert_eq!(
            governor().evaluate(200, None, 0),
            RateLimitDecision::Proceed
        );
        assert_eq!(
            governor().evaluate(500, None, 2),
            RateLimitDecision::Proceed
        );
    }

    #[test]
    fn test_retry_after_is_honored() {
        assert_eq!(
            governor().evaluate(429, Some("2"), 0),
            RateLimitDecision::Wait(Duration::from_secs(2))
        );
        // Still honored on later attempts inside the budget
        assert_eq!(
            governor().evaluate(429, Some("2"), 2),
            RateLimitDecision::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let g = governor();
        assert_eq!(
            g.evaluate(429, None, 0),
            RateLimitDecision::Wait(Duration::from_secs(1))
        );
        assert_eq!(
            g.evaluate(429, None, 1),
            RateLimitDecision::Wait(Duration::from_secs(2))
        );

        let wide = RateLimitGovernor::new(16, Duration::from_secs(30));
        assert_eq!(
            wide.evaluate(429, None, 10),
            RateLimitDecision::Wait(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_aborts_when_budget_exhausted() {
        match governor().evaluate(429, Some("2"), 3) {
            RateLimitDecision::Abort(reason) => {
                assert!(reason.contains("retry budget"), "reason: {reason}")
            }
            other => panic!("expected Abort, got {other:?}"),
        }
    }

    #[test]
    fn test_aborts_on_excessive_retry_after() {
        match governor().evaluate(429, Some("120"), 0) {
            RateLimitDecision::Abort(reason) => {
                assert!(reason.contains("ceiling"), "reason: {reason}")
            }
            other => panic!("expected Abort, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_retry_after_falls_back_to_backoff() {
        assert_eq!(
            governor().evaluate(429, Some("soon"), 1),
            RateLimitDecision::Wait(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_usage_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-usage", HeaderValue::from_static("87,543"));
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("100,1000"));

        let usage = RateLimitUsage::from_headers(&headers).unwrap();
        assert_eq!(usage.short_term, 87);
        assert_eq!(usage.daily, 543);
        assert_eq!(usage.short_term_limit, Some(100));
        assert_eq!(usage.daily_limit, Some(1000));
    }

    #[test]
    fn test_usage_header_absent() {
        assert_eq!(RateLimitUsage::from_headers(&HeaderMap::new()), None);
    }
}
