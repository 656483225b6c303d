// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client and paginated fetcher.
//!
//! Handles:
//! - Paginated activity listing, one bounded request per page
//! - Rate limit detection and governed backoff (429 + Retry-After)
//! - Request timeouts, distinguished from definitive failures
//!
//! Token acquisition and refresh are the connect service's concern; the
//! fetcher receives a ready access token per call.

use crate::config::ImportConfig;
use crate::services::cursor::{CursorPosition, CursorState};
use crate::services::governor::{RateLimitDecision, RateLimitGovernor, RateLimitUsage};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Source provider name used in storage keys and run records.
pub const SOURCE_STRAVA: &str = "strava";

/// One page of raw provider records plus the cursor for the next page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Raw records as returned by the provider. Parsed per record downstream
    /// so one malformed record cannot poison the page.
    pub records: Vec<Value>,
    /// Cursor positioned after this page.
    pub next: CursorState,
    /// True when the provider has no more records for this window.
    pub exhausted: bool,
}

/// Fetch failures, split by how the orchestrator must react.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request deadline exceeded and the retry budget is spent. Resumable.
    #[error("provider request timed out")]
    Timeout,

    /// Rate limited and the retry budget is spent. Resumable.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider rejected the access token. Fatal for this run.
    #[error("provider rejected access token")]
    Unauthorized,

    /// Definitive provider failure (unexpected status, bad body). Fatal.
    #[error("provider request failed: {0}")]
    Api(String),
}

/// A paginated feed of raw activity records.
///
/// Implemented by [`StravaClient`] in production and by in-memory fakes in
/// tests, so the orchestrator can be exercised without network access.
#[allow(async_fn_in_trait)]
pub trait ActivitySource: Send + Sync {
    async fn fetch_page(
        &self,
        access_token: &str,
        cursor: &CursorState,
        per_page: u32,
    ) -> Result<FetchedPage, FetchError>;
}

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    governor: RateLimitGovernor,
    request_timeout: Duration,
    max_retries: u32,
}

/// Per-attempt failure, before the retry loop has decided what it means.
enum AttemptError {
    RateLimited {
        retry_after: Option<String>,
        usage: Option<RateLimitUsage>,
    },
    Timeout,
    Unauthorized,
    Failed(String),
}

impl StravaClient {
    /// Create a new client against the given API base URL.
    pub fn new(base_url: &str, import: &ImportConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            governor: RateLimitGovernor::new(import.max_retries, import.backoff_cap),
            request_timeout: import.request_timeout,
            max_retries: import.max_retries,
        }
    }

    /// Issue one bounded listing request.
    async fn list_activities_once(
        &self,
        access_token: &str,
        cursor: &CursorState,
        per_page: u32,
    ) -> Result<Vec<Value>, AttemptError> {
        let url = format!("{}/athlete/activities", self.base_url);

        let mut query: Vec<(&str, String)> = vec![("per_page", per_page.to_string())];
        match &cursor.position {
            CursorPosition::After { epoch, .. } => {
                query.push(("after", epoch.to_string()));
            }
            CursorPosition::Page { page } => {
                query.push(("page", page.to_string()));
                if let Some(after) = cursor.after {
                    query.push(("after", after.to_string()));
                }
            }
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::Timeout
                } else {
                    AttemptError::Failed(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|h| h.to_str().ok())
                .map(str::to_owned);
            let usage = RateLimitUsage::from_headers(response.headers());
            return Err(AttemptError::RateLimited { retry_after, usage });
        }

        if status.as_u16() == 401 {
            return Err(AttemptError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Failed(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| AttemptError::Failed(format!("JSON parse error: {}", e)))
    }
}

impl ActivitySource for StravaClient {
    /// Fetch one page, retrying timeouts and governed rate limits with the
    /// identical request parameters. Exhausting the retry budget surfaces a
    /// resumable error so the run can pause instead of spinning.
    async fn fetch_page(
        &self,
        access_token: &str,
        cursor: &CursorState,
        per_page: u32,
    ) -> Result<FetchedPage, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .list_activities_once(access_token, cursor, per_page)
                .await
            {
                Ok(records) => {
                    let exhausted = (records.len() as u32) < per_page;
                    let next = advance_cursor(cursor, &records);
                    return Ok(FetchedPage {
                        records,
                        next,
                        exhausted,
                    });
                }
                Err(AttemptError::RateLimited { retry_after, usage }) => {
                    if let Some(usage) = usage {
                        tracing::warn!(
                            short_term = usage.short_term,
                            daily = usage.daily,
                            "Strava rate limit hit (429)"
                        );
                    } else {
                        tracing::warn!("Strava rate limit hit (429)");
                    }

                    match self.governor.evaluate(429, retry_after.as_deref(), attempt) {
                        RateLimitDecision::Proceed => {}
                        RateLimitDecision::Wait(wait) => {
                            tracing::info!(
                                wait_ms = wait.as_millis() as u64,
                                attempt,
                                "Backing off before retrying page"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        RateLimitDecision::Abort(reason) => {
                            return Err(FetchError::RateLimited(reason));
                        }
                    }
                    attempt += 1;
                }
                Err(AttemptError::Timeout) => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(FetchError::Timeout);
                    }
                    tracing::warn!(attempt, "Strava request timed out, retrying");
                }
                Err(AttemptError::Unauthorized) => return Err(FetchError::Unauthorized),
                Err(AttemptError::Failed(msg)) => return Err(FetchError::Api(msg)),
            }
        }
    }
}

/// Position the cursor after the given page.
///
/// In cursor mode the new lower bound comes from the newest record that
/// carries a usable id and start time; a page with no usable record leaves
/// the position unchanged (the orchestrator aborts on fully-unusable pages).
fn advance_cursor(cursor: &CursorState, records: &[Value]) -> CursorState {
    let mut next = cursor.clone();
    match &mut next.position {
        CursorPosition::Page { page } => *page += 1,
        CursorPosition::After { epoch, last_id } => {
            for record in records.iter().rev() {
                let id = record.get("id").and_then(Value::as_i64);
                let start = record
                    .get("start_date")
                    .and_then(Value::as_str)
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.timestamp());
                if let (Some(id), Some(start)) = (id, start) {
                    *epoch = (*epoch).max(start);
                    *last_id = id;
                    break;
                }
            }
        }
    }
    next
}

/// Provider-shaped activity record.
///
/// Every field the normalizer does not require is optional with a default so
/// schema drift on incidental fields does not fail the record.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sport_type: Option<String>,
    /// Legacy field still sent by some endpoints; used when `sport_type`
    /// is absent.
    #[serde(default, rename = "type")]
    pub legacy_type: Option<String>,
    pub start_date: String,
    #[serde(default)]
    pub start_date_local: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub utc_offset: Option<f64>,
    #[serde(default)]
    pub elapsed_time: Option<i64>,
    #[serde(default)]
    pub moving_time: Option<i64>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub has_heartrate: Option<bool>,
    #[serde(default)]
    pub average_watts: Option<f64>,
    #[serde(default)]
    pub max_watts: Option<f64>,
    #[serde(default)]
    pub device_watts: Option<bool>,
    #[serde(default)]
    pub kilojoules: Option<f64>,
    #[serde(default)]
    pub calories: Option<f64>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub trainer: Option<bool>,
    #[serde(default)]
    pub manual: Option<bool>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub visibility: Option<String>,
}
