// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Import run orchestrator.
//!
//! Drives the core loop: fetch page -> normalize -> upsert batch -> log ->
//! decide continue/stop, bounded by a wall-clock budget. The budget is
//! checked before each fetch, never mid-page, so a page once started always
//! finishes and is logged before the run pauses.
//!
//! Run outcomes:
//! - Completed: the provider reported exhaustion; no continuation token.
//! - Paused: budget spent or rate limited; the caller gets a resumable
//!   cursor and a 200, never an error.
//! - Aborted: structural failure (rejected credentials, provider schema
//!   breakage); surfaced as an error response.

use crate::config::ImportConfig;
use crate::db::ImportStore;
use crate::error::AppError;
use crate::models::import::{ImportReport, NewPageLog, PageStats};
use crate::services::cursor::CursorState;
use crate::services::normalize::normalize;
use crate::services::strava::{ActivitySource, FetchError, SOURCE_STRAVA};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Parameters for one import invocation.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    /// Only import activities starting after this instant.
    pub after: Option<DateTime<Utc>>,
    /// Records per provider page.
    pub per_page: u32,
    /// Resumption cursor from a previously paused run.
    pub cursor: Option<CursorState>,
}

/// Drives one import run against a store and an activity source.
pub struct ImportRunner<S, A> {
    store: S,
    source: A,
    config: ImportConfig,
}

impl<S: ImportStore, A: ActivitySource> ImportRunner<S, A> {
    pub fn new(store: S, source: A, config: ImportConfig) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Execute one bounded import invocation for `user_id`.
    pub async fn run(
        &self,
        user_id: Uuid,
        request: ImportRequest,
    ) -> Result<ImportReport, AppError> {
        let run_started = Instant::now();

        let credentials = self
            .store
            .get_strava_credentials(user_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Strava connection for user {}", user_id))
            })?;

        let run = self.store.create_import_run(user_id, SOURCE_STRAVA).await?;

        let resumed = request.cursor.is_some();
        let mut cursor = request
            .cursor
            .unwrap_or_else(|| CursorState::initial(request.after.map(|dt| dt.timestamp())));

        tracing::info!(
            user_id = %user_id,
            run_id = %run.id,
            athlete_id = credentials.athlete_id,
            per_page = request.per_page,
            resumed,
            "Starting import run"
        );

        let mut report = ImportReport::new(run.id);
        let mut page_number: i32 = 1;
        let mut completed = false;

        loop {
            // Budget check happens between pages only; a started page always
            // finishes and is logged.
            if run_started.elapsed() >= self.config.time_budget {
                tracing::info!(run_id = %run.id, "Wall-clock budget spent, pausing run");
                break;
            }

            let requested = cursor.clone();
            let page = match self
                .source
                .fetch_page(&credentials.access_token, &requested, request.per_page)
                .await
            {
                Ok(page) => page,
                Err(FetchError::RateLimited(reason)) => {
                    tracing::warn!(run_id = %run.id, reason = %reason, "Pausing run: rate limited");
                    break;
                }
                Err(FetchError::Timeout) => {
                    tracing::warn!(run_id = %run.id, "Pausing run: provider timeouts");
                    break;
                }
                Err(FetchError::Unauthorized) => {
                    tracing::error!(run_id = %run.id, "Provider rejected access token, aborting");
                    return Err(AppError::InvalidToken);
                }
                Err(FetchError::Api(msg)) => {
                    tracing::error!(run_id = %run.id, error = %msg, "Provider failure, aborting");
                    return Err(AppError::StravaApi(msg));
                }
            };

            let page_started = Instant::now();
            let mut stats = PageStats::new(page.records.len());
            let mut normalize_failures = 0usize;

            for raw in &page.records {
                match normalize(raw, user_id) {
                    Ok(activity) => match self.store.upsert_activity(&activity).await {
                        Ok(outcome) => stats.record(outcome),
                        Err(e) => stats.fail(activity.external_id, e.to_string()),
                    },
                    Err(e) => {
                        normalize_failures += 1;
                        stats.fail(raw.get("id").and_then(Value::as_i64), e.to_string());
                    }
                }
            }

            // The ledger entry is unconditional: partially-failed pages leave
            // an audit trail too.
            self.store
                .append_page_log(&NewPageLog {
                    run_id: run.id,
                    page_number,
                    cursor_params: serde_json::to_value(&requested).unwrap_or(Value::Null),
                    stats: &stats,
                    duration_ms: page_started.elapsed().as_millis() as i64,
                })
                .await?;

            tracing::info!(
                run_id = %run.id,
                page = page_number,
                fetched = stats.fetched,
                imported = stats.imported,
                duplicates = stats.duplicates,
                updated = stats.updated,
                failed = stats.failed(),
                "Page processed"
            );

            report.absorb(&stats);

            // A whole page failing normalization means the provider schema
            // changed under us; resuming would repeat the same failure.
            if stats.fetched > 1 && normalize_failures == stats.fetched {
                tracing::error!(
                    run_id = %run.id,
                    page = page_number,
                    "Every record in page failed normalization, aborting"
                );
                return Err(AppError::StravaApi(format!(
                    "all {} records on page {} failed normalization",
                    stats.fetched, page_number
                )));
            }

            cursor = page.next;
            page_number += 1;

            if page.exhausted {
                completed = true;
                break;
            }
        }

        if !completed {
            report.paused = true;
            report.continuation_token = Some(cursor.encode());
        }

        tracing::info!(
            run_id = %run.id,
            imported = report.imported,
            duplicates = report.duplicates,
            updated = report.updated,
            failed = report.failed.len(),
            paused = report.paused,
            "Import run finished"
        );

        Ok(report)
    }
}
