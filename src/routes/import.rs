// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Import routes: trigger a Strava import run and read the audit ledger.

use crate::error::{AppError, Result};
use crate::middleware::auth::Identity;
use crate::models::import::{ImportPageLog, ImportReport, ImportRun};
use crate::services::cursor::CursorState;
use crate::services::import::{ImportRequest, ImportRunner};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

const MAX_PER_PAGE: u32 = 100;
const RUN_LIST_LIMIT: i64 = 20;

/// Import routes (require gateway identity).
/// The identity middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/import/strava", post(import_strava))
        .route("/api/import/runs", get(list_runs))
        .route("/api/import/runs/{id}", get(get_run))
}

// ─── Import Trigger ──────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
pub struct ImportParams {
    /// Only import activities starting after this instant (RFC3339).
    pub after: Option<String>,
    /// Page size hint.
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<u32>,
    /// Continuation token from a previously paused run.
    pub cursor: Option<String>,
}

fn parse_after_timestamp(after: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    after
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|_| {
                    AppError::BadRequest(
                        "Invalid 'after' parameter: must be RFC3339 datetime".to_string(),
                    )
                })
        })
        .transpose()
}

/// Run one bounded Strava import invocation for the caller.
///
/// A paused run is a success: the response carries `paused: true` and a
/// continuation token to resubmit. Only structural failures (bad cursor,
/// missing or rejected credentials, provider breakage) produce an error.
async fn import_strava(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ImportParams>,
) -> Result<Json<ImportReport>> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let after = parse_after_timestamp(params.after.as_deref())?;
    let cursor = params
        .cursor
        .as_deref()
        .map(CursorState::decode)
        .transpose()
        .map_err(|e| AppError::InvalidCursor(e.to_string()))?;

    let per_page = params
        .per_page
        .unwrap_or(state.config.import.page_size)
        .min(MAX_PER_PAGE);

    tracing::info!(
        user_id = %identity.user_id,
        after = ?params.after,
        per_page,
        resumed = cursor.is_some(),
        "Import requested"
    );

    let runner = ImportRunner::new(
        state.store.clone(),
        state.strava.clone(),
        state.config.import.clone(),
    );

    let report = runner
        .run(
            identity.user_id,
            ImportRequest {
                after,
                per_page,
                cursor,
            },
        )
        .await?;

    Ok(Json(report))
}

// ─── Audit Ledger ────────────────────────────────────────────

/// One run in the run listing.
#[derive(Serialize)]
pub struct ImportRunSummary {
    pub id: Uuid,
    pub source: String,
    pub started_at: String,
}

impl From<ImportRun> for ImportRunSummary {
    fn from(run: ImportRun) -> Self {
        Self {
            id: run.id,
            source: run.source,
            started_at: format_utc_rfc3339(run.started_at),
        }
    }
}

/// Run detail: the run plus its per-page ledger entries.
#[derive(Serialize)]
pub struct ImportRunDetail {
    #[serde(flatten)]
    pub run: ImportRunSummary,
    pub pages: Vec<ImportPageLog>,
}

/// List the caller's recent import runs, newest first.
async fn list_runs(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ImportRunSummary>>> {
    let runs = state
        .store
        .list_import_runs(identity.user_id, RUN_LIST_LIMIT)
        .await?;
    Ok(Json(runs.into_iter().map(ImportRunSummary::from).collect()))
}

/// One run with its page logs.
async fn get_run(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ImportRunDetail>> {
    let (run, pages) = state
        .store
        .get_import_run(identity.user_id, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Import run {}", run_id)))?;

    Ok(Json(ImportRunDetail {
        run: run.into(),
        pages,
    }))
}
