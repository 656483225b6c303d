// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Postgres store with typed operations.
//!
//! Provides high-level operations for:
//! - Strava credentials (read-only; written by the connect service)
//! - Activities (deduplicating upsert)
//! - Import runs and the per-page audit ledger

use crate::db::ImportStore;
use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::import::{
    ImportPageLog, ImportRun, NewPageLog, StravaCredentials, UpsertOutcome,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres database client.
#[derive(Clone)]
pub struct PgStore {
    pool: Option<PgPool>,
}

impl PgStore {
    /// Connect to Postgres and run pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Postgres: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(format!("Migration failed: {}", e)))?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool: Some(pool) })
    }

    /// Create a mock store for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { pool: None }
    }

    /// Helper to get the pool or return an error if offline.
    fn pool(&self) -> Result<&PgPool, AppError> {
        self.pool
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Ledger Reads ────────────────────────────────────────────

    /// Recent import runs for a user, newest first.
    pub async fn list_import_runs(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<ImportRun>, AppError> {
        let runs = sqlx::query_as::<_, ImportRun>(
            "SELECT id, user_id, source, started_at
             FROM import_runs
             WHERE user_id = $1
             ORDER BY started_at DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;
        Ok(runs)
    }

    /// One run with its page logs, or `None` if the run does not exist or
    /// belongs to someone else.
    pub async fn get_import_run(
        &self,
        user_id: Uuid,
        run_id: Uuid,
    ) -> Result<Option<(ImportRun, Vec<ImportPageLog>)>, AppError> {
        let run = sqlx::query_as::<_, ImportRun>(
            "SELECT id, user_id, source, started_at
             FROM import_runs
             WHERE id = $1 AND user_id = $2",
        )
        .bind(run_id)
        .bind(user_id)
        .fetch_optional(self.pool()?)
        .await?;

        let Some(run) = run else {
            return Ok(None);
        };

        let pages = sqlx::query_as::<_, ImportPageLog>(
            "SELECT run_id, page_number, cursor_params, fetched, imported,
                    duplicates, updated, failed, failures, completed_at, duration_ms
             FROM import_page_logs
             WHERE run_id = $1
             ORDER BY page_number",
        )
        .bind(run_id)
        .fetch_all(self.pool()?)
        .await?;

        Ok(Some((run, pages)))
    }
}

impl ImportStore for PgStore {
    async fn get_strava_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Option<StravaCredentials>, AppError> {
        let credentials = sqlx::query_as::<_, StravaCredentials>(
            "SELECT user_id, athlete_id, access_token
             FROM strava_credentials
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(credentials)
    }

    async fn create_import_run(
        &self,
        user_id: Uuid,
        source: &str,
    ) -> Result<ImportRun, AppError> {
        let run = sqlx::query_as::<_, ImportRun>(
            "INSERT INTO import_runs (id, user_id, source, started_at)
             VALUES ($1, $2, $3, now())
             RETURNING id, user_id, source, started_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(source)
        .fetch_one(self.pool()?)
        .await?;
        Ok(run)
    }

    async fn append_page_log(&self, log: &NewPageLog<'_>) -> Result<(), AppError> {
        let failures = serde_json::to_value(&log.stats.failures)
            .map_err(|e| AppError::Database(format!("Failed to serialize failures: {}", e)))?;

        sqlx::query(
            "INSERT INTO import_page_logs
                 (run_id, page_number, cursor_params, fetched, imported,
                  duplicates, updated, failed, failures, completed_at, duration_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), $10)",
        )
        .bind(log.run_id)
        .bind(log.page_number)
        .bind(&log.cursor_params)
        .bind(log.stats.fetched as i32)
        .bind(log.stats.imported as i32)
        .bind(log.stats.duplicates as i32)
        .bind(log.stats.updated as i32)
        .bind(log.stats.failed() as i32)
        .bind(failures)
        .bind(log.duration_ms)
        .execute(self.pool()?)
        .await?;
        Ok(())
    }

    /// Deduplicating upsert.
    ///
    /// One statement per record; the conflict target depends on whether the
    /// record carries a provider id. `xmax = 0` distinguishes a fresh insert
    /// from an update, and a conflicting row whose fingerprint already
    /// matches produces no row at all:
    /// - row returned, inserted      -> Imported
    /// - row returned, not inserted  -> Updated
    /// - no row returned             -> Duplicate
    ///
    /// Safe to invoke twice with the same input: the second call classifies
    /// Duplicate and leaves the row untouched.
    async fn upsert_activity(
        &self,
        activity: &NewActivity,
    ) -> Result<UpsertOutcome, AppError> {
        let payload = serde_json::to_value(&activity.payload)
            .map_err(|e| AppError::Database(format!("Failed to serialize payload: {}", e)))?;

        let query = if activity.external_id.is_some() {
            "INSERT INTO activities
                 (id, user_id, source, external_id, activity_type, name,
                  started_at, started_at_local, ended_at, duration_min,
                  fingerprint, payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (user_id, source, external_id) WHERE external_id IS NOT NULL
             DO UPDATE SET
                 activity_type = excluded.activity_type,
                 name = excluded.name,
                 started_at = excluded.started_at,
                 started_at_local = excluded.started_at_local,
                 ended_at = excluded.ended_at,
                 duration_min = excluded.duration_min,
                 fingerprint = excluded.fingerprint,
                 payload = excluded.payload,
                 updated_at = now()
             WHERE activities.fingerprint IS DISTINCT FROM excluded.fingerprint
             RETURNING (xmax = 0)"
        } else {
            // Manual entries have no provider id; the fingerprint is the
            // identity, so a conflicting row is by definition a duplicate.
            "INSERT INTO activities
                 (id, user_id, source, external_id, activity_type, name,
                  started_at, started_at_local, ended_at, duration_min,
                  fingerprint, payload)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             ON CONFLICT (user_id, fingerprint) WHERE external_id IS NULL
             DO NOTHING
             RETURNING (xmax = 0)"
        };

        let inserted: Option<bool> = sqlx::query_scalar(query)
            .bind(Uuid::new_v4())
            .bind(activity.user_id)
            .bind(&activity.source)
            .bind(activity.external_id)
            .bind(activity.activity_type.as_str())
            .bind(&activity.name)
            .bind(activity.started_at)
            .bind(&activity.started_at_local)
            .bind(activity.ended_at)
            .bind(activity.duration_min)
            .bind(&activity.fingerprint)
            .bind(payload)
            .fetch_optional(self.pool()?)
            .await?;

        Ok(match inserted {
            None => UpsertOutcome::Duplicate,
            Some(true) => UpsertOutcome::Imported,
            Some(false) => UpsertOutcome::Updated,
        })
    }
}
