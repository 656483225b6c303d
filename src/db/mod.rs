// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer (Postgres).

pub mod postgres;

pub use postgres::PgStore;

use crate::error::AppError;
use crate::models::activity::NewActivity;
use crate::models::import::{ImportRun, NewPageLog, StravaCredentials, UpsertOutcome};
use uuid::Uuid;

/// Storage operations the import pipeline depends on.
///
/// The pipeline takes this as an explicit handle at construction so tests can
/// inject an in-memory store; production uses [`PgStore`].
#[allow(async_fn_in_trait)]
pub trait ImportStore: Send + Sync {
    /// Read the access token for a connected user. `None` when the user has
    /// never connected the provider.
    async fn get_strava_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Option<StravaCredentials>, AppError>;

    /// Record the start of an import invocation.
    async fn create_import_run(&self, user_id: Uuid, source: &str)
        -> Result<ImportRun, AppError>;

    /// Append one page's statistics to the run ledger.
    async fn append_page_log(&self, log: &NewPageLog<'_>) -> Result<(), AppError>;

    /// Insert or update one normalized activity, classifying the outcome.
    async fn upsert_activity(&self, activity: &NewActivity)
        -> Result<UpsertOutcome, AppError>;
}
