// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Import run and audit ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strava credentials for a connected user.
///
/// Token acquisition and refresh live in the connect service; this crate only
/// reads the current access token.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StravaCredentials {
    pub user_id: Uuid,
    pub athlete_id: i64,
    pub access_token: String,
}

/// One import invocation. Immutable once created; every page log row
/// references the run that produced it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ImportRun {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
}

/// Append-only audit entry for one processed page.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ImportPageLog {
    pub run_id: Uuid,
    /// 1-based page index within the run
    pub page_number: i32,
    /// The cursor this page was requested with
    pub cursor_params: serde_json::Value,
    pub fetched: i32,
    pub imported: i32,
    pub duplicates: i32,
    pub updated: i32,
    pub failed: i32,
    pub failures: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

/// Page log row about to be appended to the ledger.
#[derive(Debug)]
pub struct NewPageLog<'a> {
    pub run_id: Uuid,
    pub page_number: i32,
    pub cursor_params: serde_json::Value,
    pub stats: &'a PageStats,
    pub duration_ms: i64,
}

/// Outcome of upserting one normalized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No row existed for this record
    Imported,
    /// A row existed with an identical fingerprint
    Duplicate,
    /// A row existed and its content changed
    Updated,
}

/// A single record that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Provider-side id when one could be extracted from the raw record
    pub external_id: Option<i64>,
    pub reason: String,
}

/// Counters accumulated while processing one page.
#[derive(Debug, Clone, Default)]
pub struct PageStats {
    pub fetched: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub updated: usize,
    pub failures: Vec<RecordFailure>,
}

impl PageStats {
    pub fn new(fetched: usize) -> Self {
        Self {
            fetched,
            ..Self::default()
        }
    }

    /// Count a successful upsert.
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Imported => self.imported += 1,
            UpsertOutcome::Duplicate => self.duplicates += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }

    /// Count a per-record failure.
    pub fn fail(&mut self, external_id: Option<i64>, reason: String) {
        self.failures.push(RecordFailure {
            external_id,
            reason,
        });
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Final result of one import invocation, returned to the caller.
///
/// `continuation_token` is present exactly when `paused` is true; resubmitting
/// it resumes the run where it stopped.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub imported: usize,
    pub duplicates: usize,
    pub updated: usize,
    pub failed: Vec<RecordFailure>,
    pub continuation_token: Option<String>,
    pub paused: bool,
}

impl ImportReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            imported: 0,
            duplicates: 0,
            updated: 0,
            failed: Vec::new(),
            continuation_token: None,
            paused: false,
        }
    }

    /// Fold one page's statistics into the run totals.
    pub fn absorb(&mut self, stats: &PageStats) {
        self.imported += stats.imported;
        self.duplicates += stats.duplicates;
        self.updated += stats.updated;
        self.failed.extend(stats.failures.iter().cloned());
    }
}
