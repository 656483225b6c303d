// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod activity;
pub mod import;

pub use activity::{ActivityPayload, ActivityType, NewActivity, SummaryMetrics};
pub use import::{
    ImportPageLog, ImportReport, ImportRun, PageStats, RecordFailure, StravaCredentials,
    UpsertOutcome,
};
