// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Import orchestrator tests against in-memory fakes.
//!
//! The runner takes its store and activity source as explicit handles, so
//! these tests exercise the full fetch -> normalize -> upsert -> log loop
//! without a database or network.

use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use stride_import::config::ImportConfig;
use stride_import::db::ImportStore;
use stride_import::error::AppError;
use stride_import::models::activity::NewActivity;
use stride_import::models::import::{
    ImportRun, NewPageLog, RecordFailure, StravaCredentials, UpsertOutcome,
};
use stride_import::services::cursor::CursorState;
use stride_import::services::import::{ImportRequest, ImportRunner};
use stride_import::services::strava::{ActivitySource, FetchError, FetchedPage};

// ─── Fakes ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredActivity {
    fingerprint: String,
    name: String,
    payload: Value,
}

#[derive(Debug, Clone)]
struct LoggedPage {
    page_number: i32,
    fetched: usize,
    imported: usize,
    duplicates: usize,
    updated: usize,
    failures: Vec<RecordFailure>,
}

#[derive(Default)]
struct MockStoreInner {
    credentials: Option<StravaCredentials>,
    failing_ids: HashSet<i64>,
    activities: Mutex<HashMap<(Uuid, String, i64), StoredActivity>>,
    runs: Mutex<Vec<ImportRun>>,
    logs: Mutex<Vec<LoggedPage>>,
}

#[derive(Clone, Default)]
struct MockStore(Arc<MockStoreInner>);

impl MockStore {
    fn connected(user_id: Uuid) -> Self {
        Self(Arc::new(MockStoreInner {
            credentials: Some(StravaCredentials {
                user_id,
                athlete_id: 1001,
                access_token: "test-token".to_string(),
            }),
            ..MockStoreInner::default()
        }))
    }

    fn connected_with_failing_ids(user_id: Uuid, failing_ids: &[i64]) -> Self {
        Self(Arc::new(MockStoreInner {
            credentials: Some(StravaCredentials {
                user_id,
                athlete_id: 1001,
                access_token: "test-token".to_string(),
            }),
            failing_ids: failing_ids.iter().copied().collect(),
            ..MockStoreInner::default()
        }))
    }

    fn activity_count(&self) -> usize {
        self.0.activities.lock().unwrap().len()
    }

    fn stored(&self, user_id: Uuid, external_id: i64) -> Option<StoredActivity> {
        self.0
            .activities
            .lock()
            .unwrap()
            .get(&(user_id, "strava".to_string(), external_id))
            .cloned()
    }

    fn logs(&self) -> Vec<LoggedPage> {
        self.0.logs.lock().unwrap().clone()
    }

    fn run_count(&self) -> usize {
        self.0.runs.lock().unwrap().len()
    }
}

impl ImportStore for MockStore {
    async fn get_strava_credentials(
        &self,
        user_id: Uuid,
    ) -> Result<Option<StravaCredentials>, AppError> {
        Ok(self
            .0
            .credentials
            .clone()
            .filter(|c| c.user_id == user_id))
    }

    async fn create_import_run(
        &self,
        user_id: Uuid,
        source: &str,
    ) -> Result<ImportRun, AppError> {
        let run = ImportRun {
            id: Uuid::new_v4(),
            user_id,
            source: source.to_string(),
            started_at: Utc::now(),
        };
        self.0.runs.lock().unwrap().push(run.clone());
        Ok(run)
    }

    async fn append_page_log(&self, log: &NewPageLog<'_>) -> Result<(), AppError> {
        self.0.logs.lock().unwrap().push(LoggedPage {
            page_number: log.page_number,
            fetched: log.stats.fetched,
            imported: log.stats.imported,
            duplicates: log.stats.duplicates,
            updated: log.stats.updated,
            failures: log.stats.failures.clone(),
        });
        Ok(())
    }

    async fn upsert_activity(
        &self,
        activity: &NewActivity,
    ) -> Result<UpsertOutcome, AppError> {
        let external_id = activity.external_id.expect("imports carry an external id");
        if self.0.failing_ids.contains(&external_id) {
            return Err(AppError::Database("simulated write clash".to_string()));
        }

        let mut activities = self.0.activities.lock().unwrap();
        let key = (activity.user_id, activity.source.clone(), external_id);
        let row = StoredActivity {
            fingerprint: activity.fingerprint.clone(),
            name: activity.name.clone(),
            payload: serde_json::to_value(&activity.payload).unwrap(),
        };

        match activities.get_mut(&key) {
            None => {
                activities.insert(key, row);
                Ok(UpsertOutcome::Imported)
            }
            Some(existing) if existing.fingerprint != activity.fingerprint => {
                *existing = row;
                Ok(UpsertOutcome::Updated)
            }
            Some(_) => Ok(UpsertOutcome::Duplicate),
        }
    }
}

/// Scripted page source; hands out its pages in order, then reports
/// exhaustion.
struct MockSource {
    pages: Mutex<VecDeque<Result<FetchedPage, FetchError>>>,
}

impl MockSource {
    fn new(pages: Vec<Result<FetchedPage, FetchError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

impl ActivitySource for MockSource {
    async fn fetch_page(
        &self,
        _access_token: &str,
        cursor: &CursorState,
        _per_page: u32,
    ) -> Result<FetchedPage, FetchError> {
        self.pages.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(FetchedPage {
                records: vec![],
                next: cursor.clone(),
                exhausted: true,
            })
        })
    }
}

/// Source that must never be consulted.
struct PanickingSource;

impl ActivitySource for PanickingSource {
    async fn fetch_page(
        &self,
        _access_token: &str,
        _cursor: &CursorState,
        _per_page: u32,
    ) -> Result<FetchedPage, FetchError> {
        panic!("fetch_page must not be called once the budget is spent");
    }
}

// ─── Helpers ─────────────────────────────────────────────────

fn run_record(id: i64, distance: f64) -> Value {
    // Distinct start times per id so fingerprints differ between records.
    json!({
        "id": id,
        "name": format!("Run {}", id),
        "sport_type": "Run",
        "start_date": format!("2026-03-01T08:{:02}:00Z", id % 60),
        "moving_time": 3000,
        "elapsed_time": 3100,
        "distance": distance
    })
}

fn page(records: Vec<Value>, exhausted: bool) -> Result<FetchedPage, FetchError> {
    Ok(FetchedPage {
        records,
        next: CursorState::initial(None),
        exhausted,
    })
}

fn request(per_page: u32) -> ImportRequest {
    ImportRequest {
        after: None,
        per_page,
        cursor: None,
    }
}

// ─── Tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_page_with_one_invalid_record_keeps_the_rest() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    let source = MockSource::new(vec![page(
        vec![
            run_record(1, 10_000.0),
            run_record(2, -5.0),
            run_record(3, 8_000.0),
        ],
        true,
    )]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    let report = runner.run(user, request(50)).await.unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].external_id, Some(2));
    assert!(report.failed[0].reason.contains("distance"));
    assert!(!report.paused);
    assert!(report.continuation_token.is_none());

    // No valid record was dropped
    assert!(store.stored(user, 1).is_some());
    assert!(store.stored(user, 3).is_some());
    assert!(store.stored(user, 2).is_none());

    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].fetched, 3);
    assert_eq!(logs[0].imported, 2);
    assert_eq!(logs[0].failures.len(), 1);
}

#[tokio::test]
async fn test_reimporting_identical_record_is_duplicate() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);

    let first = ImportRunner::new(
        store.clone(),
        MockSource::new(vec![page(vec![run_record(42, 10_000.0)], true)]),
        ImportConfig::default(),
    );
    let report = first.run(user, request(50)).await.unwrap();
    assert_eq!(report.imported, 1);

    let row = store.stored(user, 42).unwrap();
    assert_eq!(row.payload["summary"]["pace_per_km"], "5:00");

    let second = ImportRunner::new(
        store.clone(),
        MockSource::new(vec![page(vec![run_record(42, 10_000.0)], true)]),
        ImportConfig::default(),
    );
    let report = second.run(user, request(50)).await.unwrap();

    assert_eq!(report.imported, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(store.activity_count(), 1);

    // Row unchanged by the duplicate call
    let after = store.stored(user, 42).unwrap();
    assert_eq!(after.fingerprint, row.fingerprint);
    assert_eq!(after.payload, row.payload);
}

#[tokio::test]
async fn test_provider_edit_classifies_updated() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);

    let first = ImportRunner::new(
        store.clone(),
        MockSource::new(vec![page(vec![run_record(7, 10_000.0)], true)]),
        ImportConfig::default(),
    );
    first.run(user, request(50)).await.unwrap();

    // Same activity id, start time moved by the provider
    let mut edited = run_record(7, 10_000.0);
    edited
        .as_object_mut()
        .unwrap()
        .insert("start_date".to_string(), json!("2026-03-01T09:07:00Z"));

    let second = ImportRunner::new(
        store.clone(),
        MockSource::new(vec![page(vec![edited], true)]),
        ImportConfig::default(),
    );
    let report = second.run(user, request(50)).await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.imported, 0);
    assert_eq!(report.duplicates, 0);
    assert_eq!(store.activity_count(), 1);
}

#[tokio::test]
async fn test_rate_limit_pauses_with_resumable_cursor() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    let source = MockSource::new(vec![Err(FetchError::RateLimited(
        "rate limit retry budget exhausted after 3 attempts".to_string(),
    ))]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    let report = runner.run(user, request(50)).await.unwrap();

    assert!(report.paused);
    assert_eq!(report.imported, 0);

    let token = report.continuation_token.expect("paused run returns a cursor");
    let decoded = CursorState::decode(&token).unwrap();
    assert_eq!(decoded, CursorState::initial(None));

    // Nothing was fetched, so nothing was logged
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_timeout_pauses_with_resumable_cursor() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    let source = MockSource::new(vec![Err(FetchError::Timeout)]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    let report = runner.run(user, request(50)).await.unwrap();

    assert!(report.paused);
    assert!(report.continuation_token.is_some());
}

#[tokio::test]
async fn test_time_budget_pauses_before_fetching() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);

    let config = ImportConfig {
        time_budget: Duration::ZERO,
        ..ImportConfig::default()
    };

    let runner = ImportRunner::new(store.clone(), PanickingSource, config);
    let report = runner.run(user, request(50)).await.unwrap();

    assert!(report.paused);
    assert!(report.continuation_token.is_some());
    // The run itself was recorded, even though no page was fetched
    assert_eq!(store.run_count(), 1);
    assert!(store.logs().is_empty());
}

#[tokio::test]
async fn test_every_page_is_logged() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    // Page 1 carries a failing record; the run still fetches page 2.
    let source = MockSource::new(vec![
        page(
            vec![run_record(1, 5_000.0), run_record(2, -5.0)],
            false,
        ),
        page(vec![run_record(3, 7_000.0)], true),
    ]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    let report = runner.run(user, request(2)).await.unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.paused);

    let logs = store.logs();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].page_number, 1);
    assert_eq!(logs[0].fetched, 2);
    assert_eq!(logs[0].failures.len(), 1);
    assert_eq!(logs[1].page_number, 2);
    assert_eq!(logs[1].fetched, 1);
}

#[tokio::test]
async fn test_store_failure_does_not_abort_page() {
    let user = Uuid::new_v4();
    let store = MockStore::connected_with_failing_ids(user, &[2]);
    let source = MockSource::new(vec![page(
        vec![
            run_record(1, 5_000.0),
            run_record(2, 6_000.0),
            run_record(3, 7_000.0),
        ],
        true,
    )]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    let report = runner.run(user, request(50)).await.unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].external_id, Some(2));
    assert!(!report.paused);

    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].imported, 2);
    assert_eq!(logs[0].failures.len(), 1);
}

#[tokio::test]
async fn test_missing_credentials_aborts() {
    let user = Uuid::new_v4();
    let store = MockStore::default();

    let runner = ImportRunner::new(
        store,
        MockSource::new(vec![]),
        ImportConfig::default(),
    );
    match runner.run(user, request(50)).await {
        Err(AppError::NotFound(msg)) => assert!(msg.contains("Strava")),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_token_aborts() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    let source = MockSource::new(vec![Err(FetchError::Unauthorized)]);

    let runner = ImportRunner::new(store, source, ImportConfig::default());
    match runner.run(user, request(50)).await {
        Err(AppError::InvalidToken) => {}
        other => panic!("expected InvalidToken, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fully_malformed_page_aborts_after_logging() {
    let user = Uuid::new_v4();
    let store = MockStore::connected(user);
    // Neither record carries the required fields
    let source = MockSource::new(vec![page(
        vec![json!({"name": "??"}), json!({"name": "!!"})],
        false,
    )]);

    let runner = ImportRunner::new(store.clone(), source, ImportConfig::default());
    match runner.run(user, request(50)).await {
        Err(AppError::StravaApi(msg)) => assert!(msg.contains("normalization")),
        other => panic!("expected StravaApi, got {other:?}"),
    }

    // The failing page still left an audit entry
    let logs = store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].fetched, 2);
    assert_eq!(logs[0].failures.len(), 2);
}
