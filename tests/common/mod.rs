// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use std::sync::Arc;
use stride_import::config::Config;
use stride_import::db::PgStore;
use stride_import::routes::create_router;
use stride_import::services::StravaClient;
use stride_import::AppState;

/// Create a test app with an offline mock store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let store = PgStore::new_mock();
    let strava = StravaClient::new(&config.strava_base_url, &config.import);

    let state = Arc::new(AppState {
        config,
        store,
        strava,
    });

    (create_router(state.clone()), state)
}
