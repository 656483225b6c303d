// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stride-Import: external activity ingestion for the Stride fitness platform
//!
//! This crate provides the backend API that pulls activities from connected
//! providers (currently Strava), normalizes them into Stride's canonical
//! activity schema, and persists them with a per-page audit trail.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::PgStore;
use services::StravaClient;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: PgStore,
    pub strava: StravaClient,
}
