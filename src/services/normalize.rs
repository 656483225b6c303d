// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Record normalizer: provider-shaped records into canonical activities.
//!
//! Pure functions, no I/O. Failures here are per-record: the orchestrator
//! records them in the page ledger and keeps going.

use crate::models::activity::{
    fingerprint, ActivityPayload, ActivityType, DeviceMeta, NewActivity, SummaryMetrics,
};
use crate::services::strava::{StravaActivity, SOURCE_STRAVA};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Names longer than this are truncated to protect storage constraints.
pub const MAX_NAME_LEN: usize = 255;

/// Upper bound on believable activity distance (2,000 km).
const MAX_DISTANCE_METERS: f64 = 2_000_000.0;

const METERS_PER_MILE: f64 = 1_609.344;
const FEET_PER_METER: f64 = 3.280_84;

/// Per-record normalization failures.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unparseable record: {0}")]
    Malformed(String),

    #[error("invalid external id {0}")]
    InvalidExternalId(i64),

    #[error("distance {0} outside valid range")]
    InvalidDistance(f64),

    #[error("invalid start date {0:?}")]
    InvalidStartDate(String),
}

/// Map one raw provider record into a canonical activity for `user_id`.
pub fn normalize(raw: &Value, user_id: Uuid) -> Result<NewActivity, NormalizeError> {
    let ext: StravaActivity =
        serde_json::from_value(raw.clone()).map_err(|e| NormalizeError::Malformed(e.to_string()))?;

    if ext.id <= 0 {
        return Err(NormalizeError::InvalidExternalId(ext.id));
    }
    if let Some(distance) = ext.distance {
        if !(0.0..=MAX_DISTANCE_METERS).contains(&distance) {
            return Err(NormalizeError::InvalidDistance(distance));
        }
    }

    let started_at = DateTime::parse_from_rfc3339(&ext.start_date)
        .map_err(|_| NormalizeError::InvalidStartDate(ext.start_date.clone()))?
        .with_timezone(&Utc);
    let started_at_local = local_wall_time(&ext, started_at);

    // Whole-minute duration from moving time, falling back to elapsed.
    let moving = ext.moving_time.filter(|s| *s > 0);
    let elapsed = ext.elapsed_time.filter(|s| *s > 0);
    let duration_secs = moving.or(elapsed).unwrap_or(0);
    let duration_min = (duration_secs as f64 / 60.0).round() as i32;
    let ended_at = started_at + chrono::Duration::seconds(elapsed.or(moving).unwrap_or(0));

    let activity_type = ActivityType::from_sport_label(
        ext.sport_type
            .as_deref()
            .or(ext.legacy_type.as_deref())
            .unwrap_or(""),
    );

    let name = truncate_name(
        ext.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(activity_type.as_str()),
    );

    let summary = derive_summary(&ext, duration_secs);
    let device = DeviceMeta {
        device_name: ext.device_name.clone(),
        trainer: ext.trainer.unwrap_or(false),
        manual: ext.manual.unwrap_or(false),
        private: ext.private.unwrap_or(false),
        visibility: ext.visibility.clone(),
    };

    Ok(NewActivity {
        user_id,
        source: SOURCE_STRAVA.to_string(),
        external_id: Some(ext.id),
        activity_type,
        name,
        started_at,
        started_at_local,
        ended_at,
        duration_min,
        fingerprint: fingerprint(user_id, activity_type, started_at),
        payload: ActivityPayload {
            summary,
            device,
            raw: raw.clone(),
        },
    })
}

/// The wall-clock time at the activity's location, without offset, for
/// display. Strava sends `start_date_local` with a spurious `Z` suffix; when
/// it is absent the UTC start is shifted by the reported offset.
fn local_wall_time(ext: &StravaActivity, started_at: DateTime<Utc>) -> String {
    let naive = ext
        .start_date_local
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| {
            let offset = ext.utc_offset.unwrap_or(0.0) as i64;
            (started_at + chrono::Duration::seconds(offset)).naive_utc()
        });
    naive.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Derive summary metrics. Pace and speed require positive duration and
/// distance; everything else is copied through with presence intact.
fn derive_summary(ext: &StravaActivity, duration_secs: i64) -> SummaryMetrics {
    let mut summary = SummaryMetrics {
        distance_m: ext.distance,
        elevation_gain_m: ext.total_elevation_gain,
        average_heartrate: ext.average_heartrate,
        max_heartrate: ext.max_heartrate,
        has_heartrate: ext
            .has_heartrate
            .unwrap_or(ext.average_heartrate.is_some()),
        average_watts: ext.average_watts,
        max_watts: ext.max_watts,
        device_watts: ext.device_watts.unwrap_or(false),
        // Kilojoules of mechanical work approximate kcal burned 1:1 once
        // metabolic efficiency is factored in.
        calories: ext
            .calories
            .or(ext.kilojoules)
            .map(|c| c.round() as u32),
        ..SummaryMetrics::default()
    };

    if let Some(distance) = ext.distance {
        summary.distance_km = Some(round2(distance / 1000.0));
        summary.distance_mi = Some(round2(distance / METERS_PER_MILE));

        if distance > 0.0 && duration_secs > 0 {
            let secs = duration_secs as f64;
            summary.pace_per_km = Some(format_pace(secs / (distance / 1000.0)));
            summary.pace_per_mi = Some(format_pace(secs / (distance / METERS_PER_MILE)));
            summary.speed_kmh = Some(round2(distance / 1000.0 / (secs / 3600.0)));
            summary.speed_mph = Some(round2(distance / METERS_PER_MILE / (secs / 3600.0)));
        }
    }

    if let Some(gain) = ext.total_elevation_gain {
        summary.elevation_gain_ft = Some(round2(gain * FEET_PER_METER));
    }

    summary
}

/// Format seconds-per-unit as "M:SS".
fn format_pace(secs_per_unit: f64) -> String {
    let total = secs_per_unit.round() as i64;
    format!("{}:{:02}", total / 60, total % 60)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() <= MAX_NAME_LEN {
        name.to_string()
    } else {
        name.chars().take(MAX_NAME_LEN).collect()
    }
}
