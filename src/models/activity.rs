// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Canonical activity model for storage and API.
//!
//! Activities arrive provider-shaped (see `services::strava`) and are mapped
//! into this schema by the normalizer. The `(user_id, source, external_id)`
//! triple identifies a provider-sourced record; manually entered activities
//! have no external id and are identified by their content fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Closed set of activity types Stride understands.
///
/// Provider sport labels are mapped through [`ActivityType::from_sport_label`];
/// anything unrecognized lands in the generic `Workout` bucket rather than
/// being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Run,
    TrailRun,
    Ride,
    VirtualRide,
    Swim,
    Walk,
    Hike,
    StrengthTraining,
    Yoga,
    Rowing,
    Elliptical,
    NordicSki,
    Workout,
}

impl ActivityType {
    /// Storage/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::TrailRun => "trail_run",
            Self::Ride => "ride",
            Self::VirtualRide => "virtual_ride",
            Self::Swim => "swim",
            Self::Walk => "walk",
            Self::Hike => "hike",
            Self::StrengthTraining => "strength_training",
            Self::Yoga => "yoga",
            Self::Rowing => "rowing",
            Self::Elliptical => "elliptical",
            Self::NordicSki => "nordic_ski",
            Self::Workout => "workout",
        }
    }

    /// Map a provider sport label onto the closed enumeration.
    ///
    /// Unrecognized labels map to `Workout`.
    pub fn from_sport_label(label: &str) -> Self {
        match label {
            "Run" | "VirtualRun" => Self::Run,
            "TrailRun" => Self::TrailRun,
            "Ride" | "GravelRide" | "MountainBikeRide" | "EBikeRide" | "EMountainBikeRide"
            | "Velomobile" => Self::Ride,
            "VirtualRide" => Self::VirtualRide,
            "Swim" => Self::Swim,
            "Walk" => Self::Walk,
            "Hike" | "Snowshoe" => Self::Hike,
            "WeightTraining" | "Crossfit" | "HighIntensityIntervalTraining" => {
                Self::StrengthTraining
            }
            "Yoga" | "Pilates" => Self::Yoga,
            "Rowing" | "VirtualRow" | "Canoeing" | "Kayaking" | "StandUpPaddling" => Self::Rowing,
            "Elliptical" | "StairStepper" => Self::Elliptical,
            "NordicSki" | "BackcountrySki" | "RollerSki" => Self::NordicSki,
            _ => Self::Workout,
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized activity ready to be upserted.
#[derive(Debug, Clone, Serialize)]
pub struct NewActivity {
    /// Owning Stride user
    pub user_id: Uuid,
    /// Source provider name ("strava")
    pub source: String,
    /// Provider-side activity id; None for manually entered activities
    pub external_id: Option<i64>,
    /// Mapped activity type
    pub activity_type: ActivityType,
    /// Activity name/title (length-capped)
    pub name: String,
    /// UTC-sortable start time
    pub started_at: DateTime<Utc>,
    /// Wall-clock start time at the activity's location, for display
    pub started_at_local: String,
    /// UTC end time (start + elapsed)
    pub ended_at: DateTime<Utc>,
    /// Duration in whole minutes
    pub duration_min: i32,
    /// Content fingerprint, see [`fingerprint`]
    pub fingerprint: String,
    /// Structured payload persisted as JSONB
    pub payload: ActivityPayload,
}

/// Structured payload stored alongside the canonical columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// Derived summary metrics
    pub summary: SummaryMetrics,
    /// Device and privacy metadata
    pub device: DeviceMeta,
    /// The original provider record, verbatim
    pub raw: serde_json::Value,
}

/// Derived summary metrics in metric and imperial units.
///
/// Pace and speed are present only when both duration and distance are
/// positive. Heart-rate and power carry presence flags so consumers can
/// distinguish "zero" from "not recorded".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub distance_m: Option<f64>,
    pub distance_km: Option<f64>,
    pub distance_mi: Option<f64>,
    /// "M:SS" per kilometer
    pub pace_per_km: Option<String>,
    /// "M:SS" per mile
    pub pace_per_mi: Option<String>,
    pub speed_kmh: Option<f64>,
    pub speed_mph: Option<f64>,
    pub elevation_gain_m: Option<f64>,
    pub elevation_gain_ft: Option<f64>,
    /// Estimated energy expenditure in kcal
    pub calories: Option<u32>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub has_heartrate: bool,
    pub average_watts: Option<f64>,
    pub max_watts: Option<f64>,
    /// True when power came from a meter rather than an estimate
    pub device_watts: bool,
}

/// Device and privacy metadata copied through from the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceMeta {
    pub device_name: Option<String>,
    pub trainer: bool,
    pub manual: bool,
    pub private: bool,
    pub visibility: Option<String>,
}

/// Compute the stable content fingerprint for an activity.
///
/// The fingerprint is derived from the owner, mapped type, and UTC start
/// second. It identifies the underlying workout: two records with the same
/// fingerprint describe the same session, and an incoming record whose
/// fingerprint differs from the stored row under the same external id is a
/// genuine provider-side edit.
pub fn fingerprint(user_id: Uuid, activity_type: ActivityType, started_at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(activity_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(started_at.timestamp().to_be_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let user = Uuid::new_v4();
        let when = ts("2026-03-01T08:30:00Z");
        let a = fingerprint(user, ActivityType::Run, when);
        let b = fingerprint(user, ActivityType::Run, when);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_by_defining_fields() {
        let user = Uuid::new_v4();
        let when = ts("2026-03-01T08:30:00Z");
        let base = fingerprint(user, ActivityType::Run, when);

        assert_ne!(base, fingerprint(Uuid::new_v4(), ActivityType::Run, when));
        assert_ne!(base, fingerprint(user, ActivityType::Ride, when));
        assert_ne!(
            base,
            fingerprint(user, ActivityType::Run, ts("2026-03-01T08:30:01Z"))
        );
    }

    #[test]
    fn test_sport_label_mapping() {
        assert_eq!(ActivityType::from_sport_label("Run"), ActivityType::Run);
        assert_eq!(
            ActivityType::from_sport_label("GravelRide"),
            ActivityType::Ride
        );
        assert_eq!(
            ActivityType::from_sport_label("WeightTraining"),
            ActivityType::StrengthTraining
        );
    }

    #[test]
    fn test_unknown_sport_label_maps_to_workout() {
        assert_eq!(
            ActivityType::from_sport_label("Skateboard"),
            ActivityType::Workout
        );
        assert_eq!(ActivityType::from_sport_label(""), ActivityType::Workout);
    }

    #[test]
    fn test_activity_type_serde_uses_snake_case() {
        let json = serde_json::to_string(&ActivityType::TrailRun).unwrap();
        assert_eq!(json, "\"trail_run\"");
    }
}
