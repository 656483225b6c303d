// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod cursor;
pub mod governor;
pub mod import;
pub mod normalize;
pub mod strava;

pub use cursor::{CursorError, CursorPosition, CursorState};
pub use governor::{RateLimitDecision, RateLimitGovernor, RateLimitUsage};
pub use import::{ImportRequest, ImportRunner};
pub use strava::{ActivitySource, FetchError, FetchedPage, StravaClient};
