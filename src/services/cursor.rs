// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Continuation cursor for resumable imports.
//!
//! A paused import run hands the caller an opaque token; resubmitting it
//! resumes the run at the same position, even from a different process after
//! a cold start. The external form is base64 over a versioned JSON document.
//! Decoding fails closed: malformed or tampered tokens are rejected rather
//! than resuming from a default position, which could silently skip or
//! re-import records.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

/// Current cursor schema version. Bump when the shape changes so stale
/// tokens are rejected instead of misparsed.
pub const CURSOR_VERSION: u8 = 1;

/// Position within the provider's paginated feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CursorPosition {
    /// Offset pagination: next page index to request.
    Page { page: u32 },
    /// Cursor pagination: lower bound derived from the last record seen.
    /// Resilient to records appearing or disappearing between calls.
    After { epoch: i64, last_id: i64 },
}

/// Decoded resumption state for an import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorState {
    pub version: u8,
    /// The original time-lower-bound filter, carried so a resumed run
    /// requests the same window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
    pub position: CursorPosition,
}

impl CursorState {
    /// Starting cursor for a fresh run, in cursor-pagination mode.
    pub fn initial(after: Option<i64>) -> Self {
        Self {
            version: CURSOR_VERSION,
            after,
            position: CursorPosition::After {
                epoch: after.unwrap_or(0),
                last_id: 0,
            },
        }
    }

    /// Encode into the opaque token handed to the caller.
    pub fn encode(&self) -> String {
        // Serialization of a plain struct cannot fail.
        let json = serde_json::to_vec(self).expect("cursor serialization");
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a token. Fails closed on anything that does not round-trip.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CursorError::Malformed)?;
        let state: CursorState =
            serde_json::from_slice(&bytes).map_err(|_| CursorError::Malformed)?;
        if state.version != CURSOR_VERSION {
            return Err(CursorError::UnsupportedVersion(state.version));
        }
        Ok(state)
    }
}

/// Cursor decode failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("malformed continuation token")]
    Malformed,

    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_after_mode() {
        let state = CursorState {
            version: CURSOR_VERSION,
            after: Some(1_706_000_000),
            position: CursorPosition::After {
                epoch: 1_706_100_000,
                last_id: 987_654_321,
            },
        };
        let decoded = CursorState::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_round_trip_page_mode() {
        let state = CursorState {
            version: CURSOR_VERSION,
            after: None,
            position: CursorPosition::Page { page: 7 },
        };
        let decoded = CursorState::decode(&state.encode()).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(
            CursorState::decode("not base64!!!"),
            Err(CursorError::Malformed)
        );
        assert_eq!(CursorState::decode(""), Err(CursorError::Malformed));
    }

    #[test]
    fn test_decode_rejects_tampered_token() {
        let mut token = CursorState::initial(Some(100)).encode();
        // Flip a character in the middle of the token
        let mid = token.len() / 2;
        let replacement = if token.as_bytes()[mid] == b'A' { 'B' } else { 'A' };
        token.replace_range(mid..mid + 1, &replacement.to_string());

        assert!(CursorState::decode(&token).is_err());
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let json = r#"{"version":1,"position":{"mode":"page","page":2},"extra":true}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert_eq!(CursorState::decode(&token), Err(CursorError::Malformed));
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let json = r#"{"version":9,"position":{"mode":"page","page":2}}"#;
        let token = URL_SAFE_NO_PAD.encode(json);
        assert_eq!(
            CursorState::decode(&token),
            Err(CursorError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn test_initial_carries_filter_into_position() {
        let state = CursorState::initial(Some(1_700_000_000));
        assert_eq!(state.after, Some(1_700_000_000));
        assert_eq!(
            state.position,
            CursorPosition::After {
                epoch: 1_700_000_000,
                last_id: 0
            }
        );
    }
}
