// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity extraction middleware.
//!
//! Session handling lives in the platform's auth gateway, which terminates
//! the user's session and forwards the resolved user id in a trusted header.
//! This middleware only lifts that header into a typed extension.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use uuid::Uuid;

/// Header carrying the resolved user id, set by the auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller extracted from the gateway header.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
}

/// Middleware that requires a gateway-resolved identity.
pub async fn require_identity(
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok());

    match user_id {
        Some(user_id) => {
            request.extensions_mut().insert(Identity { user_id });
            Ok(next.run(request).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
