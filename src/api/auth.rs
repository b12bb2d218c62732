// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Caller identity
//!
//! The auth provider's proxy authenticates the user and forwards the user id
//! in a trusted header (`auth.user_header`). Requests without it are rejected.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::AppState;
use crate::error::Error;

/// Authenticated user id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

#[axum::async_trait]
impl FromRequestParts<AppState> for CallerIdentity {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(state.config.auth.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| CallerIdentity(v.to_string()))
            .ok_or(Error::Unauthorized)
    }
}
