// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Job status and history reads

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{AppState, CallerIdentity};
use crate::error::{Error, Result};
use crate::store::models::JobRecord;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Clamp a client-supplied page size
pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT)
}

/// `GET /jobs/:id`; another user's job reads as missing
pub async fn get_job(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<JobRecord>> {
    match state.store.get_job(&id).await? {
        Some(job) if job.user_id == user_id => Ok(Json(job)),
        _ => Err(Error::JobNotFound(id)),
    }
}

/// `GET /jobs?limit=N`, newest first
pub async fn list_jobs(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<JobRecord>>> {
    let jobs = state
        .store
        .list_jobs_for_user(&user_id, clamp_limit(query.limit))
        .await?;
    Ok(Json(jobs))
}
