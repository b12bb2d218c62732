// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Community posts and likes

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::jobs::{clamp_limit, HistoryQuery};
use super::{parse_body, AppState, CallerIdentity};
use crate::error::{Error, Result};
use crate::store::models::{CommunityPost, LikeOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostRequest {
    #[serde(default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LikeRequest {
    #[serde(default)]
    post_id: Option<String>,
}

/// `POST /community/post`: share one of the caller's jobs
pub async fn create_post(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    body: Bytes,
) -> Result<Json<CommunityPost>> {
    let request: PostRequest = parse_body(&body)?;
    let job_id = request
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Validation("Job ID is required".to_string()))?;

    let job = match state.store.get_job(&job_id).await? {
        Some(job) if job.user_id == user_id => job,
        _ => return Err(Error::JobNotFound(job_id)),
    };

    let post = CommunityPost::from_job(&job, user_id);
    state.store.create_post(&post).await?;
    tracing::info!("Job {} shared as post {}", job.id, post.id);

    Ok(Json(post))
}

/// `POST /community/like`: like, or unlike if already liked
pub async fn toggle_like(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    body: Bytes,
) -> Result<Json<LikeOutcome>> {
    let request: LikeRequest = parse_body(&body)?;
    let raw = request
        .post_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Validation("Post ID is required".to_string()))?;
    let post_id = parse_post_id(&raw)?;

    let outcome = state.store.toggle_like(&user_id, post_id).await?;
    Ok(Json(outcome))
}

/// `GET /community/posts/:id`
pub async fn get_post(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(id): Path<String>,
) -> Result<Json<CommunityPost>> {
    let post_id = parse_post_id(&id)?;
    state
        .store
        .get_post(post_id)
        .await?
        .map(Json)
        .ok_or(Error::PostNotFound(post_id))
}

fn parse_post_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::Validation("Post ID is not a valid id".to_string()))
}

/// `GET /community/posts`: most liked first
pub async fn list_posts(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<CommunityPost>>> {
    let posts = state.store.list_posts(clamp_limit(query.limit)).await?;
    Ok(Json(posts))
}
