// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! `POST /transform`

use axum::{body::Bytes, extract::State, Json};

use super::{parse_body, AppState, CallerIdentity};
use crate::error::Result;
use crate::submitter::{TransformRequest, TransformResponse};

pub async fn handle_transform(
    State(state): State<AppState>,
    CallerIdentity(user_id): CallerIdentity,
    body: Bytes,
) -> Result<Json<TransformResponse>> {
    let request: TransformRequest = parse_body(&body)?;
    tracing::info!("Transform requested by {}: {}", user_id, request.haircut_type);

    let job_id = state.submitter.submit(&request, &user_id).await?;
    Ok(Json(TransformResponse::created(job_id)))
}
