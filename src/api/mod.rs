// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! API layer - HTTP handlers for clients and the inference provider

pub mod auth;
pub mod community;
pub mod download;
pub mod jobs;
pub mod transform;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::config::Config;
use crate::error::Error;
use crate::reconciler::Reconciler;
use crate::store::Store;
use crate::submitter::JobSubmitter;

pub use auth::CallerIdentity;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub submitter: Arc<JobSubmitter>,
    pub reconciler: Arc<Reconciler>,
    /// Client for the download proxy
    pub http: reqwest::Client,
}

/// Create the application router
///
/// `/transform` and `/webhook` carry inline base64 images, so they get their
/// own body limits instead of axum's 2 MB default.
pub fn router(state: AppState) -> Router {
    let upload_limit = state.config.server.upload_body_limit;
    let webhook_limit = state.config.server.webhook_body_limit;

    Router::new()
        .route("/health", get(health))
        .route(
            "/transform",
            post(transform::handle_transform)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/webhook",
            post(webhooks::handle_webhook)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(webhook_limit)),
        )
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route(
            "/download",
            get(download::handle_download).fallback(method_not_allowed),
        )
        .route(
            "/community/post",
            post(community::create_post).fallback(method_not_allowed),
        )
        .route(
            "/community/like",
            post(community::toggle_like).fallback(method_not_allowed),
        )
        .route("/community/posts", get(community::list_posts))
        .route("/community/posts/:id", get(community::get_post))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(true) => (StatusCode::OK, "OK"),
        Ok(false) => (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable"),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable")
        }
    }
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Error::WebhookVerification(reason) => {
                tracing::warn!("Rejected webhook: {}", reason);
                (StatusCode::UNAUTHORIZED, "Invalid webhook signature".to_string())
            }
            Error::JobNotFound(_) => (StatusCode::NOT_FOUND, "Job not found".to_string()),
            Error::PostNotFound(_) => (StatusCode::NOT_FOUND, "Post not found".to_string()),
            Error::Upstream(cause) => {
                tracing::error!("Inference submission failed: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server is busy or starting up, please wait".to_string(),
                )
            }
            Error::Download(cause) => {
                tracing::error!("Download error: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to download image".to_string(),
                )
            }
            other => {
                tracing::error!("Request failed: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Parse a JSON body, reporting malformed input as a validation error
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> crate::error::Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::Validation(format!("malformed request body: {}", e)))
}
