// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Error types for restyle

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for restyle
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Image encoding error: {0}")]
    Encoding(String),

    /// The inference provider rejected or never received the job
    #[error("Inference submission failed: {0}")]
    Upstream(String),

    /// The provider accepted the job but the local record could not be written
    #[error("Job persistence failed for {job_id}: {reason}")]
    Persistence { job_id: String, reason: String },

    #[error("Asset host error: {0}")]
    AssetHost(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Post not found: {0}")]
    PostNotFound(uuid::Uuid),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
