// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Inference dispatcher - communicates with the GPU inference provider

pub mod inference_client;
pub mod workflow;

pub use inference_client::InferenceClient;
pub use workflow::WorkflowTemplate;

use serde::{Deserialize, Serialize};

use crate::store::models::JobStatus;

/// Job status as reported by the inference provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl ProviderStatus {
    /// Stored status this provider status settles the job into, if any.
    /// Queue/progress reports leave the job pending.
    pub fn settles_as(&self) -> Option<JobStatus> {
        match self {
            Self::InQueue | Self::InProgress => None,
            Self::Completed => Some(JobStatus::Completed),
            Self::Failed | Self::Cancelled | Self::TimedOut => Some(JobStatus::Failed),
        }
    }
}

/// Response to an asynchronous run request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub id: String,
    #[serde(default)]
    pub status: Option<ProviderStatus>,
}
