// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Client for the serverless inference provider
//!
//! Only the asynchronous `run` endpoint is used: the provider answers with a
//! job id at once and reports the outcome to our webhook later.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::RunResponse;
use crate::config::InferenceConfig;
use crate::error::{Error, Result};

/// Client for the inference provider REST API
pub struct InferenceClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl InferenceClient {
    /// Create a new inference client
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        if config.api_key.is_none() {
            warn!("No inference API key configured; provider calls will be unauthenticated");
        }

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.endpoint.trim_end_matches('/');
        format!("{}{}", base, path)
    }

    /// Submit a rendered workflow; returns the provider-assigned job id
    pub async fn run(&self, body: &Value) -> Result<RunResponse> {
        let mut request = self
            .client
            .post(self.url("/run"))
            .header("accept", "application/json")
            .json(body);

        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            debug!("Provider rejected run request: {}", detail);
            return Err(Error::Upstream(format!("provider returned status {}", status)));
        }

        let run: RunResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed run response: {}", e)))?;

        if run.id.is_empty() {
            return Err(Error::Upstream("provider returned an empty job id".to_string()));
        }

        Ok(run)
    }

    /// Check if the provider endpoint is reachable and healthy
    pub async fn health_check(&self) -> Result<bool> {
        let mut request = self
            .client
            .get(self.url("/health"))
            .timeout(Duration::from_secs(5));

        if let Some(ref key) = self.api_key {
            request = request.header("Authorization", key);
        }

        match request.send().await {
            Ok(r) => Ok(r.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
