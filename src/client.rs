// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! HTTP client for a running restyle server

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::poller::JobReader;
use crate::store::models::JobRecord;
use crate::submitter::{TransformRequest, TransformResponse};

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Client acting on behalf of one user
pub struct ApiClient {
    http: Client,
    base_url: String,
    user_id: String,
    user_header: String,
}

impl ApiClient {
    pub fn new(base_url: &str, user_id: &str, user_header: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            user_header: user_header.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Submit a transformation; returns the job id
    pub async fn submit_transform(&self, request: &TransformRequest) -> Result<String> {
        let response = self
            .http
            .post(self.url("/transform"))
            .header(self.user_header.as_str(), self.user_id.as_str())
            .json(request)
            .send()
            .await?;

        let body: TransformResponse = check(response).await?.json().await?;
        Ok(body.job_id)
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<JobRecord>> {
        let response = self
            .http
            .get(self.url(&format!("/jobs/{}", id)))
            .header(self.user_header.as_str(), self.user_id.as_str())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let response = self
            .http
            .get(self.url("/jobs"))
            .query(&[("limit", limit)])
            .header(self.user_header.as_str(), self.user_id.as_str())
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }
}

/// Map an error response back onto the error taxonomy
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|b| b.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::BAD_REQUEST => Error::Validation(message),
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::NOT_FOUND => Error::JobNotFound(message),
        _ => Error::Upstream(message),
    })
}

#[async_trait]
impl JobReader for ApiClient {
    async fn read_job(&self, id: &str) -> Result<Option<JobRecord>> {
        self.get_job(id).await
    }
}
