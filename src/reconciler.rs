// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Webhook reconciliation
//!
//! Applies a provider callback to the job store. Updates only ever move a
//! job out of PENDING, so a replayed or duplicated callback for a settled job
//! is acknowledged without touching the row.

use std::io::Cursor;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::assets::AssetHost;
use crate::dispatcher::ProviderStatus;
use crate::encoder;
use crate::error::{Error, Result};
use crate::store::models::{JobStatus, StatusUpdate};
use crate::store::Store;

/// Provider callback body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<WebhookOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutput {
    /// Result image, URL or base64
    #[serde(default)]
    pub message: Option<String>,
}

/// What a callback did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Row moved to a terminal status
    Applied(JobStatus),
    /// Progress report; row stays PENDING
    Progress,
    /// Row was already terminal; nothing changed
    AlreadySettled(JobStatus),
}

/// Applies provider callbacks to the store
pub struct Reconciler {
    store: Arc<dyn Store>,
    assets: Arc<dyn AssetHost>,
    rehost_output: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, assets: Arc<dyn AssetHost>, rehost_output: bool) -> Self {
        Self {
            store,
            assets,
            rehost_output,
        }
    }

    pub async fn reconcile(&self, payload: &WebhookPayload) -> Result<Reconciliation> {
        let status = parse_status(&payload.status)?;

        let job = self
            .store
            .get_job(&payload.id)
            .await?
            .ok_or_else(|| Error::JobNotFound(payload.id.clone()))?;

        if job.status.is_terminal() {
            debug!("Job {} already {}, ignoring {} callback", job.id, job.status, payload.status);
            return Ok(Reconciliation::AlreadySettled(job.status));
        }

        let update = match status.settles_as() {
            None => {
                debug!("Job {} reported {}", job.id, payload.status);
                return Ok(Reconciliation::Progress);
            }
            Some(JobStatus::Completed) => {
                let message = payload.output.as_ref().and_then(|o| o.message.as_deref());
                let output_url = match message {
                    Some(message) if !message.trim().is_empty() => {
                        Some(self.resolve_output(message).await?)
                    }
                    _ => {
                        warn!("Job {} completed without an output payload", job.id);
                        None
                    }
                };
                StatusUpdate::completed(output_url)
            }
            Some(_) => StatusUpdate::failed(
                payload
                    .error
                    .clone()
                    .or_else(|| Some(format!("provider reported {}", payload.status))),
            ),
        };

        if self.store.apply_status_update(&job.id, &update).await? {
            info!("Job {} -> {}", job.id, update.status);
            Ok(Reconciliation::Applied(update.status))
        } else {
            // a concurrent delivery settled it first
            let current = self
                .store
                .get_job(&job.id)
                .await?
                .map(|j| j.status)
                .unwrap_or(update.status);
            Ok(Reconciliation::AlreadySettled(current))
        }
    }

    /// Durable URL for a provider result
    pub async fn resolve_output(&self, message: &str) -> Result<String> {
        let message = message.trim();
        if message.starts_with("http://") || message.starts_with("https://") {
            return Ok(message.to_string());
        }

        let png = reencode_png(message)?;
        if self.rehost_output {
            self.assets.upload(&png, "image/png").await
        } else {
            Ok(encoder::to_data_url(&png, "image/png"))
        }
    }
}

fn parse_status(raw: &str) -> Result<ProviderStatus> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| Error::Validation(format!("unrecognised job status {}", raw)))
}

/// Decode a base64 image and re-encode it as PNG, returning bare base64
fn reencode_png(payload: &str) -> Result<String> {
    let bytes = encoder::decode(payload)?;
    let decoded = image::load_from_memory(&bytes)?;

    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(STANDARD.encode(out.into_inner()))
}
