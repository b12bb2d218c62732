// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Client session cache
//!
//! Remembers the last uploaded subject image between CLI invocations so a
//! user can try several hairstyles on the same photo. Loaded once when a
//! command starts and saved explicitly after it succeeds.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCache {
    #[serde(skip)]
    path: PathBuf,

    /// Base64 payload or URL of the last subject image
    #[serde(default)]
    pub uploaded_image: Option<String>,

    #[serde(default)]
    pub last_job_id: Option<String>,
}

impl SessionCache {
    /// Load the cache at `path`; a missing or unreadable file yields an empty cache
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut cache = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<SessionCache>(&raw).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt session cache {}: {}", path.display(), e);
                SessionCache::default()
            }),
            Err(_) => SessionCache::default(),
        };
        cache.path = path;
        cache
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let raw = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remember_image(&mut self, image: impl Into<String>) {
        self.uploaded_image = Some(image.into());
    }

    pub fn remember_job(&mut self, job_id: impl Into<String>) {
        self.last_job_id = Some(job_id.into());
    }

    /// The given job id, or the last one submitted from this session
    pub fn job_or_last(&self, job_id: Option<&str>) -> Result<String> {
        job_id
            .map(str::to_string)
            .or_else(|| self.last_job_id.clone())
            .ok_or_else(|| {
                Error::Validation("no --job given and no job recorded in the session".to_string())
            })
    }
}
