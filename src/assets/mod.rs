// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Asset host - durable public URLs for images

pub mod cloudinary;

pub use cloudinary::CloudinaryHost;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AssetsConfig;
use crate::encoder;
use crate::error::Result;

/// External image host
#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Upload a bare base64 image and return its public URL
    async fn upload(&self, payload_b64: &str, mime: &str) -> Result<String>;
}

/// Fallback host that hands the image back as a data URL.
/// Not durable; meant for local development without a CDN account.
pub struct InlineAssetHost;

#[async_trait]
impl AssetHost for InlineAssetHost {
    async fn upload(&self, payload_b64: &str, mime: &str) -> Result<String> {
        Ok(encoder::to_data_url(payload_b64, mime))
    }
}

/// Build the configured asset host
pub fn from_config(config: Option<&AssetsConfig>) -> Result<Arc<dyn AssetHost>> {
    match config {
        Some(config) => Ok(Arc::new(CloudinaryHost::new(config)?)),
        None => {
            tracing::warn!("No asset host configured; images will be stored as data URLs");
            Ok(Arc::new(InlineAssetHost))
        }
    }
}
