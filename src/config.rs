// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Configuration management for restyle
//!
//! Values come from a TOML file layered with `RESTYLE__SECTION__KEY`
//! environment variables. Secrets (`inference.api_key`, `assets.api_secret`,
//! `webhook.secret`) are best supplied through the environment. `Config`
//! derives `Debug`, so never log it whole.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Inference provider connection
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Asset host (image CDN); inline data URLs are used when absent
    #[serde(default)]
    pub assets: Option<AssetsConfig>,

    /// Webhook receiver settings
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Caller identity settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Client-side status polling
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used to build the provider callback URL
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Largest accepted `POST /webhook` body; completed results arrive inline as base64
    #[serde(default = "default_webhook_body_limit")]
    pub webhook_body_limit: usize,

    /// Largest accepted `POST /transform` body; subject images may be sent inline
    #[serde(default = "default_upload_body_limit")]
    pub upload_body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            webhook_body_limit: default_webhook_body_limit(),
            upload_body_limit: default_upload_body_limit(),
        }
    }
}

impl ServerConfig {
    /// URL the inference provider calls on job state change
    pub fn callback_url(&self) -> String {
        format!("{}/webhook", self.public_url.trim_end_matches('/'))
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_webhook_body_limit() -> usize {
    10 * 1024 * 1024
}

fn default_upload_body_limit() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://restyle.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Serverless endpoint base, e.g. `https://api.runpod.ai/v2/<endpoint-id>`
    #[serde(default = "default_inference_endpoint")]
    pub endpoint: String,

    /// Sent verbatim in the `Authorization` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Client-side abort for submission requests (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Workflow template JSON; the built-in template is used when unset
    #[serde(default)]
    pub workflow_path: Option<String>,

    /// Workflow node whose `inputs.text` receives the hairstyle descriptor
    #[serde(default = "default_prompt_node")]
    pub prompt_node: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_inference_endpoint(),
            api_key: None,
            timeout_secs: default_timeout(),
            workflow_path: None,
            prompt_node: default_prompt_node(),
        }
    }
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_inference_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

fn default_prompt_node() -> String {
    "12".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    pub cloud_name: String,

    pub api_key: String,

    pub api_secret: String,

    #[serde(default = "default_assets_api_base")]
    pub api_base: String,

    /// Optional folder for uploaded images
    #[serde(default)]
    pub folder: Option<String>,
}

fn default_assets_api_base() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared secret; when set, callbacks must carry it (query token or HMAC)
    #[serde(default)]
    pub secret: Option<String>,

    /// Re-host base64 results on the asset host instead of storing data URLs
    #[serde(default = "default_true")]
    pub rehost_output: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            rehost_output: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Header carrying the authenticated user id, set by the auth provider's proxy
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
        }
    }
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Reads before a still-pending job is reported stale; `None` polls forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_max_attempts() -> Option<u32> {
    Some(150)
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let path = Path::new(path);

        let mut builder = config::Config::builder();
        if path.exists() {
            builder = builder.add_source(config::File::from(path));
        } else {
            tracing::warn!("Config file {} not found, using defaults", path.display());
        }

        let config = builder
            .add_source(config::Environment::with_prefix("RESTYLE").separator("__"))
            .build()?;
        let parsed: Config = config.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Reject values that would only fail later at runtime
    pub fn validate(&self) -> Result<()> {
        if self.poller.interval_ms == 0 {
            return Err(Error::Config("poller.interval_ms must be at least 1".to_string()));
        }
        if self.server.webhook_body_limit == 0 || self.server.upload_body_limit == 0 {
            return Err(Error::Config("server body limits must be non-zero".to_string()));
        }
        Ok(())
    }
}
