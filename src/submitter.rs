// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Job submitter
//!
//! Validates a transformation request, hands the rendered workflow to the
//! inference provider and records the provider's job id as a PENDING job.
//! A provider failure persists nothing; a store failure after the provider
//! accepted the job leaves that job orphaned and is reported as
//! [`Error::Persistence`].

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::assets::AssetHost;
use crate::config::Config;
use crate::dispatcher::{InferenceClient, WorkflowTemplate};
use crate::encoder::{self, ImageSource};
use crate::error::{Error, Result};
use crate::store::models::{JobRecord, JobSettings};
use crate::store::Store;

/// Body of `POST /transform`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformRequest {
    /// Publicly fetchable subject image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Subject image as base64, bare or data URL
    #[serde(default, alias = "imagePath", skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    /// Hairstyle descriptor injected into the prompt node
    #[serde(default)]
    pub haircut_type: String,

    /// Client-side workflow parameters, kept in the settings snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Value>,

    /// Optional style reference, URL or base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_image: Option<String>,
}

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub job_id: String,
    pub message: String,
}

impl TransformResponse {
    pub fn created(job_id: String) -> Self {
        Self {
            job_id,
            message: "Job created successfully".to_string(),
        }
    }
}

/// Subject or style image after validation
enum ImageRef<'a> {
    Url(&'a str),
    Encoded(&'a str),
}

impl<'a> ImageRef<'a> {
    fn classify(s: &'a str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            Self::Url(s)
        } else {
            Self::Encoded(s)
        }
    }
}

/// Resolved image: bare base64 for the provider plus a URL for the record
struct ResolvedImage {
    payload: String,
    url: Option<String>,
}

pub struct JobSubmitter {
    inference: InferenceClient,
    assets: Arc<dyn AssetHost>,
    store: Arc<dyn Store>,
    http: Client,
    template: WorkflowTemplate,
    callback_url: String,
}

impl JobSubmitter {
    pub fn new(
        inference: InferenceClient,
        assets: Arc<dyn AssetHost>,
        store: Arc<dyn Store>,
        template: WorkflowTemplate,
        callback_url: String,
    ) -> Result<Self> {
        let http = Client::builder().timeout(std::time::Duration::from_secs(60)).build()?;
        Ok(Self {
            inference,
            assets,
            store,
            http,
            template,
            callback_url,
        })
    }

    /// Build a submitter from configuration
    pub async fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        assets: Arc<dyn AssetHost>,
    ) -> Result<Self> {
        let inference = InferenceClient::new(&config.inference)?;
        let template = WorkflowTemplate::load(
            config.inference.workflow_path.as_deref(),
            &config.inference.prompt_node,
        )
        .await?;
        let callback_url = callback_url(&config.server.callback_url(), config.webhook.secret.as_deref())?;

        Self::new(inference, assets, store, template, callback_url)
    }

    /// Submit a transformation for `user_id` and return the provider job id
    pub async fn submit(&self, request: &TransformRequest, user_id: &str) -> Result<String> {
        if user_id.trim().is_empty() {
            return Err(Error::Unauthorized);
        }
        let descriptor = request.haircut_type.trim();
        if descriptor.is_empty() {
            return Err(Error::Validation("haircutType is required".to_string()));
        }
        let subject = match (non_empty(&request.image_url), non_empty(&request.image_data)) {
            (Some(url), _) => ImageRef::classify(url),
            (None, Some(data)) => ImageRef::Encoded(data),
            (None, None) => {
                return Err(Error::Validation("imageUrl or imageData is required".to_string()))
            }
        };
        let style = non_empty(&request.style_image).map(ImageRef::classify);

        let subject = self.resolve(subject, true).await?;
        let style = match style {
            Some(style) => Some(self.resolve(style, false).await?),
            None => None,
        };

        let body = self.template.render(
            &subject.payload,
            style.as_ref().map(|s| s.payload.as_str()),
            descriptor,
            &self.callback_url,
        );
        let run = self.inference.run(&body).await?;
        info!("Provider accepted job {} ({:?})", run.id, run.status);

        let settings = JobSettings {
            hairstyle_type: descriptor.to_string(),
            workflow: request.workflow.clone(),
            style_image_url: style.and_then(|s| s.url),
        };
        let input_image_url = subject.url.unwrap_or_default();
        let job = JobRecord::pending(run.id.clone(), user_id.to_string(), input_image_url, settings);

        if let Err(e) = self.store.create_job(&job).await {
            error!("Job {} accepted by provider but not recorded: {}", run.id, e);
            return Err(Error::Persistence {
                job_id: run.id,
                reason: e.to_string(),
            });
        }

        Ok(run.id)
    }

    /// Turn an image reference into a provider payload.
    /// Encoded subject images are uploaded so the record holds a fetchable URL.
    async fn resolve(&self, image: ImageRef<'_>, upload: bool) -> Result<ResolvedImage> {
        match image {
            ImageRef::Url(url) => {
                let bytes = self
                    .http
                    .get(url)
                    .send()
                    .await?
                    .error_for_status()?
                    .bytes()
                    .await?;
                let payload = encoder::encode(&ImageSource::RawBytes(bytes.to_vec()))?;
                Ok(ResolvedImage {
                    payload,
                    url: Some(url.to_string()),
                })
            }
            ImageRef::Encoded(data) => {
                let payload = encoder::encode(&ImageSource::EncodedString(data.to_string()))?;
                let bytes = STANDARD
                    .decode(payload.trim())
                    .map_err(|_| Error::Validation("image data is not valid base64".to_string()))?;
                let mime = image::guess_format(&bytes)
                    .map(|f| f.to_mime_type())
                    .unwrap_or("image/png");

                let url = if upload {
                    Some(self.assets.upload(&payload, mime).await?)
                } else {
                    None
                };
                Ok(ResolvedImage { payload, url })
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Callback URL handed to the provider, carrying the webhook token if set
pub fn callback_url(base: &str, secret: Option<&str>) -> Result<String> {
    match secret {
        Some(secret) => Url::parse_with_params(base, &[("token", secret)])
            .map(String::from)
            .map_err(|e| Error::Config(format!("invalid public URL: {}", e))),
        None => Ok(base.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::InlineAssetHost;
    use crate::config::InferenceConfig;
    use crate::store::models::JobStatus;
    use crate::store::SqliteStore;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn submitter(endpoint: &str) -> (JobSubmitter, Arc<dyn Store>) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new("sqlite::memory:", 1).await.unwrap());
        let inference = InferenceClient::new(&InferenceConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("rp-key".to_string()),
            ..InferenceConfig::default()
        })
        .unwrap();
        let template = WorkflowTemplate::load(None, "12").await.unwrap();
        let submitter = JobSubmitter::new(
            inference,
            Arc::new(InlineAssetHost),
            store.clone(),
            template,
            "https://app.example/webhook".to_string(),
        )
        .unwrap();
        (submitter, store)
    }

    fn request(image_url: &str, haircut: &str) -> TransformRequest {
        TransformRequest {
            image_url: Some(image_url.to_string()),
            haircut_type: haircut.to_string(),
            ..TransformRequest::default()
        }
    }

    #[tokio::test]
    async fn test_empty_descriptor_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (submitter, _) = submitter(&server.uri()).await;
        let err = submitter
            .submit(&request(&format!("{}/img.png", server.uri()), "   "), "user_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = submitter
            .submit(&TransformRequest { haircut_type: "Afro".to_string(), ..Default::default() }, "user_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_user_is_unauthorized() {
        let (submitter, _) = submitter("http://127.0.0.1:9").await;
        let err = submitter
            .submit(&request("https://x/img.png", "Afro"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn test_successful_submission_records_pending_job() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .and(header("Authorization", "rp-key"))
            .and(body_partial_json(json!({
                "webhook": "https://app.example/webhook",
                "input": { "workflow": { "12": { "inputs": { "text": "Afro, short" } } } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "abc123",
                "status": "IN_QUEUE"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (submitter, store) = submitter(&server.uri()).await;
        let image_url = format!("{}/img.png", server.uri());
        let job_id = submitter
            .submit(&request(&image_url, "Afro, short"), "user_1")
            .await
            .unwrap();
        assert_eq!(job_id, "abc123");

        let job = store.get_job("abc123").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.input_image_url, image_url);
        assert_eq!(job.user_id, "user_1");
        assert_eq!(job.settings.hairstyle_type, "Afro, short");
        assert!(job.output_url.is_none());
    }

    #[tokio::test]
    async fn test_provider_rejection_persists_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (submitter, store) = submitter(&server.uri()).await;
        let err = submitter
            .submit(&request(&format!("{}/img.png", server.uri()), "Afro"), "user_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(store.list_jobs_for_user("user_1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_after_acceptance_is_persistence_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-png".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "abc123" })))
            .expect(1)
            .mount(&server)
            .await;

        let (submitter, store) = submitter(&server.uri()).await;
        // Occupy the provider's id so the insert violates the primary key
        let existing = JobRecord::pending(
            "abc123".to_string(),
            "someone_else".to_string(),
            "https://x/other.png".to_string(),
            JobSettings {
                hairstyle_type: "bob".to_string(),
                workflow: None,
                style_image_url: None,
            },
        );
        store.create_job(&existing).await.unwrap();

        let err = submitter
            .submit(&request(&format!("{}/img.png", server.uri()), "Afro"), "user_1")
            .await
            .unwrap_err();
        match err {
            Error::Persistence { job_id, .. } => assert_eq!(job_id, "abc123"),
            other => panic!("unexpected error: {:?}", other),
        }

        let job = store.get_job("abc123").await.unwrap().unwrap();
        assert_eq!(job.user_id, "someone_else");
    }

    #[tokio::test]
    async fn test_encoded_subject_is_hosted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run"))
            .and(body_partial_json(json!({
                "input": { "images": [ { "image": "aGVsbG8=" } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "job-9" })))
            .mount(&server)
            .await;

        let (submitter, store) = submitter(&server.uri()).await;
        let request = TransformRequest {
            image_data: Some("data:image/png;base64,aGVsbG8=".to_string()),
            haircut_type: "bob".to_string(),
            ..TransformRequest::default()
        };
        submitter.submit(&request, "user_2").await.unwrap();

        let job = store.get_job("job-9").await.unwrap().unwrap();
        assert_eq!(job.input_image_url, "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn test_callback_url_carries_token() {
        let url = callback_url("https://app.example/webhook", Some("s3cret")).unwrap();
        assert_eq!(url, "https://app.example/webhook?token=s3cret");
        assert_eq!(
            callback_url("https://app.example/webhook", None).unwrap(),
            "https://app.example/webhook"
        );
    }

    #[test]
    fn test_request_accepts_image_path_alias() {
        let request: TransformRequest =
            serde_json::from_str(r#"{"imagePath":"AAAA","haircutType":"Afro"}"#).unwrap();
        assert_eq!(request.image_data.as_deref(), Some("AAAA"));
    }
}
