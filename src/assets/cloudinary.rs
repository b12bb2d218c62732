// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Cloudinary upload client
//!
//! # Security considerations
//!
//! - The API secret only feeds the request signature; it is never sent,
//!   logged or included in error messages.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::AssetHost;
use crate::config::AssetsConfig;
use crate::encoder;
use crate::error::{Error, Result};

/// Signed-upload client for a Cloudinary cloud
pub struct CloudinaryHost {
    client: Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
    folder: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl CloudinaryHost {
    pub fn new(config: &AssetsConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            upload_url: format!(
                "{}/{}/image/upload",
                config.api_base.trim_end_matches('/'),
                config.cloud_name
            ),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            folder: config.folder.clone(),
        })
    }

    /// Parameters covered by the signature, sorted by name
    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(ref folder) = self.folder {
            params.push(("folder", folder.clone()));
        }
        params.push(("timestamp", timestamp.to_string()));
        params
    }

    fn sign(&self, params: &[(&'static str, String)]) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl AssetHost for CloudinaryHost {
    async fn upload(&self, payload_b64: &str, mime: &str) -> Result<String> {
        let timestamp = chrono::Utc::now().timestamp();
        let params = self.signed_params(timestamp);
        let signature = self.sign(&params);

        let mut form: Vec<(&str, String)> = params;
        form.push(("file", encoder::to_data_url(payload_b64, mime)));
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature_algorithm", "sha256".to_string()));
        form.push(("signature", signature));

        let response = self
            .client
            .post(&self.upload_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::AssetHost(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::AssetHost(format!(
                "upload returned status {}",
                response.status()
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::AssetHost(format!("malformed upload response: {}", e)))?;

        body.secure_url
            .or(body.url)
            .ok_or_else(|| Error::AssetHost("upload response carried no URL".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn host_at(api_base: &str, folder: Option<&str>) -> CloudinaryHost {
        CloudinaryHost::new(&AssetsConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base: api_base.to_string(),
            folder: folder.map(str::to_string),
        })
        .unwrap()
    }

    fn host(folder: Option<&str>) -> CloudinaryHost {
        host_at("https://api.cloudinary.com/v1_1/", folder)
    }

    /// Value of a form field whose value needs no percent-decoding
    fn form_field<'a>(body: &'a str, name: &str) -> Option<&'a str> {
        body.split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    }

    #[tokio::test]
    async fn test_upload_sends_signed_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .and(body_string_contains("api_key=key"))
            .and(body_string_contains("folder=hairstyles"))
            .and(body_string_contains("signature_algorithm=sha256"))
            .and(body_string_contains("file=data%3Aimage%2Fpng%3Bbase64%2CAAAA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/out.png",
                "url": "http://res.cloudinary.com/demo/image/upload/v1/out.png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let host = host_at(&server.uri(), Some("hairstyles"));
        let url = host.upload("AAAA", "image/png").await.unwrap();
        assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/v1/out.png");

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8(requests[0].body.clone()).unwrap();
        assert!(!body.contains("secret"));

        let timestamp: i64 = form_field(&body, "timestamp").unwrap().parse().unwrap();
        let expected = host.sign(&host.signed_params(timestamp));
        assert_eq!(form_field(&body, "signature"), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_upload_falls_back_to_plain_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "http://res.cloudinary.com/demo/out.png"
            })))
            .mount(&server)
            .await;

        let url = host_at(&server.uri(), None).upload("AAAA", "image/png").await.unwrap();
        assert_eq!(url, "http://res.cloudinary.com/demo/out.png");
    }

    #[tokio::test]
    async fn test_upload_without_url_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "public_id": "out" })))
            .mount(&server)
            .await;

        let err = host_at(&server.uri(), None).upload("AAAA", "image/png").await.unwrap_err();
        assert!(matches!(err, Error::AssetHost(_)));
    }

    #[tokio::test]
    async fn test_upload_rejection_is_asset_host_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Invalid Signature" }
            })))
            .mount(&server)
            .await;

        let err = host_at(&server.uri(), None).upload("AAAA", "image/png").await.unwrap_err();
        match err {
            Error::AssetHost(reason) => {
                assert!(reason.contains("401"));
                assert!(!reason.contains("secret"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_upload_url() {
        assert_eq!(
            host(None).upload_url,
            "https://api.cloudinary.com/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn test_signature_matches_manual_digest() {
        let host = host(Some("hairstyles"));
        let params = host.signed_params(1_700_000_000);
        let expected = hex::encode(Sha256::digest(
            b"folder=hairstyles&timestamp=1700000000secret",
        ));
        assert_eq!(host.sign(&params), expected);
    }

    #[test]
    fn test_params_sorted_without_folder() {
        let params = host(None).signed_params(42);
        assert_eq!(params, vec![("timestamp", "42".to_string())]);
    }
}
