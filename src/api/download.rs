// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Download proxy
//!
//! Browsers refuse cross-origin downloads from the CDN, so the image is
//! fetched server-side and returned as an attachment.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use reqwest::Url;
use serde::Deserialize;

use super::AppState;
use crate::error::{Error, Result};

pub const DOWNLOAD_FILENAME: &str = "hairstyle.png";

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// Parse the target, allowing only absolute http(s) URLs
pub fn parse_target(raw: Option<&str>) -> Result<Url> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation("URL is required".to_string()))?;

    let url = Url::parse(raw).map_err(|_| Error::Validation("URL is invalid".to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(Error::Validation("Only http(s) URLs can be downloaded".to_string())),
    }
}

pub async fn handle_download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse> {
    let url = parse_target(query.url.as_deref())?;
    tracing::debug!("Proxying download of {}", url);

    let response = state
        .http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Download(e.to_string()))?;
    if !response.status().is_success() {
        return Err(Error::Download(format!(
            "origin returned status {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Download(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", DOWNLOAD_FILENAME),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target() {
        assert!(parse_target(Some("https://res.cloudinary.com/demo/out.png")).is_ok());
        assert!(parse_target(Some("http://localhost:9000/out.png")).is_ok());
        assert!(matches!(parse_target(None), Err(Error::Validation(_))));
        assert!(matches!(parse_target(Some("  ")), Err(Error::Validation(_))));
        assert!(matches!(
            parse_target(Some("file:///etc/passwd")),
            Err(Error::Validation(_))
        ));
        assert!(matches!(parse_target(Some("not a url")), Err(Error::Validation(_))));
    }
}
