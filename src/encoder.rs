// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Image encoder
//!
//! Turns a client-local image into the bare base64 payload the inference
//! provider expects. Data-URL image headers (`data:image/png;base64,`) are
//! stripped; bare payloads pass through untouched, so encoding is idempotent.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Image input, resolved by the caller before encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw file contents
    RawBytes(Vec<u8>),
    /// Base64 payload, with or without a data-URL header
    EncodedString(String),
}

impl ImageSource {
    /// Read a local file into a `RawBytes` source
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(Self::RawBytes(bytes))
    }
}

static RE_DATA_URL_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:image/\w+;base64,").unwrap());

/// Produce a bare base64 payload from an image source
pub fn encode(source: &ImageSource) -> Result<String> {
    match source {
        ImageSource::RawBytes(bytes) => {
            if bytes.is_empty() {
                return Err(Error::Encoding("empty image file".to_string()));
            }
            Ok(STANDARD.encode(bytes))
        }
        ImageSource::EncodedString(s) => {
            if s.is_empty() {
                return Err(Error::Encoding("empty image string".to_string()));
            }
            Ok(strip_data_url(s).to_string())
        }
    }
}

/// Strip a leading `data:image/<type>;base64,` header, if any
pub fn strip_data_url(s: &str) -> &str {
    match RE_DATA_URL_HEADER.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    }
}

/// Decode a bare or data-URL base64 image into bytes
pub fn decode(s: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(strip_data_url(s).trim())?)
}

/// Wrap a bare payload back into a data URL
pub fn to_data_url(payload: &str, mime: &str) -> String {
    format!("data:{};base64,{}", mime, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    #[test]
    fn test_strips_data_url_header() {
        let input = format!("data:image/png;base64,{}", PIXEL);
        let out = encode(&ImageSource::EncodedString(input)).unwrap();
        assert_eq!(out, PIXEL);
        assert!(!out.contains("data:"));
        assert!(STANDARD.decode(&out).is_ok());
    }

    #[test]
    fn test_strips_jpeg_and_webp_headers() {
        for mime in ["jpeg", "webp", "gif"] {
            let input = format!("data:image/{};base64,{}", mime, PIXEL);
            assert_eq!(encode(&ImageSource::EncodedString(input)).unwrap(), PIXEL);
        }
    }

    #[test]
    fn test_bare_payload_passes_through() {
        let out = encode(&ImageSource::EncodedString(PIXEL.to_string())).unwrap();
        assert_eq!(out, PIXEL);
    }

    #[test]
    fn test_encode_is_idempotent() {
        let first = encode(&ImageSource::EncodedString(format!(
            "data:image/png;base64,{}",
            PIXEL
        )))
        .unwrap();
        let second = encode(&ImageSource::EncodedString(first.clone())).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_image_data_url_is_left_alone() {
        let input = "data:text/plain;base64,aGVsbG8=";
        assert_eq!(strip_data_url(input), input);
    }

    #[test]
    fn test_raw_bytes_round_trip() {
        let bytes = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
        let out = encode(&ImageSource::RawBytes(bytes.clone())).unwrap();
        assert_eq!(decode(&out).unwrap(), bytes);
    }

    #[test]
    fn test_empty_inputs_rejected() {
        assert!(matches!(
            encode(&ImageSource::RawBytes(Vec::new())),
            Err(Error::Encoding(_))
        ));
        assert!(matches!(
            encode(&ImageSource::EncodedString(String::new())),
            Err(Error::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        tokio::fs::write(&path, b"not really a png").await.unwrap();

        let source = ImageSource::from_path(&path).await.unwrap();
        assert_eq!(source, ImageSource::RawBytes(b"not really a png".to_vec()));
    }
}
