// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Inference provider callback handler

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::Sha256;

use super::{parse_body, AppState};
use crate::error::{Error, Result};
use crate::reconciler::WebhookPayload;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Provider webhook handler
pub async fn handle_webhook(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    if let Some(ref secret) = state.config.webhook.secret {
        authenticate(query.token.as_deref(), &headers, &body, secret)?;
    }

    let payload: WebhookPayload = parse_body(&body)?;
    tracing::info!("Webhook received: id={} status={}", payload.id, payload.status);

    let outcome = state.reconciler.reconcile(&payload).await?;
    tracing::debug!("Webhook for {} reconciled: {:?}", payload.id, outcome);

    Ok(Json(json!({ "message": "Webhook processed successfully" })))
}

/// Accept either the callback token or a body signature
fn authenticate(token: Option<&str>, headers: &HeaderMap, body: &[u8], secret: &str) -> Result<()> {
    if token.is_some_and(|token| token_matches(token, secret)) {
        return Ok(());
    }
    verify_signature(headers, body, secret).map_err(Error::WebhookVerification)
}

/// Constant-time token check: both sides are MACed and the tags compared
/// with `verify_slice`
fn token_matches(token: &str, secret: &str) -> bool {
    let Ok(mut expected) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    expected.update(secret.as_bytes());
    let tag = expected.finalize().into_bytes();

    let Ok(mut candidate) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    candidate.update(token.as_bytes());
    candidate.verify_slice(&tag).is_ok()
}

fn verify_signature(
    headers: &HeaderMap,
    body: &[u8],
    secret: &str,
) -> std::result::Result<(), String> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| format!("Missing {} header", SIGNATURE_HEADER))?;

    // Signature format: "sha256=<hex>"
    let signature = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| "Invalid signature format".to_string())?;

    let signature_bytes =
        hex::decode(signature).map_err(|_| "Invalid hex in signature".to_string())?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| "Invalid secret key".to_string())?;
    mac.update(body);

    mac.verify_slice(&signature_bytes)
        .map_err(|_| "Signature mismatch".to_string())?;

    Ok(())
}
