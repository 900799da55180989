use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::super::AppState;
use super::{db_failure, failure};
use crate::core::dispatcher::Rejection;
use crate::core::store::types::TriggerType;

// === Incoming Webhook Endpoint ===

pub async fn webhook_endpoint(
    Path(action_id): Path<i64>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Json<Value> {
    if let Some(secret) = state.webhook_secret.as_deref()
        && !verify_webhook_signature(&headers, &body, secret)
    {
        warn!("Rejected webhook for action {}: bad signature", action_id);
        return failure("Signature verification failed");
    }

    let action = match state.store.get_action(action_id).await {
        Ok(Some(action)) => action,
        Ok(None) => return Json(Rejection::ActionNotFound(action_id).to_json()),
        Err(e) => return db_failure(e),
    };
    if action.trigger_type != TriggerType::Webhook {
        return failure(format!("Action {} does not accept webhooks", action_id));
    }

    let payload = parse_payload(&body);
    info!("Dispatching verified webhook to action {} ({})", action.id, action.name);
    match state.dispatcher.trigger(action.id, &payload, &[]).await {
        Ok(outcome) => Json(outcome.to_json()),
        Err(e) => failure(e),
    }
}

/// JSON bodies are used as-is; anything else is wrapped as `{"raw": body}`.
fn parse_payload(body: &str) -> Value {
    if body.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(body).unwrap_or_else(|_| json!({ "raw": body }))
}

// === Signature Verification ===

/// Verify an HMAC-SHA256 signature over the raw body.
/// Supports GitHub style (`X-Hub-Signature-256: sha256=<hex>`) and a bare
/// `X-Signature: <hex>` header.
pub(crate) fn verify_webhook_signature(headers: &HeaderMap, body: &str, secret: &str) -> bool {
    if let Some(sig) = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        && let Some(hex_sig) = sig.strip_prefix("sha256=")
    {
        return signature_matches(hex_sig, body, secret);
    }

    if let Some(sig) = headers.get("x-signature").and_then(|v| v.to_str().ok()) {
        return signature_matches(sig, body, secret);
    }

    // No recognized signature header found - fail closed
    false
}

pub(crate) fn sign(body: &str, secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

fn signature_matches(given: &str, body: &str, secret: &str) -> bool {
    match sign(body, secret) {
        Some(expected) => constant_time_eq(given.trim().as_bytes(), expected.as_bytes()),
        None => false,
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
