use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use rusqlite::Connection;
use serde_json::{Value, json};

use crate::config::CustomerIdConflictPolicy;
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::payments::events::peek_event_name;
use crate::payments::{parse_webhook_event, verify_signature};

use super::{dispatch, store};

/// Audit, validate and dispatch one signed delivery.
///
/// The audit row is written even when the payload fails validation, so
/// signed-but-malformed deliveries stay available for forensics.
pub fn ingest(conn: &mut Connection, policy: CustomerIdConflictPolicy, raw: &str) -> Result<()> {
    let parsed = parse_webhook_event(raw);
    let event_name = match &parsed {
        Ok(event) => event.name().to_string(),
        Err(_) => peek_event_name(raw),
    };

    let record = store::save_event(conn, &event_name, raw)?;
    let outcome = parsed.and_then(|event| dispatch::process_event(conn, policy, &event));
    store::record_outcome(conn, record.id, outcome)
}

pub async fn handle_lemonsqueezy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let secret = state.lemonsqueezy.webhook_secret.as_deref().ok_or_else(|| {
        AppError::Configuration("LEMON_SQUEEZY_WEBHOOK_SECRET is not set".into())
    })?;

    let signature = headers
        .get("x-signature")
        .ok_or(AppError::SignatureMissing)?;

    // A header that is not visible ASCII cannot be a hex digest.
    let signature = signature.to_str().unwrap_or_default();
    if !verify_signature(secret, &body, signature) {
        return Err(AppError::SignatureInvalid);
    }

    let raw = String::from_utf8_lossy(&body);

    // Past the signature check every failure answers with the same body.
    let mut conn = state
        .db
        .get()
        .map_err(|e| AppError::Reconciliation(format!("DB connection error: {}", e)))?;

    ingest(&mut conn, state.customer_id_conflict, &raw).map_err(|e| match e {
        AppError::WebhookInvalid(_) | AppError::Reconciliation(_) => e,
        other => AppError::Reconciliation(other.to_string()),
    })?;

    Ok(Json(json!({ "success": true })))
}
