//! Webhook audit log.
//!
//! Every delivery that passes the signature check gets exactly one row,
//! written before dispatch and updated exactly once afterwards.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::WebhookEventRecord;

/// Insert the audit row for a delivery. `body` is stored verbatim.
pub fn save_event(conn: &Connection, event_name: &str, body: &str) -> Result<WebhookEventRecord> {
    let record = queries::create_webhook_event(conn, event_name, body)?;
    tracing::info!("Saved webhook event {} ({})", record.id, event_name);
    Ok(record)
}

/// Record the outcome of a handling attempt.
///
/// `processed` is true for both success and failure; failures carry an error.
pub fn update_event_status(
    conn: &Connection,
    id: i64,
    processed: bool,
    processing_error: Option<&str>,
) -> Result<WebhookEventRecord> {
    let record = queries::update_webhook_event_status(conn, id, processed, processing_error)?
        .ok_or_else(|| AppError::NotFound(format!("Webhook event {} not found", id)))?;

    match processing_error {
        Some(error) => tracing::warn!("Webhook event {} failed: {}", id, error),
        None => tracing::debug!("Webhook event {} processed", id),
    }
    Ok(record)
}

/// Mark the event concluded with whatever `outcome` says, then hand the outcome back.
pub fn record_outcome(conn: &Connection, id: i64, outcome: Result<()>) -> Result<()> {
    match &outcome {
        Ok(()) => {
            update_event_status(conn, id, true, None)?;
        }
        Err(e) => {
            update_event_status(conn, id, true, Some(&e.to_string()))?;
        }
    }
    outcome
}
