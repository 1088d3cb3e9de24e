//! Re-run audit rows whose handling never concluded.

use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::WebhookEventRecord;
use crate::payments::parse_webhook_event;

use super::{dispatch, store};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub replayed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Dispatch every `processed = false` row again, oldest first.
///
/// Outcomes are written to the existing rows; no new audit rows are created.
pub fn replay_unprocessed(state: &AppState) -> Result<ReplaySummary> {
    let mut conn = state.db.get()?;
    let pending = queries::list_unprocessed_webhook_events(&conn)?;
    tracing::info!("Replaying {} unprocessed webhook events", pending.len());

    let mut summary = ReplaySummary::default();
    for record in pending {
        let outcome = parse_webhook_event(&record.body).and_then(|event| {
            dispatch::process_event(&mut conn, state.customer_id_conflict, &event)
        });
        summary.replayed += 1;
        match store::record_outcome(&conn, record.id, outcome) {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                tracing::warn!("Replay of webhook event {} failed: {}", record.id, e);
                summary.failed += 1;
            }
        }
    }

    tracing::info!(
        "Replay finished: {} replayed, {} succeeded, {} failed",
        summary.replayed,
        summary.succeeded,
        summary.failed
    );
    Ok(summary)
}

/// Failed deliveries, newest first.
pub fn list_failed(state: &AppState, limit: i64) -> Result<Vec<WebhookEventRecord>> {
    let conn = state.db.get()?;
    queries::list_failed_webhook_events(&conn, limit)
}
