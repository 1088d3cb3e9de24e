use serde::Serialize;

/// Audit row for one inbound webhook delivery.
///
/// `processed` means a handling attempt concluded, not that it succeeded.
/// Failures are found by `processing_error IS NOT NULL`; rows still at
/// `processed = false` never reached a status update and can be replayed.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventRecord {
    pub id: i64,
    pub event_name: String,
    /// Raw payload, stored verbatim
    pub body: String,
    pub processed: bool,
    pub processing_error: Option<String>,
    pub created_at: i64,
}
