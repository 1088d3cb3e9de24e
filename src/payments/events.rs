//! Typed LemonSqueezy webhook payloads.
//!
//! `parse_webhook_event` is the only way to obtain a [`WebhookEvent`]; nothing
//! downstream sees an untyped map. Envelope objects reject unknown keys, while
//! `attributes` tolerate provider additions but require their documented
//! fields with exact types and enumerated statuses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::SubscriptionStatus;

/// Recorded as the audit event name when a payload carries no readable name.
pub const UNKNOWN_EVENT_NAME: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventName {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCancelled,
    SubscriptionExpired,
    SubscriptionResumed,
    SubscriptionPaused,
    OrderCreated,
    SubscriptionPaymentSuccess,
    SubscriptionPaymentFailed,
    SubscriptionPaymentRecovered,
    SubscriptionRefunded,
    OrderRefunded,
    /// A well-formed name this service has no handler for.
    Unhandled(String),
}

impl EventName {
    /// Parse an event name. Returns None for names that are empty or contain
    /// anything other than lowercase ASCII letters, digits and underscores.
    pub fn parse(name: &str) -> Option<Self> {
        let known = match name {
            "subscription_created" => Self::SubscriptionCreated,
            "subscription_updated" => Self::SubscriptionUpdated,
            "subscription_cancelled" => Self::SubscriptionCancelled,
            "subscription_expired" => Self::SubscriptionExpired,
            "subscription_resumed" => Self::SubscriptionResumed,
            "subscription_paused" => Self::SubscriptionPaused,
            "order_created" => Self::OrderCreated,
            "subscription_payment_success" => Self::SubscriptionPaymentSuccess,
            "subscription_payment_failed" => Self::SubscriptionPaymentFailed,
            "subscription_payment_recovered" => Self::SubscriptionPaymentRecovered,
            "subscription_refunded" => Self::SubscriptionRefunded,
            "order_refunded" => Self::OrderRefunded,
            other => {
                let well_formed = !other.is_empty()
                    && other
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
                if !well_formed {
                    return None;
                }
                Self::Unhandled(other.to_string())
            }
        };
        Some(known)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionCreated => "subscription_created",
            Self::SubscriptionUpdated => "subscription_updated",
            Self::SubscriptionCancelled => "subscription_cancelled",
            Self::SubscriptionExpired => "subscription_expired",
            Self::SubscriptionResumed => "subscription_resumed",
            Self::SubscriptionPaused => "subscription_paused",
            Self::OrderCreated => "order_created",
            Self::SubscriptionPaymentSuccess => "subscription_payment_success",
            Self::SubscriptionPaymentFailed => "subscription_payment_failed",
            Self::SubscriptionPaymentRecovered => "subscription_payment_recovered",
            Self::SubscriptionRefunded => "subscription_refunded",
            Self::OrderRefunded => "order_refunded",
            Self::Unhandled(name) => name,
        }
    }

    /// Any name mentioning "subscription", including unhandled ones.
    pub fn is_subscription_event(&self) -> bool {
        self.as_str().contains("subscription")
    }

    /// `subscription_payment_*` events carry no plan data and are only logged.
    pub fn is_payment_event(&self) -> bool {
        self.as_str().starts_with("subscription_payment_")
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CustomData {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Meta {
    pub event_name: EventName,
    pub test_mode: Option<bool>,
    pub webhook_id: Option<String>,
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirstSubscriptionItem {
    pub id: i64,
    pub subscription_id: i64,
    pub price_id: i64,
    pub quantity: Option<i64>,
    pub is_usage_based: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubscriptionUrls {
    pub update_payment_method: Option<String>,
    pub customer_portal: Option<String>,
}

/// `data.attributes` of a `subscriptions` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionAttributes {
    pub store_id: i64,
    pub customer_id: i64,
    pub order_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub status: SubscriptionStatus,
    pub status_formatted: String,
    pub product_id: Option<i64>,
    pub variant_id: Option<i64>,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub first_subscription_item: Option<FirstSubscriptionItem>,
    pub pause: Option<Value>,
    pub cancelled: Option<bool>,
    pub renews_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub is_subscription: Option<bool>,
    pub interval: Option<String>,
    pub interval_count: Option<i64>,
    pub subscription_id: Option<i64>,
    pub urls: Option<SubscriptionUrls>,
    pub test_mode: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Failed,
    Paid,
    Refunded,
    PartialRefund,
    Fraudulent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirstOrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub variant_id: i64,
    pub product_name: Option<String>,
    pub variant_name: Option<String>,
    pub price: Option<i64>,
}

/// `data.attributes` of an `orders` object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderAttributes {
    pub store_id: i64,
    pub customer_id: i64,
    pub user_email: String,
    pub currency: String,
    pub total: i64,
    pub status: OrderStatus,
    pub user_name: Option<String>,
    pub status_formatted: Option<String>,
    pub identifier: Option<String>,
    pub order_number: Option<i64>,
    pub first_order_item: Option<FirstOrderItem>,
    pub refunded: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub test_mode: Option<bool>,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Subscription {
        id: String,
        attributes: SubscriptionAttributes,
    },
    Order {
        id: String,
        attributes: OrderAttributes,
    },
}

/// A validated webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub meta: Meta,
    pub data: EventData,
}

impl WebhookEvent {
    pub fn name(&self) -> &EventName {
        &self.meta.event_name
    }

    /// Provider id of the object the event is about (`data.id`).
    pub fn object_id(&self) -> &str {
        match &self.data {
            EventData::Subscription { id, .. } | EventData::Order { id, .. } => id,
        }
    }

    pub fn customer_id(&self) -> i64 {
        match &self.data {
            EventData::Subscription { attributes, .. } => attributes.customer_id,
            EventData::Order { attributes, .. } => attributes.customer_id,
        }
    }

    /// `meta.custom_data.user_id`, passed through checkout.
    pub fn custom_user_id(&self) -> Option<&str> {
        self.meta
            .custom_data
            .as_ref()
            .and_then(|c| c.user_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    pub fn subscription(&self) -> Option<(&str, &SubscriptionAttributes)> {
        match &self.data {
            EventData::Subscription { id, attributes } => Some((id, attributes)),
            EventData::Order { .. } => None,
        }
    }
}

// Envelope shapes. Unknown keys here are a schema violation.

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEnvelope {
    meta: RawMeta,
    data: RawData,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMeta {
    event_name: String,
    test_mode: Option<bool>,
    webhook_id: Option<String>,
    custom_data: Option<CustomData>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawData {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    attributes: Value,
    #[allow(dead_code)]
    relationships: Option<Value>,
    #[allow(dead_code)]
    links: Option<Value>,
}

fn invalid(reason: impl std::fmt::Display) -> AppError {
    AppError::WebhookInvalid(reason.to_string())
}

/// Validate a raw webhook body. Pure: never touches storage.
pub fn parse_webhook_event(raw: &str) -> Result<WebhookEvent> {
    let envelope: RawEnvelope = serde_json::from_str(raw).map_err(invalid)?;

    let event_name = EventName::parse(&envelope.meta.event_name).ok_or_else(|| {
        invalid(format!(
            "malformed meta.event_name '{}'",
            envelope.meta.event_name
        ))
    })?;

    let RawData {
        id, kind, attributes, ..
    } = envelope.data;
    if id.trim().is_empty() {
        return Err(invalid("data.id must be a non-empty string"));
    }

    let data = match kind.as_str() {
        "subscriptions" => EventData::Subscription {
            id,
            attributes: serde_json::from_value(attributes)
                .map_err(|e| invalid(format!("subscription attributes: {}", e)))?,
        },
        "orders" => EventData::Order {
            id,
            attributes: serde_json::from_value(attributes)
                .map_err(|e| invalid(format!("order attributes: {}", e)))?,
        },
        other => return Err(invalid(format!("unsupported data.type '{}'", other))),
    };

    Ok(WebhookEvent {
        meta: Meta {
            event_name,
            test_mode: envelope.meta.test_mode,
            webhook_id: envelope.meta.webhook_id,
            custom_data: envelope.meta.custom_data,
        },
        data,
    })
}

/// Best-effort event name for auditing a payload that failed validation.
pub fn peek_event_name(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| {
            v.get("meta")?
                .get("event_name")?
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_EVENT_NAME.to_string())
}
