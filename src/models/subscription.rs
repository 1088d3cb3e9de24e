use serde::{Deserialize, Serialize};

/// Subscription status as reported by LemonSqueezy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    OnTrial,
    Active,
    Paused,
    PastDue,
    Unpaid,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrial => "on_trial",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "on_trial" => Ok(Self::OnTrial),
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "past_due" => Ok(Self::PastDue),
            "unpaid" => Ok(Self::Unpaid),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Local copy of a LemonSqueezy subscription. Never deleted; cancellation is a status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Provider's subscription id (unique)
    pub lemon_squeezy_id: String,
    pub order_id: i64,
    /// Customer name snapshot
    pub name: String,
    /// Customer email snapshot
    pub email: String,
    pub status: SubscriptionStatus,
    pub status_formatted: String,
    pub renews_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub trial_ends_at: Option<i64>,
    pub price: String,
    pub is_usage_based: bool,
    pub is_paused: bool,
    pub subscription_item_id: Option<i64>,
    pub lemon_squeezy_variant_id: Option<String>,
    pub lemon_squeezy_order_id: Option<String>,
    /// Provider `updated_at` of the last applied event, for the ordering guard
    pub provider_updated_at: Option<i64>,
    pub user_id: String,
    pub plan_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Full subscription record derived from a lifecycle event.
///
/// On insert every field is written. On update `user_id`, `plan_id`, `order_id`,
/// `name`, `email`, `is_usage_based` and `subscription_item_id` are left alone.
#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub lemon_squeezy_id: String,
    pub order_id: i64,
    pub name: String,
    pub email: String,
    pub status: SubscriptionStatus,
    pub status_formatted: String,
    pub renews_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub trial_ends_at: Option<i64>,
    pub price: String,
    pub is_usage_based: bool,
    pub is_paused: bool,
    pub subscription_item_id: Option<i64>,
    pub lemon_squeezy_variant_id: Option<String>,
    pub lemon_squeezy_order_id: Option<String>,
    pub provider_updated_at: Option<i64>,
}

/// Change applied to an existing subscription by an event without plan data.
#[derive(Debug, Clone)]
pub struct SubscriptionStatusChange {
    pub status: SubscriptionStatus,
    pub status_formatted: String,
    pub renews_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub trial_ends_at: Option<i64>,
    pub is_paused: bool,
    pub lemon_squeezy_variant_id: Option<String>,
    pub provider_updated_at: Option<i64>,
}
