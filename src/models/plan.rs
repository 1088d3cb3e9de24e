use serde::{Deserialize, Serialize};

/// Interval recorded for one-time purchases.
pub const LIFETIME_INTERVAL: &str = "lifetime";

/// A purchasable LemonSqueezy variant, keyed by `variant_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub product_id: i64,
    pub product_name: String,
    pub variant_id: i64,
    pub name: String,
    pub description: String,
    /// Price in the smallest currency unit, as sent by the provider
    pub price: String,
    pub is_usage_based: bool,
    pub is_one_time_payment: bool,
    pub interval: String,
    pub interval_count: i64,
    pub trial_interval: String,
    pub trial_interval_count: i64,
    pub sort: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Every mutable plan field. An upsert overwrites all of them.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub product_id: i64,
    pub product_name: String,
    pub variant_id: i64,
    pub name: String,
    pub description: String,
    pub price: String,
    pub is_usage_based: bool,
    pub is_one_time_payment: bool,
    pub interval: String,
    pub interval_count: i64,
    pub trial_interval: String,
    pub trial_interval_count: i64,
    pub sort: i64,
}
