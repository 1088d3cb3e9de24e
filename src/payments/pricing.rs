use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::LemonSqueezyConfig;
use crate::error::{AppError, Result};

use super::lemonsqueezy::{LemonSqueezyClient, ProductResource};

/// Interval reported for variants sold as one-time (lifetime) purchases.
pub const ONE_TIME_INTERVAL: &str = "once";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VariantInterval {
    Month,
    Year,
}

impl VariantInterval {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Year => "year",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VariantStatus {
    Draft,
    Published,
    Pending,
}

#[derive(Debug, Deserialize)]
struct VariantAttributes {
    name: String,
    price: i64,
    currency: Option<String>,
    interval: Option<VariantInterval>,
    interval_count: i64,
    is_subscription: bool,
    product_id: i64,
    description: Option<String>,
    #[allow(dead_code)]
    status: VariantStatus,
}

#[derive(Debug, Deserialize)]
struct Variant {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    attributes: VariantAttributes,
}

/// One purchasable price as served by `GET /api/pricing`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub id: String,
    pub product_id: i64,
    pub name: String,
    pub description: String,
    /// Smallest currency unit
    pub price: i64,
    pub currency: String,
    pub interval: Option<String>,
    pub interval_count: i64,
    pub is_subscription: bool,
}

fn validate_variant(raw: Value) -> std::result::Result<Variant, String> {
    let variant: Variant = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    if variant.kind != "variants" {
        return Err(format!("unexpected resource type '{}'", variant.kind));
    }
    Ok(variant)
}

fn to_price_entry(variant: Variant) -> PriceEntry {
    let attrs = variant.attributes;
    let interval = match attrs.interval {
        Some(_) if !attrs.is_subscription => Some(ONE_TIME_INTERVAL.to_string()),
        Some(interval) => Some(interval.as_str().to_string()),
        None => None,
    };

    PriceEntry {
        id: variant.id,
        product_id: attrs.product_id,
        name: attrs.name,
        description: attrs.description.unwrap_or_default(),
        price: attrs.price,
        currency: attrs
            .currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "USD".to_string()),
        interval,
        interval_count: if attrs.interval_count > 0 {
            attrs.interval_count
        } else {
            1
        },
        is_subscription: attrs.is_subscription,
    }
}

/// Keep variants of products in `store_id`, drop invalid ones, map the rest.
pub fn build_price_list(
    variants: Vec<Value>,
    products: &[ProductResource],
    store_id: &str,
) -> Vec<PriceEntry> {
    let store_products: HashSet<i64> = products
        .iter()
        .filter(|p| p.attributes.store_id.to_string() == store_id)
        .filter_map(|p| p.id.parse().ok())
        .collect();

    let total = variants.len();
    let mut prices = Vec::new();
    for raw in variants {
        let product_id = raw.pointer("/attributes/product_id").and_then(Value::as_i64);
        if !product_id.is_some_and(|id| store_products.contains(&id)) {
            continue;
        }
        let variant_id = raw.get("id").cloned().unwrap_or(Value::Null);
        match validate_variant(raw) {
            Ok(variant) => prices.push(to_price_entry(variant)),
            Err(e) => {
                tracing::warn!("Skipping invalid variant {}: {}", variant_id, e);
            }
        }
    }

    tracing::info!(
        "Validated {}/{} variants for store {}",
        prices.len(),
        total,
        store_id
    );
    prices
}

/// Fetch variants and products and build the store's price list.
pub async fn fetch_prices(
    client: &LemonSqueezyClient,
    config: &LemonSqueezyConfig,
) -> Result<Vec<PriceEntry>> {
    let store_id = config
        .store_id
        .as_deref()
        .ok_or_else(|| AppError::Configuration("LEMON_SQUEEZY_STORE_ID is not set".into()))?;
    if !client.is_configured() {
        return Err(AppError::Configuration(
            "LEMON_SQUEEZY_API_KEY is not set".into(),
        ));
    }

    let variants = client.list_variants().await.into_result()?;
    let products = client.list_products().await.into_result()?;

    Ok(build_price_list(variants, &products, store_id))
}
