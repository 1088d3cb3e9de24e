use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::payments::pricing::{PriceEntry, fetch_prices};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResponse {
    prices: Vec<PriceEntry>,
    updated_at: String,
}

/// GET /api/pricing - current variants of the configured store.
pub async fn get_pricing(State(state): State<AppState>) -> Result<Json<PricingResponse>> {
    tracing::info!("Fetching pricing data from LemonSqueezy API");

    let prices = fetch_prices(&state.client, &state.lemonsqueezy)
        .await
        .map_err(|e| match e {
            AppError::UpstreamApi(_) => e,
            other => AppError::UpstreamApi(other.to_string()),
        })?;

    tracing::info!("Fetched {} pricing variants", prices.len());
    Ok(Json(PricingResponse {
        prices,
        updated_at: chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/pricing", get(get_pricing))
}
