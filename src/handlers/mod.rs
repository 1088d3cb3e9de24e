pub mod health;
pub mod pricing;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// Every route the service exposes, before state and layers are applied.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(pricing::router())
        .merge(webhooks::router())
}
