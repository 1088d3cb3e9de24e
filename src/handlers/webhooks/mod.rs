pub mod customer;
pub mod dispatch;
pub mod lemonsqueezy;
pub mod reconcile;
pub mod replay;
pub mod store;

pub use lemonsqueezy::handle_lemonsqueezy_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/lemonsqueezy", post(handle_lemonsqueezy_webhook))
}
