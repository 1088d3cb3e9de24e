pub mod events;
mod lemonsqueezy;
pub mod portal;
pub mod pricing;

pub use events::{EventData, EventName, WebhookEvent, parse_webhook_event};
pub use lemonsqueezy::*;
