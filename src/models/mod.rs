mod plan;
mod subscription;
mod user;
mod webhook_event;

pub use plan::*;
pub use subscription::*;
pub use user::*;
pub use webhook_event::*;
