//! HTTP request handlers.

mod health;
mod messages;

pub use health::{health, index, status};
pub use messages::{broadcast, send, send_group_by_name};
