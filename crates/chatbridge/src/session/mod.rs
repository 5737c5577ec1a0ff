//! Session lifecycle.
//!
//! ```text
//!  provider ──ProviderEvent──▶ SessionManager ──watch──▶ SessionHandle (many readers)
//!                                  │
//!                                  └── Message ──▶ InboundRelay (detached delivery)
//! ```
//!
//! - **SessionManager** — sole writer of the session state. Runs the event loop,
//!   applies the state machine, and re-initializes the provider after disconnects.
//! - **SessionHandle** — cloneable read view used by the dispatcher, the group
//!   resolver and the HTTP layer.

mod handle;
mod manager;
mod reconnect;
mod state;

pub use handle::SessionHandle;
pub use manager::SessionManager;
pub use reconnect::ReconnectPolicy;
pub use state::{LifecycleEvent, SessionState, SessionStatus};

#[cfg(test)]
pub(crate) use handle::handle_in_state;
