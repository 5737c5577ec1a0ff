//! Session provider seam.
//!
//! The provider owns the actual chat-network session: it authenticates, keeps
//! the connection alive, sends messages and lists conversations. Everything it
//! observes (auth challenges, readiness, disconnects, inbound messages) flows
//! back to the core as [`ProviderEvent`]s on a single mpsc channel.

mod subprocess;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

use crate::address::Address;

pub use chatbridge_protocol::{Conversation, InboundMessage as InboundEvent};
pub use subprocess::{SubprocessConfig, SubprocessProvider};

/// Capacity of the provider → core event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Operations the core needs from a chat-network session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Start (or restart) authentication and connection.
    async fn initialize(&self) -> Result<(), ProviderError>;

    /// Send a text message to a canonical address.
    async fn send_message(&self, to: &Address, body: &str) -> Result<(), ProviderError>;

    /// Fetch the current conversation list. Never cached.
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ProviderError>;

    /// Release the session. Default is a no-op.
    async fn shutdown(&self) {}
}

/// Lifecycle and inbound events emitted by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Qr { data: String },
    Authenticated,
    AuthFailure { reason: String },
    Ready,
    Disconnected { reason: String },
    Message(InboundEvent),
}

/// Errors surfaced by a provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider cannot take requests right now (not running, exited).
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The network or the provider refused the request.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider io error: {0}")]
    Io(#[from] std::io::Error),

    /// The provider answered with something we could not use.
    #[error("provider protocol error: {0}")]
    Protocol(String),
}
