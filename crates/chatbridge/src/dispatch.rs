//! Outbound message dispatch.
//!
//! All outbound sends go through one [`Dispatcher`], which holds a lock for
//! the duration of each provider call so the session never sees two sends at
//! once. A session that is not ready fails the call immediately.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::address::Address;
use crate::provider::{ProviderError, SessionProvider};
use crate::session::{SessionHandle, SessionState};

/// Why a dispatch did not go out.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("session not ready (state: {state})")]
    NotReady { state: SessionState },

    #[error("message body is empty")]
    EmptyBody,

    #[error("failed to send message: {0}")]
    ProviderSendFailed(#[source] ProviderError),
}

/// Serializes sends against the single session.
pub struct Dispatcher {
    provider: Arc<dyn SessionProvider>,
    session: SessionHandle,
    send_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn SessionProvider>, session: SessionHandle) -> Self {
        Self {
            provider,
            session,
            send_lock: Mutex::new(()),
        }
    }

    /// Send `body` to `target`. Exactly one provider call per invocation, no
    /// retries. Returns the target on success.
    pub async fn dispatch(&self, target: &Address, body: &str) -> Result<Address, DispatchError> {
        if body.is_empty() {
            return Err(DispatchError::EmptyBody);
        }
        self.ensure_ready()?;

        let _guard = self.send_lock.lock().await;
        // The session may have dropped while we waited for the lock.
        self.ensure_ready()?;

        match self.provider.send_message(target, body).await {
            Ok(()) => {
                debug!(to = %target, "Message sent");
                Ok(target.clone())
            }
            Err(e) => {
                warn!(to = %target, error = %e, "Provider failed to send message");
                Err(DispatchError::ProviderSendFailed(e))
            }
        }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn ensure_ready(&self) -> Result<(), DispatchError> {
        let state = self.session.state();
        if state != SessionState::Ready {
            return Err(DispatchError::NotReady { state });
        }
        Ok(())
    }
}
