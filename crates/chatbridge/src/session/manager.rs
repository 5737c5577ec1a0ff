//! Session lifecycle manager.
//!
//! Consumes the provider's event channel in one loop. Lifecycle events drive
//! the state machine; message events are handed to the inbound relay, which
//! never blocks the loop. Disconnects schedule a re-initialization after a
//! backoff delay.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handle::{SessionHandle, status_channel};
use super::reconnect::{Backoff, ReconnectPolicy};
use super::state::{LifecycleEvent, SessionStatus};
use crate::provider::{ProviderEvent, SessionProvider};
use crate::relay::InboundRelay;

/// Owns the session state and is its only writer.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    events: mpsc::Receiver<ProviderEvent>,
    relay: InboundRelay,
    status: watch::Sender<SessionStatus>,
    backoff: Backoff,
    reinit_at: Option<Instant>,
}

enum Step {
    Shutdown,
    Event(Option<ProviderEvent>),
    Reinitialize,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        events: mpsc::Receiver<ProviderEvent>,
        relay: InboundRelay,
        policy: ReconnectPolicy,
    ) -> (Self, SessionHandle) {
        let (status, handle) = status_channel();
        let manager = Self {
            provider,
            events,
            relay,
            status,
            backoff: Backoff::new(policy),
            reinit_at: None,
        };
        (manager, handle)
    }

    /// Initialize the provider, then process events until cancelled or the
    /// provider's event channel closes.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Initializing session");
        if let Err(e) = self.provider.initialize().await {
            error!(error = %e, "Session initialization failed");
            self.on_disconnected(format!("initialization failed: {e}"));
        }

        loop {
            let deadline = self.reinit_at;
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Shutdown,
                event = self.events.recv() => Step::Event(event),
                _ = sleep_until(deadline) => Step::Reinitialize,
            };

            match step {
                Step::Shutdown => {
                    debug!("Session manager cancelled");
                    break;
                }
                Step::Event(None) => {
                    warn!("Provider event channel closed, stopping session manager");
                    break;
                }
                Step::Event(Some(event)) => self.handle_event(event),
                Step::Reinitialize => {
                    self.reinit_at = None;
                    self.reinitialize().await;
                }
            }
        }
    }

    fn handle_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::Message(message) => {
                self.relay.relay(message);
            }
            ProviderEvent::Qr { data } => {
                if self.apply(LifecycleEvent::QrIssued) {
                    info!(qr = %data, "Authentication required, scan the QR code to pair");
                    self.status.send_modify(|s| s.qr = Some(data));
                }
            }
            ProviderEvent::Authenticated => {
                if self.apply(LifecycleEvent::Authenticated) {
                    info!("Session authenticated");
                }
            }
            ProviderEvent::AuthFailure { reason } => {
                error!(%reason, "Authentication failed");
                self.apply(LifecycleEvent::AuthFailure);
                self.status.send_modify(|s| s.last_failure = Some(reason));
            }
            ProviderEvent::Ready => {
                if self.apply(LifecycleEvent::Ready) {
                    self.backoff.reset();
                    info!("Session ready");
                }
            }
            ProviderEvent::Disconnected { reason } => {
                warn!(%reason, "Session disconnected");
                self.on_disconnected(reason);
            }
        }
    }

    fn on_disconnected(&mut self, reason: String) {
        self.apply(LifecycleEvent::Disconnected);
        self.status.send_modify(|s| s.last_failure = Some(reason));

        if self.reinit_at.is_some() {
            debug!("Re-initialization already scheduled");
            return;
        }
        let delay = self.backoff.next_delay();
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.backoff.attempt(),
            "Scheduling session re-initialization"
        );
        self.reinit_at = Some(Instant::now() + delay);
    }

    async fn reinitialize(&mut self) {
        if !self.apply(LifecycleEvent::Reinitialize) {
            let state = self.status.borrow().state;
            debug!(%state, "Skipping re-initialization");
            return;
        }

        info!("Re-initializing session");
        if let Err(e) = self.provider.initialize().await {
            error!(error = %e, "Session re-initialization failed");
            self.on_disconnected(format!("re-initialization failed: {e}"));
        }
    }

    /// Run `event` through the state machine. Returns whether it applied.
    fn apply(&self, event: LifecycleEvent) -> bool {
        let current = self.status.borrow().state;
        let Some(next) = current.next(event) else {
            debug!(state = %current, ?event, "Ignoring lifecycle event");
            return false;
        };

        self.status.send_modify(|s| {
            if s.state != next {
                s.since = Utc::now();
            }
            s.state = next;
            s.qr = None;
        });
        debug!(from = %current, to = %next, ?event, "Session state changed");
        true
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
