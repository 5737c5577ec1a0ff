//! Inbound message relay.
//!
//! Every inbound message is forwarded to the configured webhook with a single
//! POST. Deliveries run as detached tasks so the session event loop never
//! waits on them. Each delivery is bounded by a timeout, and the number of
//! deliveries in flight is capped; when the cap is reached new messages are
//! dropped (and logged) rather than queued.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::provider::InboundEvent;

/// Relay settings.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Destination; `None` disables delivery.
    pub webhook_url: Option<Url>,
    pub timeout: Duration,
    pub max_in_flight: usize,
}

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub from: String,
    pub to: String,
    pub body: String,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
}

impl From<InboundEvent> for WebhookPayload {
    fn from(event: InboundEvent) -> Self {
        Self {
            from: event.from,
            to: event.to,
            body: event.body,
            timestamp: event.timestamp,
            message_type: event.message_type,
            id: event.id,
        }
    }
}

/// Why a single delivery failed.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to build webhook client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    Status(u16),

    #[error("webhook delivery timed out")]
    Timeout,
}

struct Webhook {
    url: Url,
    client: Client,
    limiter: Arc<Semaphore>,
}

/// Forwards inbound messages to the webhook, if one is configured.
#[derive(Clone)]
pub struct InboundRelay {
    webhook: Option<Arc<Webhook>>,
}

impl InboundRelay {
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        let Some(url) = config.webhook_url else {
            info!("No webhook configured, inbound messages will not be relayed");
            return Ok(Self::disabled());
        };

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(RelayError::Client)?;
        info!(webhook = %url, timeout_ms = config.timeout.as_millis() as u64, "Inbound relay enabled");

        Ok(Self {
            webhook: Some(Arc::new(Webhook {
                url,
                client,
                limiter: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            })),
        })
    }

    /// A relay that drops every message.
    pub fn disabled() -> Self {
        Self { webhook: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    /// Hand `event` off for delivery without waiting for it.
    ///
    /// Returns the delivery task, or `None` when nothing was started (relay
    /// disabled or saturated).
    pub fn relay(&self, event: InboundEvent) -> Option<JoinHandle<()>> {
        let Some(webhook) = self.webhook.clone() else {
            debug!(from = %event.from, id = %event.id, "Inbound message (relay disabled)");
            return None;
        };

        let Ok(permit) = webhook.limiter.clone().try_acquire_owned() else {
            warn!(from = %event.from, id = %event.id, "Webhook deliveries saturated, dropping inbound message");
            return None;
        };

        Some(tokio::spawn(async move {
            let _permit = permit;
            let id = event.id.clone();
            match webhook.deliver(&event.into()).await {
                Ok(()) => debug!(%id, "Relayed inbound message"),
                Err(e) => warn!(%id, error = %e, "Webhook delivery failed"),
            }
        }))
    }
}

impl Webhook {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<(), RelayError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout
                } else {
                    RelayError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::Router;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use serde_json::Value;

    use super::*;

    #[derive(Clone)]
    struct Sink {
        received: Arc<Mutex<Vec<Value>>>,
        status: StatusCode,
        delay: Duration,
    }

    async fn hook(State(sink): State<Sink>, axum::Json(body): axum::Json<Value>) -> StatusCode {
        tokio::time::sleep(sink.delay).await;
        sink.received.lock().unwrap().push(body);
        sink.status
    }

    async fn serve(status: StatusCode, delay: Duration) -> (Url, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Sink {
            received: received.clone(),
            status,
            delay,
        };
        let app = Router::new().route("/hook", post(hook)).with_state(sink);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook").parse().unwrap(), received)
    }

    fn event(id: &str) -> InboundEvent {
        InboundEvent {
            from: "628111@c.us".to_string(),
            to: "628999@c.us".to_string(),
            body: "hello".to_string(),
            timestamp: 1_700_000_000,
            message_type: "chat".to_string(),
            id: id.to_string(),
        }
    }

    fn relay_to(url: Url, timeout: Duration, max_in_flight: usize) -> InboundRelay {
        InboundRelay::new(RelayConfig {
            webhook_url: Some(url),
            timeout,
            max_in_flight,
        })
        .unwrap()
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let payload = WebhookPayload::from(event("ABC"));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "from": "628111@c.us",
                "to": "628999@c.us",
                "body": "hello",
                "timestamp": 1_700_000_000,
                "type": "chat",
                "id": "ABC",
            })
        );
    }

    #[tokio::test]
    async fn disabled_relay_is_a_no_op() {
        let relay = InboundRelay::new(RelayConfig {
            webhook_url: None,
            timeout: Duration::from_secs(1),
            max_in_flight: 1,
        })
        .unwrap();
        assert!(!relay.is_enabled());
        assert!(relay.relay(event("A")).is_none());
    }

    #[tokio::test]
    async fn delivers_payload_to_webhook() {
        let (url, received) = serve(StatusCode::OK, Duration::ZERO).await;
        let relay = relay_to(url, Duration::from_secs(5), 4);

        relay.relay(event("A")).unwrap().await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["id"], "A");
        assert_eq!(received[0]["type"], "chat");
    }

    #[tokio::test]
    async fn relay_returns_before_delivery_completes() {
        let (url, received) = serve(StatusCode::OK, Duration::from_millis(300)).await;
        let relay = relay_to(url, Duration::from_secs(5), 4);

        let started = tokio::time::Instant::now();
        let first = relay.relay(event("A")).unwrap();
        let second = relay.relay(event("B")).unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(received.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn saturated_relay_drops_instead_of_queueing() {
        let (url, received) = serve(StatusCode::OK, Duration::from_millis(300)).await;
        let relay = relay_to(url, Duration::from_secs(5), 1);

        let first = relay.relay(event("A")).unwrap();
        assert!(relay.relay(event("B")).is_none());
        first.await.unwrap();

        // Permit is released once the first delivery finishes.
        relay.relay(event("C")).unwrap().await.unwrap();
        let ids: Vec<_> = received
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn slow_webhook_times_out() {
        let (url, _received) = serve(StatusCode::OK, Duration::from_secs(5)).await;
        let relay = relay_to(url, Duration::from_millis(100), 1);
        let webhook = relay.webhook.clone().unwrap();

        let started = tokio::time::Instant::now();
        let err = webhook
            .deliver(&event("A").into())
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Timeout), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn non_success_status_is_a_failure() {
        let (url, received) = serve(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
        let relay = relay_to(url, Duration::from_secs(5), 1);
        let webhook = relay.webhook.clone().unwrap();

        let err = webhook.deliver(&event("A").into()).await.unwrap_err();
        assert!(matches!(err, RelayError::Status(500)));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[test]
    fn client_error_keeps_its_source() {
        let cause = Client::new().get("not a url").build().unwrap_err();
        let err = RelayError::Client(cause);
        assert!(std::error::Error::source(&err).is_some());
    }
}
