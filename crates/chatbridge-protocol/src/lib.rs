//! Bridge protocol for chatbridge.
//!
//! chatbridge does not speak the chat network's wire protocol itself. It drives
//! an external *bridge* process that owns the network session, and talks to it
//! with newline-delimited JSON (JSON Lines) over stdio:
//!
//! ```text
//!  chatbridge ──BridgeCommand──▶ stdin  ┌────────┐
//!                                       │ bridge │ ◀──▶ chat network
//!  chatbridge ◀──BridgeEvent─── stdout  └────────┘
//! ```
//!
//! Lifecycle and inbound-message events are unsolicited. Commands that expect
//! an answer carry a `request_id`, and the bridge echoes it back in the
//! matching [`BridgeEvent::SendResult`] or [`BridgeEvent::Conversations`].

use serde::{Deserialize, Serialize};

/// Environment variable carrying the session-data directory to the bridge.
pub const SESSION_DIR_ENV: &str = "CHATBRIDGE_SESSION_DIR";

// ============================================================================
// Commands (chatbridge → bridge)
// ============================================================================

/// A command written to the bridge's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    /// Start (or restart) authentication and connect.
    Initialize,
    /// Send a text message to a fully qualified address.
    SendMessage {
        request_id: String,
        to: String,
        body: String,
    },
    /// List the account's active conversations.
    ListConversations { request_id: String },
    /// Close the session and exit.
    Shutdown,
}

// ============================================================================
// Events (bridge → chatbridge)
// ============================================================================

/// An event read from the bridge's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Authentication challenge issued; `data` is the QR payload to pair with.
    Qr { data: String },
    Authenticated,
    AuthFailure {
        #[serde(default)]
        reason: String,
    },
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
    Message(InboundMessage),
    /// Reply to [`BridgeCommand::SendMessage`]. `error` is set on failure.
    SendResult {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Reply to [`BridgeCommand::ListConversations`].
    Conversations {
        request_id: String,
        #[serde(default)]
        conversations: Vec<Conversation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl BridgeEvent {
    /// The request this event answers, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            BridgeEvent::SendResult { request_id, .. }
            | BridgeEvent::Conversations { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// A message received on the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub body: String,
    /// Epoch seconds.
    pub timestamp: i64,
    /// Network message kind (`chat`, `image`, ...). `type` is taken by the
    /// event tag, so bridges send it as `message_type`.
    #[serde(default = "default_message_type")]
    pub message_type: String,
    pub id: String,
}

fn default_message_type() -> String {
    "chat".to_string()
}

/// A conversation as listed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_tagged_by_type() {
        let cmd = BridgeCommand::SendMessage {
            request_id: "01J".to_string(),
            to: "628123@c.us".to_string(),
            body: "hi".to_string(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.starts_with(r#"{"type":"send_message","request_id":"01J""#));

        let init = serde_json::to_string(&BridgeCommand::Initialize).unwrap();
        assert_eq!(init, r#"{"type":"initialize"}"#);
    }

    #[test]
    fn parses_lifecycle_events() {
        let qr: BridgeEvent = serde_json::from_str(r#"{"type":"qr","data":"2@abc"}"#).unwrap();
        assert_eq!(
            qr,
            BridgeEvent::Qr {
                data: "2@abc".to_string()
            }
        );

        let gone: BridgeEvent = serde_json::from_str(r#"{"type":"disconnected"}"#).unwrap();
        assert_eq!(
            gone,
            BridgeEvent::Disconnected {
                reason: String::new()
            }
        );
        assert!(gone.request_id().is_none());
    }

    #[test]
    fn parses_inbound_message_with_defaults() {
        let line = r#"{"type":"message","from":"628111@c.us","to":"628999@c.us","timestamp":1700000000,"id":"ABCD"}"#;
        let BridgeEvent::Message(msg) = serde_json::from_str::<BridgeEvent>(line).unwrap() else {
            panic!("expected message event");
        };
        assert_eq!(msg.from, "628111@c.us");
        assert_eq!(msg.body, "");
        assert_eq!(msg.message_type, "chat");
        assert_eq!(msg.timestamp, 1_700_000_000);
    }

    #[test]
    fn replies_expose_request_id() {
        let line = r#"{"type":"conversations","request_id":"r1","conversations":[{"id":"123@g.us","is_group":true,"name":"Team"}]}"#;
        let event: BridgeEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.request_id(), Some("r1"));
        let BridgeEvent::Conversations { conversations, .. } = event else {
            panic!("expected conversations");
        };
        assert!(conversations[0].is_group);

        let failed: BridgeEvent =
            serde_json::from_str(r#"{"type":"send_result","request_id":"r2","error":"boom"}"#)
                .unwrap();
        assert_eq!(
            failed,
            BridgeEvent::SendResult {
                request_id: "r2".to_string(),
                error: Some("boom".to_string())
            }
        );
    }
}
