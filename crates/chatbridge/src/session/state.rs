//! Session state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle state of the single chat-network session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// An auth challenge (QR) is pending.
    AwaitingAuthentication,
    Authenticated,
    Ready,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::AwaitingAuthentication => "awaiting_authentication",
            SessionState::Authenticated => "authenticated",
            SessionState::Ready => "ready",
            SessionState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    QrIssued,
    Authenticated,
    AuthFailure,
    Ready,
    Disconnected,
    /// The manager re-invoked provider initialization after a disconnect.
    Reinitialize,
}

impl SessionState {
    /// The state reached from `self` on `event`, or `None` if the event does
    /// not apply in this state.
    pub fn next(self, event: LifecycleEvent) -> Option<SessionState> {
        use LifecycleEvent as E;
        use SessionState as S;

        match (self, event) {
            (_, E::AuthFailure) => Some(S::Uninitialized),
            (_, E::Disconnected) => Some(S::Disconnected),
            // A refreshed QR keeps us waiting.
            (S::Uninitialized | S::AwaitingAuthentication, E::QrIssued) => {
                Some(S::AwaitingAuthentication)
            }
            // Uninitialized → Authenticated happens when stored credentials
            // are restored without a challenge.
            (S::Uninitialized | S::AwaitingAuthentication, E::Authenticated) => {
                Some(S::Authenticated)
            }
            (S::Authenticated, E::Ready) => Some(S::Ready),
            (S::Disconnected, E::Reinitialize) => Some(S::Uninitialized),
            _ => None,
        }
    }
}

/// Point-in-time view of the session, as published to readers.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    /// When `state` was entered.
    pub since: DateTime<Utc>,
    /// Pending QR payload while awaiting authentication.
    pub qr: Option<String>,
    /// Reason for the most recent auth failure or disconnect.
    pub last_failure: Option<String>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Uninitialized,
            since: Utc::now(),
            qr: None,
            last_failure: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use LifecycleEvent as E;
    use SessionState as S;

    const ALL_STATES: [SessionState; 5] = [
        S::Uninitialized,
        S::AwaitingAuthentication,
        S::Authenticated,
        S::Ready,
        S::Disconnected,
    ];

    #[test]
    fn happy_path_reaches_ready() {
        let state = S::Uninitialized;
        let state = state.next(E::QrIssued).unwrap();
        assert_eq!(state, S::AwaitingAuthentication);
        let state = state.next(E::Authenticated).unwrap();
        assert_eq!(state, S::Authenticated);
        let state = state.next(E::Ready).unwrap();
        assert_eq!(state, S::Ready);
    }

    #[test]
    fn restored_credentials_skip_the_challenge() {
        assert_eq!(S::Uninitialized.next(E::Authenticated), Some(S::Authenticated));
    }

    #[test]
    fn qr_refresh_keeps_waiting() {
        assert_eq!(
            S::AwaitingAuthentication.next(E::QrIssued),
            Some(S::AwaitingAuthentication)
        );
    }

    #[test]
    fn auth_failure_and_disconnect_apply_from_any_state() {
        for state in ALL_STATES {
            assert_eq!(state.next(E::AuthFailure), Some(S::Uninitialized));
            assert_eq!(state.next(E::Disconnected), Some(S::Disconnected));
        }
    }

    #[test]
    fn reinitialize_only_from_disconnected() {
        assert_eq!(S::Disconnected.next(E::Reinitialize), Some(S::Uninitialized));
        for state in [S::Uninitialized, S::AwaitingAuthentication, S::Authenticated, S::Ready] {
            assert_eq!(state.next(E::Reinitialize), None);
        }
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        assert_eq!(S::Uninitialized.next(E::Ready), None);
        assert_eq!(S::AwaitingAuthentication.next(E::Ready), None);
        assert_eq!(S::Ready.next(E::QrIssued), None);
        assert_eq!(S::Ready.next(E::Authenticated), None);
        assert_eq!(S::Disconnected.next(E::Ready), None);
        assert_eq!(S::Disconnected.next(E::Authenticated), None);
    }

    #[test]
    fn state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&S::AwaitingAuthentication).unwrap(),
            r#""awaiting_authentication""#
        );
        for state in ALL_STATES {
            assert_eq!(
                serde_json::to_string(&state).unwrap(),
                format!("\"{state}\"")
            );
        }
    }
}
