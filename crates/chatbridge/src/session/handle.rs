//! Read side of the session state.

use tokio::sync::watch;

use super::state::{SessionState, SessionStatus};

/// Cheap, cloneable view of the session. Only the manager writes.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        self.rx.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn status(&self) -> SessionStatus {
        self.rx.borrow().clone()
    }

    /// Wait until the session enters `target`. Returns `false` if the manager
    /// went away first.
    pub async fn wait_for(&self, target: SessionState) -> bool {
        let mut rx = self.rx.clone();
        rx.wait_for(|status| status.state == target).await.is_ok()
    }
}

/// Create the status channel shared by the manager and its readers.
pub(crate) fn status_channel() -> (watch::Sender<SessionStatus>, SessionHandle) {
    let (tx, rx) = watch::channel(SessionStatus::default());
    (tx, SessionHandle { rx })
}

#[cfg(test)]
pub(crate) fn handle_in_state(state: SessionState) -> (watch::Sender<SessionStatus>, SessionHandle) {
    let (tx, handle) = status_channel();
    tx.send_modify(|status| status.state = state);
    (tx, handle)
}
