//! In-memory provider for tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Conversation, ProviderError, SessionProvider};
use crate::address::Address;
use crate::session::SessionHandle;

/// Records sends, serves a canned conversation list, and fails sends to
/// selected addresses. When attached to a session it panics on any send
/// attempted while the session is not ready.
#[derive(Default)]
pub(crate) struct FakeProvider {
    sent: Mutex<Vec<(String, String)>>,
    conversations: Mutex<Vec<Conversation>>,
    failing: Mutex<HashSet<String>>,
    session: Mutex<Option<SessionHandle>>,
    send_delay: Option<Duration>,
    init_calls: AtomicUsize,
    fail_init: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_send_delay(delay: Duration) -> Self {
        Self {
            send_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn attach(&self, session: SessionHandle) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub fn fail_sends_to(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    /// Make the next `n` initialize calls fail.
    pub fn fail_next_inits(&self, n: usize) {
        self.fail_init.store(n, Ordering::SeqCst);
    }

    pub fn set_conversations(&self, conversations: Vec<Conversation>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

pub(crate) fn conversation(id: &str, is_group: bool, name: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        is_group,
        name: name.to_string(),
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn initialize(&self) -> Result<(), ProviderError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_init.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_init.store(remaining - 1, Ordering::SeqCst);
            return Err(ProviderError::Unavailable("fake init failure".to_string()));
        }
        Ok(())
    }

    async fn send_message(&self, to: &Address, body: &str) -> Result<(), ProviderError> {
        if let Some(session) = self.session.lock().unwrap().as_ref() {
            assert!(
                session.is_ready(),
                "send attempted while session is {}",
                session.state()
            );
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.send_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().unwrap().contains(to.as_str()) {
            return Err(ProviderError::Rejected("recipient not on network".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, ProviderError> {
        Ok(self.conversations.lock().unwrap().clone())
    }
}
