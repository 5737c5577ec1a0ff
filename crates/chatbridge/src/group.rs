//! Group lookup by display name.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::address::{Address, normalize};
use crate::provider::{ProviderError, SessionProvider};
use crate::session::{SessionHandle, SessionState};

#[derive(Debug, Error)]
pub enum GroupResolveError {
    #[error("group '{name}' not found")]
    NotFound { name: String },

    #[error("session not ready (state: {state})")]
    NotReady { state: SessionState },

    #[error("failed to list conversations: {0}")]
    Provider(#[from] ProviderError),
}

/// A group matched by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    pub address: Address,
    /// The group's name as the network reports it.
    pub name: String,
}

/// Resolves group names against the live conversation list.
pub struct GroupResolver {
    provider: Arc<dyn SessionProvider>,
    session: SessionHandle,
}

impl GroupResolver {
    pub fn new(provider: Arc<dyn SessionProvider>, session: SessionHandle) -> Self {
        Self { provider, session }
    }

    /// Find the group named `name`, ignoring case.
    ///
    /// Always queries the provider. If several groups share the name, the
    /// first one listed wins.
    pub async fn resolve(&self, name: &str) -> Result<ResolvedGroup, GroupResolveError> {
        let state = self.session.state();
        if state != SessionState::Ready {
            return Err(GroupResolveError::NotReady { state });
        }

        let wanted = name.to_lowercase();
        let conversations = self.provider.list_conversations().await?;
        debug!(count = conversations.len(), "Fetched conversations");

        for conversation in conversations {
            if !conversation.is_group || conversation.name.to_lowercase() != wanted {
                continue;
            }
            match normalize(&conversation.id) {
                Ok(address) if address.is_group() => {
                    return Ok(ResolvedGroup {
                        address,
                        name: conversation.name,
                    });
                }
                _ => warn!(id = %conversation.id, "Skipping group with unusable address"),
            }
        }

        Err(GroupResolveError::NotFound {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{FakeProvider, conversation};
    use crate::session::handle_in_state;

    fn resolver(provider: Arc<FakeProvider>) -> GroupResolver {
        let (_tx, session) = handle_in_state(SessionState::Ready);
        GroupResolver::new(provider, session)
    }

    fn provider_with_groups() -> Arc<FakeProvider> {
        let provider = Arc::new(FakeProvider::new());
        provider.set_conversations(vec![
            conversation("628111@c.us", false, "team alpha"),
            conversation("111@g.us", true, "Team Alphabet"),
            conversation("222@g.us", true, "team alpha"),
            conversation("333@g.us", true, "TEAM ALPHA"),
        ]);
        provider
    }

    #[tokio::test]
    async fn matches_case_insensitively_and_exactly() {
        let resolver = resolver(provider_with_groups());
        let group = resolver.resolve("Team Alpha").await.unwrap();
        assert_eq!(group.address.as_str(), "222@g.us");
        assert_eq!(group.name, "team alpha");
    }

    #[tokio::test]
    async fn prefix_is_not_a_match() {
        let provider = Arc::new(FakeProvider::new());
        provider.set_conversations(vec![conversation("111@g.us", true, "Team Alphabet")]);
        let err = resolver(provider).resolve("Team Alpha").await.unwrap_err();
        assert!(matches!(err, GroupResolveError::NotFound { ref name } if name == "Team Alpha"));
    }

    #[tokio::test]
    async fn contacts_are_never_groups() {
        let provider = Arc::new(FakeProvider::new());
        provider.set_conversations(vec![conversation("628111@c.us", false, "Family")]);
        let err = resolver(provider).resolve("family").await.unwrap_err();
        assert!(matches!(err, GroupResolveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn skips_group_entries_with_bad_ids() {
        let provider = Arc::new(FakeProvider::new());
        provider.set_conversations(vec![
            conversation("garbage", true, "Family"),
            conversation("444@g.us", true, "family"),
        ]);
        let group = resolver(provider).resolve("FAMILY").await.unwrap();
        assert_eq!(group.address.as_str(), "444@g.us");
    }

    #[tokio::test]
    async fn sees_renames_without_caching() {
        let provider = provider_with_groups();
        let resolver = resolver(provider.clone());
        assert!(resolver.resolve("Renamed").await.is_err());

        provider.set_conversations(vec![conversation("222@g.us", true, "Renamed")]);
        assert_eq!(
            resolver.resolve("renamed").await.unwrap().address.as_str(),
            "222@g.us"
        );
    }

    #[tokio::test]
    async fn requires_ready_session() {
        let provider = provider_with_groups();
        let (_tx, session) = handle_in_state(SessionState::Authenticated);
        let resolver = GroupResolver::new(provider, session);
        let err = resolver.resolve("team alpha").await.unwrap_err();
        assert!(matches!(
            err,
            GroupResolveError::NotReady {
                state: SessionState::Authenticated
            }
        ));
    }
}
