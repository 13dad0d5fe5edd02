//! Effective-list cache.
//!
//! Holds the runtime bindings the match engine reads on every stanza:
//! - active lists, keyed by full JID, session-scoped
//! - default lists, keyed by bare JID, with negative-lookup sentinels
//! - the set of sessions that asked for the Blocking view
//!
//! List bodies are immutable once installed ([`Arc<PrivacyList>`]); every
//! mutation swaps the binding to a fresh value, so readers holding a clone
//! always see a consistent snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use jid::{BareJid, FullJid};
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::PrivacyList;

/// Cached default-list slot. A negative entry records that the account has
/// no default, so the store is not consulted again.
#[derive(Debug, Clone)]
enum DefaultSlot {
    Present(Arc<PrivacyList>),
    Absent,
}

/// Session- and account-scoped list bindings for one virtual host.
#[derive(Default)]
pub struct ListCache {
    active: RwLock<HashMap<FullJid, Arc<PrivacyList>>>,
    default: RwLock<HashMap<BareJid, DefaultSlot>>,
    block_list_users: RwLock<HashSet<FullJid>>,
}

impl ListCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active list of a session, if bound.
    pub async fn get_active(&self, session: &FullJid) -> Option<Arc<PrivacyList>> {
        self.active.read().await.get(session).cloned()
    }

    /// Bind or clear a session's active list.
    pub async fn set_active(&self, session: &FullJid, list: Option<Arc<PrivacyList>>) {
        let mut active = self.active.write().await;
        match list {
            Some(list) => {
                debug!(session = %session, list = %list.name, "active list bound");
                active.insert(session.clone(), list);
            }
            None => {
                if active.remove(session).is_some() {
                    debug!(session = %session, "active list unbound");
                }
            }
        }
    }

    /// Name of a session's active list, if bound.
    pub async fn active_name(&self, session: &FullJid) -> Option<String> {
        self.active
            .read()
            .await
            .get(session)
            .map(|list| list.name.clone())
    }

    /// Whether `session` has a list of the given name bound as active.
    pub async fn is_cached_with_name(&self, session: &FullJid, name: &str) -> bool {
        self.active
            .read()
            .await
            .get(session)
            .is_some_and(|list| list.name == name)
    }

    /// Sessions of `owner` whose active binding names `name`.
    pub async fn sessions_with_active_name(&self, owner: &BareJid, name: &str) -> Vec<FullJid> {
        self.active
            .read()
            .await
            .iter()
            .filter(|(session, list)| &session.to_bare() == owner && list.name == name)
            .map(|(session, _)| session.clone())
            .collect()
    }

    /// Cached default list of an account.
    ///
    /// `None` means "not cached, ask the store"; `Some(None)` is a cached
    /// negative lookup.
    pub async fn get_default(&self, owner: &BareJid) -> Option<Option<Arc<PrivacyList>>> {
        self.default.read().await.get(owner).map(|slot| match slot {
            DefaultSlot::Present(list) => Some(list.clone()),
            DefaultSlot::Absent => None,
        })
    }

    /// Cache an account's default list (`None` caches the negative).
    pub async fn set_default(&self, owner: &BareJid, list: Option<Arc<PrivacyList>>) {
        let slot = match list {
            Some(list) => {
                debug!(owner = %owner, list = %list.name, "default list cached");
                DefaultSlot::Present(list)
            }
            None => DefaultSlot::Absent,
        };
        self.default.write().await.insert(owner.clone(), slot);
    }

    /// Drop an account's cached default so the next read reloads it.
    pub async fn invalidate_default(&self, owner: &BareJid) {
        self.default.write().await.remove(owner);
    }

    /// Record that a session asked for the Blocking view of its list.
    pub async fn add_block_list_user(&self, session: &FullJid) {
        self.block_list_users.write().await.insert(session.clone());
    }

    pub async fn is_block_list_user(&self, session: &FullJid) -> bool {
        self.block_list_users.read().await.contains(session)
    }

    /// Connection teardown: drop the active binding and the block-list-user
    /// marker of the departing session. Defaults stay cached.
    pub async fn evict_session(&self, session: &FullJid) {
        let removed = self.active.write().await.remove(session).is_some();
        let was_user = self.block_list_users.write().await.remove(session);
        if removed || was_user {
            debug!(session = %session, "session state evicted");
        }
    }

    /// Number of bound active lists (introspection).
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }
}

/// Shared cache handle.
pub type SharedListCache = Arc<ListCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrivacyItem;

    fn session(s: &str) -> FullJid {
        FullJid::new(s).unwrap()
    }

    fn list(name: &str) -> Arc<PrivacyList> {
        Arc::new(PrivacyList::new(name, vec![PrivacyItem::blocking(1, "x@s")]))
    }

    #[tokio::test]
    async fn test_active_binding_lifecycle() {
        let cache = ListCache::new();
        let r1 = session("a@s/r1");

        assert!(cache.get_active(&r1).await.is_none());

        cache.set_active(&r1, Some(list("work"))).await;
        assert_eq!(cache.active_name(&r1).await.as_deref(), Some("work"));
        assert!(cache.is_cached_with_name(&r1, "work").await);
        assert!(!cache.is_cached_with_name(&r1, "home").await);

        cache.set_active(&r1, None).await;
        assert!(cache.get_active(&r1).await.is_none());
    }

    #[tokio::test]
    async fn test_active_scan_by_name() {
        let cache = ListCache::new();
        let owner = BareJid::new("a@s").unwrap();
        cache.set_active(&session("a@s/r1"), Some(list("work"))).await;
        cache.set_active(&session("a@s/r2"), Some(list("home"))).await;
        cache.set_active(&session("b@s/r1"), Some(list("work"))).await;

        let sessions = cache.sessions_with_active_name(&owner, "work").await;
        assert_eq!(sessions, vec![session("a@s/r1")]);
    }

    #[tokio::test]
    async fn test_default_negative_sentinel() {
        let cache = ListCache::new();
        let owner = BareJid::new("a@s").unwrap();

        // Not cached at all
        assert!(cache.get_default(&owner).await.is_none());

        // Cached negative
        cache.set_default(&owner, None).await;
        assert_eq!(cache.get_default(&owner).await, Some(None));

        // Cached positive
        cache.set_default(&owner, Some(list("everyone"))).await;
        let slot = cache.get_default(&owner).await.unwrap().unwrap();
        assert_eq!(slot.name, "everyone");

        cache.invalidate_default(&owner).await;
        assert!(cache.get_default(&owner).await.is_none());
    }

    #[tokio::test]
    async fn test_eviction_drops_session_state_only() {
        let cache = ListCache::new();
        let owner = BareJid::new("a@s").unwrap();
        let r1 = session("a@s/r1");

        cache.set_active(&r1, Some(list("work"))).await;
        cache.add_block_list_user(&r1).await;
        cache.set_default(&owner, Some(list("everyone"))).await;

        cache.evict_session(&r1).await;

        assert!(cache.get_active(&r1).await.is_none());
        assert!(!cache.is_block_list_user(&r1).await);
        // The account default outlives the session.
        assert!(cache.get_default(&owner).await.unwrap().is_some());
    }
}
