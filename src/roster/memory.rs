//! In-memory roster source.
//!
//! Backs development setups and the test suite; the host server supplies
//! the production implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use jid::BareJid;
use tokio::sync::RwLock;

use super::{RosterError, RosterItem, RosterSource};

/// Volatile roster keyed by owner.
#[derive(Default)]
pub struct MemoryRoster {
    entries: RwLock<HashMap<BareJid, Vec<RosterItem>>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a contact of `owner`'s roster.
    pub async fn put(&self, owner: &BareJid, item: RosterItem) {
        let mut entries = self.entries.write().await;
        let roster = entries.entry(owner.clone()).or_default();
        roster.retain(|existing| existing.jid != item.jid);
        roster.push(item);
    }
}

#[async_trait]
impl RosterSource for MemoryRoster {
    async fn get(
        &self,
        owner: &BareJid,
        other: &BareJid,
    ) -> Result<Option<RosterItem>, RosterError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(owner)
            .and_then(|roster| roster.iter().find(|item| &item.jid == other))
            .cloned())
    }

    async fn items(&self, owner: &BareJid) -> Result<Vec<RosterItem>, RosterError> {
        let entries = self.entries.read().await;
        Ok(entries.get(owner).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::SubscriptionState;

    #[tokio::test]
    async fn test_put_and_get() {
        let roster = MemoryRoster::new();
        let owner = BareJid::new("romeo@example.com").unwrap();
        let contact = BareJid::new("juliet@example.com").unwrap();

        roster
            .put(
                &owner,
                RosterItem::new(contact.clone(), SubscriptionState::both())
                    .with_groups(&["Friends"]),
            )
            .await;

        let item = roster.get(&owner, &contact).await.unwrap().unwrap();
        assert_eq!(item.groups, vec!["Friends"]);

        let absent = BareJid::new("nobody@example.com").unwrap();
        assert!(roster.get(&owner, &absent).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let roster = MemoryRoster::new();
        let owner = BareJid::new("romeo@example.com").unwrap();
        let contact = BareJid::new("juliet@example.com").unwrap();

        roster
            .put(&owner, RosterItem::new(contact.clone(), SubscriptionState::to()))
            .await;
        roster
            .put(&owner, RosterItem::new(contact.clone(), SubscriptionState::both()))
            .await;

        let items = roster.items(&owner).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].is_from_item());
    }
}
