//! In-memory list storage.
//!
//! Volatile storage for development and testing. All data is lost on
//! restart.

use std::collections::HashMap;

use async_trait::async_trait;
use jid::BareJid;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ListStore, StoreError};
use crate::model::PrivacyList;

/// Volatile list store.
#[derive(Default)]
pub struct MemoryListStore {
    lists: RwLock<HashMap<BareJid, HashMap<String, PrivacyList>>>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn list_all(&self, owner: &BareJid) -> Result<Vec<PrivacyList>, StoreError> {
        let lists = self.lists.read().await;
        let mut all: Vec<PrivacyList> = lists
            .get(owner)
            .map(|owned| owned.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn load(&self, owner: &BareJid, name: &str) -> Result<Option<PrivacyList>, StoreError> {
        let lists = self.lists.read().await;
        Ok(lists.get(owner).and_then(|owned| owned.get(name)).cloned())
    }

    async fn load_default(&self, owner: &BareJid) -> Result<Option<PrivacyList>, StoreError> {
        let lists = self.lists.read().await;
        Ok(lists
            .get(owner)
            .and_then(|owned| owned.values().find(|list| list.is_default))
            .cloned())
    }

    async fn store(
        &self,
        owner: &BareJid,
        list: PrivacyList,
    ) -> Result<Option<PrivacyList>, StoreError> {
        let mut lists = self.lists.write().await;
        let owned = lists.entry(owner.clone()).or_default();

        if list.is_empty() {
            owned.remove(&list.name);
            debug!(owner = %owner, list = %list.name, "list removed");
            return Ok(None);
        }

        if list.is_default {
            for other in owned.values_mut() {
                if other.name != list.name {
                    other.is_default = false;
                }
            }
        }

        debug!(
            owner = %owner,
            list = %list.name,
            items = list.items.len(),
            default = list.is_default,
            "list stored"
        );
        owned.insert(list.name.clone(), list.clone());
        Ok(Some(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrivacyItem;

    fn owner() -> BareJid {
        BareJid::new("romeo@example.com").unwrap()
    }

    fn list(name: &str) -> PrivacyList {
        PrivacyList::new(name, vec![PrivacyItem::blocking(1, "x@s")])
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let store = MemoryListStore::new();
        store.store(&owner(), list("work")).await.unwrap();

        let loaded = store.load(&owner(), "work").await.unwrap().unwrap();
        assert_eq!(loaded.name, "work");
        assert!(store.load(&owner(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_items_remove() {
        let store = MemoryListStore::new();
        store.store(&owner(), list("work")).await.unwrap();

        let removed = store
            .store(&owner(), PrivacyList::tombstone("work"))
            .await
            .unwrap();
        assert!(removed.is_none());
        assert!(store.load(&owner(), "work").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_flag_exclusive() {
        let store = MemoryListStore::new();
        store
            .store(&owner(), list("a").with_default(true))
            .await
            .unwrap();
        store
            .store(&owner(), list("b").with_default(true))
            .await
            .unwrap();

        let default = store.load_default(&owner()).await.unwrap().unwrap();
        assert_eq!(default.name, "b");
        assert!(!store.load(&owner(), "a").await.unwrap().unwrap().is_default);
    }

    #[tokio::test]
    async fn test_default_detach() {
        let store = MemoryListStore::new();
        store
            .store(&owner(), list("a").with_default(true))
            .await
            .unwrap();
        store
            .store(&owner(), list("a").with_default(false))
            .await
            .unwrap();
        assert!(store.load_default(&owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_all_sorted() {
        let store = MemoryListStore::new();
        store.store(&owner(), list("zeta")).await.unwrap();
        store.store(&owner(), list("alpha")).await.unwrap();

        let names: Vec<String> = store
            .list_all(&owner())
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
