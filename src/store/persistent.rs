//! Persistent list storage using fjall (pure Rust LSM-tree).
//!
//! Durable storage for production use; lists survive restarts. One
//! partition holds the list records, a second indexes each owner's default
//! list name for O(1) default resolution.

use std::path::Path;

use async_trait::async_trait;
use jid::BareJid;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};

use super::{ListStore, StoreError};
use crate::model::{PrivacyItem, PrivacyList};

/// Byte separating owner and list name in record keys. JIDs cannot
/// contain NUL.
const KEY_SEP: u8 = 0;

/// Serialised list record.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedList {
    name: String,
    #[serde(default)]
    default: bool,
    items: Vec<PrivacyItem>,
}

impl From<&PrivacyList> for PersistedList {
    fn from(list: &PrivacyList) -> Self {
        Self {
            name: list.name.clone(),
            default: list.is_default,
            items: list.items.clone(),
        }
    }
}

impl From<PersistedList> for PrivacyList {
    fn from(record: PersistedList) -> Self {
        let mut list = PrivacyList::new(&record.name, record.items);
        list.is_default = record.default;
        list
    }
}

/// fjall-backed list store.
pub struct FjallListStore {
    keyspace: Keyspace,
    lists: PartitionHandle,
    defaults: PartitionHandle,
}

impl FjallListStore {
    /// Open or create the keyspace at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Backend(e.to_string()))?;

        let keyspace = Config::new(path).open().map_err(backend)?;
        let lists = keyspace
            .open_partition("lists", PartitionCreateOptions::default())
            .map_err(backend)?;
        let defaults = keyspace
            .open_partition("defaults", PartitionCreateOptions::default())
            .map_err(backend)?;

        tracing::info!(path = %path.display(), "privacy list storage opened");

        Ok(Self {
            keyspace,
            lists,
            defaults,
        })
    }

    /// Flush everything to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.keyspace
            .persist(fjall::PersistMode::SyncAll)
            .map_err(backend)
    }

    fn list_key(owner: &BareJid, name: &str) -> Vec<u8> {
        let owner = owner.to_string();
        let mut key = Vec::with_capacity(owner.len() + 1 + name.len());
        key.extend_from_slice(owner.as_bytes());
        key.push(KEY_SEP);
        key.extend_from_slice(name.as_bytes());
        key
    }

    fn owner_prefix(owner: &BareJid) -> Vec<u8> {
        let owner = owner.to_string();
        let mut prefix = Vec::with_capacity(owner.len() + 1);
        prefix.extend_from_slice(owner.as_bytes());
        prefix.push(KEY_SEP);
        prefix
    }

    fn read_record(bytes: &[u8]) -> Result<PrivacyList, StoreError> {
        let record: PersistedList =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(record.into())
    }

    fn write_record(&self, owner: &BareJid, list: &PrivacyList) -> Result<(), StoreError> {
        let value =
            serde_json::to_vec(&PersistedList::from(list)).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.lists
            .insert(Self::list_key(owner, &list.name), value)
            .map_err(backend)
    }

    fn default_name(&self, owner: &BareJid) -> Result<Option<String>, StoreError> {
        let value = self.defaults.get(owner.to_string().as_bytes()).map_err(backend)?;
        Ok(value.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn backend(error: fjall::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

#[async_trait]
impl ListStore for FjallListStore {
    async fn list_all(&self, owner: &BareJid) -> Result<Vec<PrivacyList>, StoreError> {
        let mut all = Vec::new();
        for entry in self.lists.prefix(Self::owner_prefix(owner)) {
            let (_, value) = entry.map_err(backend)?;
            all.push(Self::read_record(&value)?);
        }
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn load(&self, owner: &BareJid, name: &str) -> Result<Option<PrivacyList>, StoreError> {
        let value = self.lists.get(Self::list_key(owner, name)).map_err(backend)?;
        value.map(|bytes| Self::read_record(&bytes)).transpose()
    }

    async fn load_default(&self, owner: &BareJid) -> Result<Option<PrivacyList>, StoreError> {
        match self.default_name(owner)? {
            Some(name) => self.load(owner, &name).await,
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        owner: &BareJid,
        list: PrivacyList,
    ) -> Result<Option<PrivacyList>, StoreError> {
        let owner_key = owner.to_string();

        if list.is_empty() {
            self.lists
                .remove(Self::list_key(owner, &list.name))
                .map_err(backend)?;
            if self.default_name(owner)?.as_deref() == Some(&list.name) {
                self.defaults.remove(owner_key.as_bytes()).map_err(backend)?;
            }
            debug!(owner = %owner, list = %list.name, "list removed");
            return Ok(None);
        }

        let previous_default = self.default_name(owner)?;

        if list.is_default {
            // Clear the flag on the list that held it before.
            if let Some(previous) = previous_default.filter(|name| name != &list.name) {
                if let Some(mut old) = self.load(owner, &previous).await? {
                    old.is_default = false;
                    self.write_record(owner, &old)?;
                }
            }
            self.defaults
                .insert(owner_key.as_bytes(), list.name.as_bytes())
                .map_err(backend)?;
        } else if previous_default.as_deref() == Some(&list.name) {
            self.defaults.remove(owner_key.as_bytes()).map_err(backend)?;
        }

        self.write_record(owner, &list)?;
        debug!(
            owner = %owner,
            list = %list.name,
            items = list.items.len(),
            default = list.is_default,
            "list stored"
        );
        Ok(Some(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrivacyItem;
    use tempfile::TempDir;

    fn owner() -> BareJid {
        BareJid::new("romeo@example.com").unwrap()
    }

    fn list(name: &str) -> PrivacyList {
        PrivacyList::new(name, vec![PrivacyItem::blocking(1, "x@s")])
    }

    fn create_test_store() -> (FjallListStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallListStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let (store, _temp) = create_test_store();

        store.store(&owner(), list("work")).await.unwrap();
        let loaded = store.load(&owner(), "work").await.unwrap().unwrap();
        assert_eq!(loaded.name, "work");
        assert_eq!(loaded.items.len(), 1);
    }

    #[tokio::test]
    async fn test_owner_isolation() {
        let (store, _temp) = create_test_store();
        let other = BareJid::new("juliet@example.com").unwrap();

        store.store(&owner(), list("work")).await.unwrap();
        assert!(store.load(&other, "work").await.unwrap().is_none());
        assert!(store.list_all(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_index() {
        let (store, _temp) = create_test_store();

        store
            .store(&owner(), list("a").with_default(true))
            .await
            .unwrap();
        assert_eq!(
            store.load_default(&owner()).await.unwrap().unwrap().name,
            "a"
        );

        // Moving the flag clears it on the old record.
        store
            .store(&owner(), list("b").with_default(true))
            .await
            .unwrap();
        assert_eq!(
            store.load_default(&owner()).await.unwrap().unwrap().name,
            "b"
        );
        assert!(!store.load(&owner(), "a").await.unwrap().unwrap().is_default);

        // Storing without the flag detaches.
        store
            .store(&owner(), list("b").with_default(false))
            .await
            .unwrap();
        assert!(store.load_default(&owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removal_clears_default_index() {
        let (store, _temp) = create_test_store();
        store
            .store(&owner(), list("work").with_default(true))
            .await
            .unwrap();

        let removed = store
            .store(&owner(), PrivacyList::tombstone("work"))
            .await
            .unwrap();
        assert!(removed.is_none());
        assert!(store.load(&owner(), "work").await.unwrap().is_none());
        assert!(store.load_default(&owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_restarts() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = FjallListStore::open(temp_dir.path()).unwrap();
            store
                .store(&owner(), list("durable").with_default(true))
                .await
                .unwrap();
            store.flush().unwrap();
        }

        {
            let store = FjallListStore::open(temp_dir.path()).unwrap();
            let loaded = store.load_default(&owner()).await.unwrap().unwrap();
            assert_eq!(loaded.name, "durable");
            // Items come back sorted.
            assert_eq!(loaded.min_order(), Some(1));
        }
    }
}
