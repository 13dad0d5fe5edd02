//! Persistent list storage.
//!
//! Durable home of named privacy lists, keyed by owner bare JID. The
//! running server treats the cache as authoritative; the store is written
//! through on mutation and read lazily on first use, so a write failure
//! degrades durability but never the session's view.
//!
//! # Implementations
//!
//! - [`MemoryListStore`]: development and testing (default)
//! - [`FjallListStore`]: durable fjall LSM-tree storage
//!
//! Storing a list with an empty item sequence removes it. At most one list
//! per owner carries the default flag; storing a defaulted list clears the
//! flag on the previous default, storing it with the flag cleared detaches
//! it. Transient lists are never handed to a store.

mod memory;
mod persistent;

pub use memory::MemoryListStore;
pub use persistent::FjallListStore;

use std::sync::Arc;

use async_trait::async_trait;
use jid::BareJid;
use thiserror::Error;

use crate::config::StorageConfig;
use crate::model::PrivacyList;

/// List storage failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("corrupt list record: {0}")]
    Corrupt(String),
}

/// Storage backend for named privacy lists.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// All lists owned by `owner`, sorted by name.
    async fn list_all(&self, owner: &BareJid) -> Result<Vec<PrivacyList>, StoreError>;

    /// Load one named list.
    async fn load(&self, owner: &BareJid, name: &str) -> Result<Option<PrivacyList>, StoreError>;

    /// Load the list carrying the default flag.
    async fn load_default(&self, owner: &BareJid) -> Result<Option<PrivacyList>, StoreError>;

    /// Store a list; empty items remove it. Returns the stored list, or
    /// `None` when the call was a removal.
    async fn store(
        &self,
        owner: &BareJid,
        list: PrivacyList,
    ) -> Result<Option<PrivacyList>, StoreError>;
}

/// Shared list store.
pub type SharedListStore = Arc<dyn ListStore>;

/// Build the store selected by the configuration.
pub fn from_config(config: &StorageConfig) -> Result<SharedListStore, StoreError> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryListStore::new())),
        StorageConfig::Fjall { path } => Ok(Arc::new(FjallListStore::open(path)?)),
    }
}
