//! Host server capability contracts.
//!
//! The privacy core never holds a reference to the host server itself; it
//! is handed two narrow capabilities at construction:
//! - [`SessionDirectory`]: enumerate an account's bound sessions
//! - [`StanzaSink`]: the network write path
//!
//! Both are `Arc<dyn …>` handles, so the host stays free to wire them to
//! whatever session bookkeeping and delivery machinery it runs.

mod mock;

pub use mock::MockHost;

use std::sync::Arc;

use async_trait::async_trait;
use jid::{BareJid, FullJid};

use crate::stanza::Stanza;

/// One bound session of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub jid: FullJid,
    /// Has the session sent initial presence?
    pub available: bool,
}

impl SessionInfo {
    pub fn new(jid: FullJid, available: bool) -> Self {
        Self { jid, available }
    }
}

/// Session discovery.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Sessions currently bound for `owner`.
    async fn sessions_of(&self, owner: &BareJid) -> Vec<SessionInfo>;
}

/// Network write path. Returns whether the stanza was accepted for
/// delivery; the core logs and moves on when it was not.
#[async_trait]
pub trait StanzaSink: Send + Sync {
    async fn send(&self, stanza: Stanza) -> bool;
}

/// Shared session directory handle.
pub type SharedSessions = Arc<dyn SessionDirectory>;

/// Shared write-path handle.
pub type SharedSink = Arc<dyn StanzaSink>;
