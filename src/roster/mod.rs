//! Roster store contract.
//!
//! The roster lives in the host server; the match engine and the presence
//! emitter reach it through [`RosterSource`]. Lookups are suspension
//! points: a backend may answer from memory in the same poll or hit
//! storage. On failure the callers treat the roster as empty, so
//! `subscription = none` still matches unknown counterparties and group
//! predicates never match.

mod memory;

pub use memory::MemoryRoster;

use std::sync::Arc;

use async_trait::async_trait;
use jid::BareJid;
use thiserror::Error;

/// Roster backend failure.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("roster backend unavailable: {0}")]
    Unavailable(String),
}

/// Subscription state of a roster entry. Matching reads only the `to` and
/// `from` bits; the pending bits are masked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    /// We are subscribed to the contact's presence
    pub to: bool,
    /// The contact is subscribed to ours
    pub from: bool,
    /// Inbound subscription request pending
    pub pending_in: bool,
    /// Outbound subscription request pending
    pub pending_out: bool,
}

impl SubscriptionState {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to() -> Self {
        Self {
            to: true,
            ..Self::default()
        }
    }

    pub fn from() -> Self {
        Self {
            from: true,
            ..Self::default()
        }
    }

    pub fn both() -> Self {
        Self {
            to: true,
            from: true,
            ..Self::default()
        }
    }

    /// The to/from bits with pending state masked away.
    pub fn bits(&self) -> (bool, bool) {
        (self.to, self.from)
    }
}

/// One contact of a user's roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterItem {
    pub jid: BareJid,
    pub name: Option<String>,
    pub subscription: SubscriptionState,
    pub groups: Vec<String>,
}

impl RosterItem {
    pub fn new(jid: BareJid, subscription: SubscriptionState) -> Self {
        Self {
            jid,
            name: None,
            subscription,
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: &[&str]) -> Self {
        self.groups = groups.iter().map(|g| g.to_string()).collect();
        self
    }

    /// Contact whose presence the owner receives (`to` or `both`).
    pub fn is_to_item(&self) -> bool {
        self.subscription.to
    }

    /// Contact who receives the owner's presence (`from` or `both`).
    pub fn is_from_item(&self) -> bool {
        self.subscription.from
    }
}

/// Read access to the host's roster store.
#[async_trait]
pub trait RosterSource: Send + Sync {
    /// Look up one contact of `owner`'s roster.
    async fn get(
        &self,
        owner: &BareJid,
        other: &BareJid,
    ) -> Result<Option<RosterItem>, RosterError>;

    /// Enumerate `owner`'s roster.
    async fn items(&self, owner: &BareJid) -> Result<Vec<RosterItem>, RosterError>;
}

/// Shared roster source.
pub type SharedRoster = Arc<dyn RosterSource>;
