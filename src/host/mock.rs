//! Mock host for tests and examples.

use std::collections::HashMap;

use async_trait::async_trait;
use jid::{BareJid, FullJid};
use tokio::sync::Mutex;

use super::{SessionDirectory, SessionInfo, StanzaSink};
use crate::stanza::Stanza;

/// In-process host double: a configurable session table and a recording
/// write path.
#[derive(Default)]
pub struct MockHost {
    sessions: Mutex<HashMap<BareJid, Vec<SessionInfo>>>,
    sent: Mutex<Vec<Stanza>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bound session.
    pub async fn bind(&self, jid: &FullJid, available: bool) {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(jid.to_bare())
            .or_default()
            .push(SessionInfo::new(jid.clone(), available));
    }

    /// Remove a bound session.
    pub async fn unbind(&self, jid: &FullJid) {
        let mut sessions = self.sessions.lock().await;
        if let Some(bound) = sessions.get_mut(&jid.to_bare()) {
            bound.retain(|info| &info.jid != jid);
        }
    }

    /// Drain everything written to the sink so far.
    pub async fn take_sent(&self) -> Vec<Stanza> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl SessionDirectory for MockHost {
    async fn sessions_of(&self, owner: &BareJid) -> Vec<SessionInfo> {
        self.sessions
            .lock()
            .await
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl StanzaSink for MockHost {
    async fn send(&self, stanza: Stanza) -> bool {
        self.sent.lock().await.push(stanza);
        true
    }
}
