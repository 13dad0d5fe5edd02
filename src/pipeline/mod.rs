//! Host pipeline integration.
//!
//! One [`PrivacyModule`] per virtual host, owning the effective-list cache
//! and the capability handles into the host. The host wires its pipeline
//! to the four hook methods:
//!
//! ```text
//! client ──> [ incoming_client ] ──> routing ──> [ deliver ] ──> recipient
//!                    │                               │
//!              admin IQs to                   two-pass match
//!              command handlers          (recipient in, sender out)
//!                    │
//! client <── [ pre_stanza_write ] <── session write queue
//! ```
//!
//! The deliver hook must run before any other delivery handler; its
//! registration carries the lowest priority value.

use std::sync::Arc;

use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use tracing::{debug, info, warn};

use crate::cache::{ListCache, SharedListCache};
use crate::commands;
use crate::config::PrivacyConfig;
use crate::emitter::Emitter;
use crate::host::{SharedSessions, SharedSink, StanzaSink};
use crate::matcher::{evaluate, transit_check, Denial, Verdict};
use crate::model::PrivacyList;
use crate::roster::SharedRoster;
use crate::stanza::{Direction, Stanza, StanzaError, StanzaKind, StanzaOrigin};
use crate::store::{ListStore, SharedListStore};

/// Hook points the host pipeline must offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Stanza read from a bound client connection
    IncomingClient,
    /// Stanza about to be written to a client connection
    PreStanzaWrite,
    /// Stanza being delivered between two endpoints
    Deliver,
    /// Client connection tearing down
    ConnectionClosing,
}

/// Priority for the deliver registration; protocol precedence requires the
/// privacy check to run before every other delivery handler.
pub const DELIVER_PRIORITY: i32 = i32::MIN;

/// Hook registrations the host must perform (point, priority; lower runs
/// first).
pub const REGISTRATIONS: &[(HookPoint, i32)] = &[
    (HookPoint::IncomingClient, 0),
    (HookPoint::PreStanzaWrite, 0),
    (HookPoint::Deliver, DELIVER_PRIORITY),
    (HookPoint::ConnectionClosing, 0),
];

/// What a filtering hook decided.
#[derive(Debug)]
pub enum HookOutcome {
    /// Not ours; the pipeline continues
    Pass,
    /// Consumed (admin command); the pipeline stops, a reply was sent
    Handled,
    /// Denied; the pipeline drops the stanza. The denial response, if the
    /// policy calls for one, has already been emitted.
    Deny(Denial),
}

/// The privacy core of one virtual host.
pub struct PrivacyModule {
    pub(crate) config: PrivacyConfig,
    pub(crate) cache: SharedListCache,
    pub(crate) store: SharedListStore,
    pub(crate) roster: SharedRoster,
    pub(crate) sessions: SharedSessions,
    pub(crate) sink: SharedSink,
    pub(crate) emitter: Emitter,
}

impl PrivacyModule {
    pub fn new(
        config: PrivacyConfig,
        store: SharedListStore,
        roster: SharedRoster,
        sessions: SharedSessions,
        sink: SharedSink,
    ) -> Self {
        let cache: SharedListCache = Arc::new(ListCache::new());
        let emitter = Emitter::new(
            sink.clone(),
            sessions.clone(),
            roster.clone(),
            cache.clone(),
        );
        info!(enabled = config.enabled, "privacy module initialised");
        Self {
            config,
            cache,
            store,
            roster,
            sessions,
            sink,
            emitter,
        }
    }

    /// The cache, for host introspection.
    pub fn cache(&self) -> &SharedListCache {
        &self.cache
    }

    /// Features the host should advertise for this subsystem.
    pub fn features() -> &'static [&'static str] {
        crate::ns::SERVER_FEATURES
    }

    // -------------------------------------------------------------------------
    // Hook points
    // -------------------------------------------------------------------------

    /// Ingress from a client connection.
    ///
    /// Admin IQs without a `to` attribute are routed to the command
    /// handlers; any other stanza with a `to` is checked against the
    /// recipient's effective list. A deny drops the stanza here.
    pub async fn handle_incoming_client(&self, session: &FullJid, stanza: &Stanza) -> HookOutcome {
        if !self.config.enabled {
            return HookOutcome::Pass;
        }

        if stanza.kind == StanzaKind::Iq && stanza.to.is_none() {
            if commands::dispatch(self, session, stanza).await {
                return HookOutcome::Handled;
            }
            return HookOutcome::Pass;
        }

        let Some(recipient) = stanza.to.clone() else {
            return HookOutcome::Pass;
        };
        let Some(list) = self.effective_list(&recipient).await else {
            return HookOutcome::Pass;
        };
        let sender = stanza
            .from
            .clone()
            .unwrap_or_else(|| Jid::from(session.clone()));

        match evaluate(&list, stanza, Direction::In, &recipient, &sender, self.roster.as_ref()).await
        {
            Verdict::Allow => HookOutcome::Pass,
            Verdict::Deny => {
                let denial = Denial {
                    owner: recipient,
                    direction: Direction::In,
                };
                self.emitter.deny_response(stanza, &denial).await;
                HookOutcome::Deny(denial)
            }
        }
    }

    /// Egress, immediately before a stanza is written to a client
    /// connection: the sender's effective list is applied outbound.
    pub async fn handle_pre_write(&self, stanza: &Stanza) -> HookOutcome {
        if !self.config.enabled {
            return HookOutcome::Pass;
        }
        if stanza.origin != StanzaOrigin::Client {
            return HookOutcome::Pass;
        }
        let (Some(sender), Some(recipient)) = (stanza.from.clone(), stanza.to.clone()) else {
            return HookOutcome::Pass;
        };
        let Some(list) = self.effective_list(&sender).await else {
            return HookOutcome::Pass;
        };

        match evaluate(&list, stanza, Direction::Out, &sender, &recipient, self.roster.as_ref())
            .await
        {
            Verdict::Allow => HookOutcome::Pass,
            Verdict::Deny => {
                let denial = Denial {
                    owner: sender,
                    direction: Direction::Out,
                };
                self.emitter.deny_response(stanza, &denial).await;
                HookOutcome::Deny(denial)
            }
        }
    }

    /// Delivery between two endpoints: recipient's list inbound first,
    /// then the sender's outbound.
    pub async fn handle_deliver(&self, stanza: &Stanza) -> HookOutcome {
        if !self.config.enabled {
            return HookOutcome::Pass;
        }
        let (Some(sender), Some(recipient)) = (stanza.from.clone(), stanza.to.clone()) else {
            return HookOutcome::Pass;
        };

        let recipient_list = self.effective_list(&recipient).await;
        let sender_list = self.effective_list(&sender).await;

        let denial = transit_check(
            stanza,
            recipient_list.as_deref().map(|list| (&recipient, list)),
            sender_list.as_deref().map(|list| (&sender, list)),
            self.roster.as_ref(),
        )
        .await;

        match denial {
            None => HookOutcome::Pass,
            Some(denial) => {
                self.emitter.deny_response(stanza, &denial).await;
                HookOutcome::Deny(denial)
            }
        }
    }

    /// Connection teardown: drop the session's cache state.
    pub async fn handle_connection_closed(&self, session: &FullJid) {
        self.cache.evict_session(session).await;
    }

    // -------------------------------------------------------------------------
    // Shared lookups and replies
    // -------------------------------------------------------------------------

    /// The list in effect for `owner`: the session's active binding when
    /// `owner` is a full JID, else the account default (lazily loaded,
    /// negative-cached).
    pub(crate) async fn effective_list(&self, owner: &Jid) -> Option<Arc<PrivacyList>> {
        if let Ok(full) = FullJid::try_from(owner.clone()) {
            if let Some(list) = self.cache.get_active(&full).await {
                return Some(list);
            }
        }
        self.default_list(&owner.to_bare()).await
    }

    /// The account default, from the cache or lazily from the store.
    pub(crate) async fn default_list(&self, owner: &BareJid) -> Option<Arc<PrivacyList>> {
        if let Some(slot) = self.cache.get_default(owner).await {
            return slot;
        }
        match self.store.load_default(owner).await {
            Ok(loaded) => {
                let list = loaded.map(Arc::new);
                self.cache.set_default(owner, list.clone()).await;
                list
            }
            Err(error) => {
                // Not cached: the next read retries the store.
                warn!(owner = %owner, %error, "default list load failed");
                None
            }
        }
    }

    pub(crate) async fn send_result(
        &self,
        request: &Stanza,
        session: &FullJid,
        payload: Option<Element>,
    ) {
        self.sink
            .send(Stanza::reply_result(request, session, payload))
            .await;
    }

    pub(crate) async fn send_error(
        &self,
        request: &Stanza,
        session: &FullJid,
        error: StanzaError,
    ) {
        debug!(session = %session, condition = ?error.condition, "admin command rejected");
        self.sink
            .send(Stanza::reply_error(request, session, &error))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHost;
    use crate::model::PrivacyItem;
    use crate::roster::MemoryRoster;
    use crate::store::{ListStore, MemoryListStore};

    fn jid(s: &str) -> Jid {
        Jid::new(s).unwrap()
    }

    struct Fixture {
        host: Arc<MockHost>,
        store: Arc<MemoryListStore>,
        module: PrivacyModule,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MockHost::new());
        let store = Arc::new(MemoryListStore::new());
        let roster = Arc::new(MemoryRoster::new());
        let module = PrivacyModule::new(
            PrivacyConfig::default(),
            store.clone(),
            roster,
            host.clone(),
            host.clone(),
        );
        Fixture {
            host,
            store,
            module,
        }
    }

    fn deny_b_list() -> PrivacyList {
        PrivacyList::new("deny-b", vec![PrivacyItem::blocking(1, "b@s")]).with_default(true)
    }

    #[tokio::test]
    async fn test_deliver_denies_by_recipient_default() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        f.store.store(&owner, deny_b_list()).await.unwrap();

        let msg = Stanza::message(jid("b@s/h"), jid("a@s"), None);
        let outcome = f.module.handle_deliver(&msg).await;
        assert!(matches!(outcome, HookOutcome::Deny(_)));

        // The denial error went back to the sender.
        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, Some(jid("b@s/h")));
        assert_eq!(sent[0].stype.as_deref(), Some("error"));
    }

    #[tokio::test]
    async fn test_deliver_passes_unrelated_traffic() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        f.store.store(&owner, deny_b_list()).await.unwrap();

        let msg = Stanza::message(jid("c@s"), jid("a@s"), None);
        assert!(matches!(f.module.handle_deliver(&msg).await, HookOutcome::Pass));
        assert_eq!(f.host.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_active_list_overrides_default() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        let session = FullJid::new("a@s/r1").unwrap();
        f.store.store(&owner, deny_b_list()).await.unwrap();

        // Active list without the deny item.
        let open = Arc::new(PrivacyList::new("open", vec![]));
        f.module.cache.set_active(&session, Some(open)).await;

        let msg = Stanza::message(jid("b@s/h"), jid("a@s/r1"), None);
        assert!(matches!(f.module.handle_deliver(&msg).await, HookOutcome::Pass));
    }

    #[tokio::test]
    async fn test_negative_default_is_cached() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();

        assert!(f.module.default_list(&owner).await.is_none());
        // Second read hits the sentinel, not the store.
        assert_eq!(f.module.cache.get_default(&owner).await, Some(None));
    }

    #[tokio::test]
    async fn test_incoming_client_routes_admin_iq() {
        let f = fixture();
        let session = FullJid::new("a@s/r1").unwrap();
        let query = Element::builder("query", crate::ns::PRIVACY).build();
        let iq = Stanza::iq_get(Some(jid("a@s/r1")), None, "q1", query).from_client();

        let outcome = f.module.handle_incoming_client(&session, &iq).await;
        assert!(matches!(outcome, HookOutcome::Handled));

        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].stype.as_deref(), Some("result"));
    }

    #[tokio::test]
    async fn test_incoming_client_passes_foreign_iq() {
        let f = fixture();
        let session = FullJid::new("a@s/r1").unwrap();
        let ping = Element::builder("ping", "urn:xmpp:ping").build();
        let iq = Stanza::iq_get(Some(jid("a@s/r1")), None, "p1", ping).from_client();

        assert!(matches!(
            f.module.handle_incoming_client(&session, &iq).await,
            HookOutcome::Pass
        ));
    }

    #[tokio::test]
    async fn test_pre_write_applies_sender_list_outbound() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        f.store.store(&owner, deny_b_list()).await.unwrap();

        let msg = Stanza::message(jid("a@s/r1"), jid("b@s"), None).from_client();
        let outcome = f.module.handle_pre_write(&msg).await;
        let HookOutcome::Deny(denial) = outcome else {
            panic!("expected deny");
        };
        assert_eq!(denial.direction, Direction::Out);

        // Sender's own list denied a message: blocked marker present.
        let sent = f.host.take_sent().await;
        let error = sent[0].payload.as_ref().unwrap();
        assert!(error.has_child("blocked", crate::ns::BLOCKING_ERRORS));
    }

    #[tokio::test]
    async fn test_disabled_module_passes_everything() {
        let host = Arc::new(MockHost::new());
        let store = Arc::new(MemoryListStore::new());
        let owner = BareJid::new("a@s").unwrap();

        let module = PrivacyModule::new(
            PrivacyConfig {
                enabled: false,
                ..PrivacyConfig::default()
            },
            store.clone(),
            Arc::new(MemoryRoster::new()),
            host.clone(),
            host.clone(),
        );
        store.store(&owner, deny_b_list()).await.unwrap();

        let msg = Stanza::message(jid("b@s/h"), jid("a@s"), None);
        assert!(matches!(module.handle_deliver(&msg).await, HookOutcome::Pass));
    }

    #[tokio::test]
    async fn test_teardown_evicts_session_state() {
        let f = fixture();
        let session = FullJid::new("a@s/r1").unwrap();
        let open = Arc::new(PrivacyList::new("open", vec![]));
        f.module.cache.set_active(&session, Some(open)).await;
        f.module.cache.add_block_list_user(&session).await;

        f.module.handle_connection_closed(&session).await;

        assert!(f.module.cache.get_active(&session).await.is_none());
        assert!(!f.module.cache.is_block_list_user(&session).await);
    }

    #[test]
    fn test_deliver_registration_precedes_everything() {
        let deliver = REGISTRATIONS
            .iter()
            .find(|(point, _)| *point == HookPoint::Deliver)
            .unwrap();
        assert_eq!(deliver.1, i32::MIN);
        assert!(REGISTRATIONS
            .iter()
            .all(|(point, priority)| *point == HookPoint::Deliver || *priority > DELIVER_PRIORITY));
    }
}
