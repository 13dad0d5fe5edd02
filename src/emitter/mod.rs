//! Side effects of filtering and list mutation.
//!
//! Three families of emitted traffic:
//! - error responses (or silent drops) for denied stanzas
//! - synthesised presence after a list change, so visibility reflects the
//!   new rules without waiting for the next real presence
//! - list-change pushes to the owner's other sessions

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use jid::{BareJid, FullJid, Jid};
use minidom::Element;
use tracing::{debug, warn};

use crate::cache::SharedListCache;
use crate::host::{SessionDirectory, SharedSessions, SharedSink, StanzaSink};
use crate::matcher::Denial;
use crate::model::{Predicate, PrivacyList};
use crate::ns;
use crate::roster::{RosterItem, RosterSource, SharedRoster};
use crate::stanza::{Direction, IqType, Stanza, StanzaError, StanzaKind, StanzaOrigin};

/// Emits the traffic that follows a verdict or an admin mutation.
pub struct Emitter {
    sink: SharedSink,
    sessions: SharedSessions,
    roster: SharedRoster,
    cache: SharedListCache,
    push_seq: AtomicU64,
}

impl Emitter {
    pub fn new(
        sink: SharedSink,
        sessions: SharedSessions,
        roster: SharedRoster,
        cache: SharedListCache,
    ) -> Self {
        Self {
            sink,
            sessions,
            roster,
            cache,
            push_seq: AtomicU64::new(1),
        }
    }

    fn next_push_id(&self) -> String {
        format!("push-{}", self.push_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Respond to a denied stanza.
    ///
    /// Presence is dropped silently. Messages (except groupchat) and
    /// get/set IQs draw `service-unavailable`; a message denied by the
    /// sender's own list draws `not-acceptable` with the Blocking marker.
    /// Everything else is dropped.
    pub async fn deny_response(&self, stanza: &Stanza, denial: &Denial) {
        let error = match stanza.kind {
            StanzaKind::Presence => return,
            StanzaKind::Message => {
                if stanza.is_groupchat_message() {
                    return;
                }
                if denial.direction == Direction::Out {
                    StanzaError::not_acceptable_blocked()
                } else {
                    StanzaError::service_unavailable()
                }
            }
            StanzaKind::Iq => match stanza.iq_type() {
                Some(IqType::Get) | Some(IqType::Set) => StanzaError::service_unavailable(),
                _ => return,
            },
        };

        debug!(
            owner = %denial.owner,
            condition = ?error.condition,
            "stanza denied, replying with error"
        );
        if !self.sink.send(Stanza::denial_error(stanza, &error)).await {
            warn!(owner = %denial.owner, "error reply not accepted by write path");
        }
    }

    /// Push a list change to the owner's other sessions.
    ///
    /// Sessions that asked for the Blocking view receive the original
    /// Blocking IQ (when the mutation came through Blocking); everyone
    /// else receives a Privacy push carrying only the list name.
    pub async fn push_list_update(
        &self,
        owner: &BareJid,
        origin: &FullJid,
        list_name: &str,
        blocking_original: Option<&Stanza>,
    ) {
        for session in self.sessions.sessions_of(owner).await {
            if &session.jid == origin {
                continue;
            }
            let mut payload = None;
            if let Some(original) = blocking_original {
                if self.cache.is_block_list_user(&session.jid).await {
                    payload = original.payload.clone();
                }
            }
            let payload = payload.unwrap_or_else(|| {
                Element::builder("query", ns::PRIVACY)
                    .append(
                        Element::builder("list", ns::PRIVACY)
                            .attr("name", list_name)
                            .build(),
                    )
                    .build()
            });
            let push = Stanza {
                kind: StanzaKind::Iq,
                from: None,
                to: Some(Jid::from(session.jid.clone())),
                id: Some(self.next_push_id()),
                stype: Some("set".to_string()),
                origin: StanzaOrigin::Server,
                payload: Some(payload),
            };
            self.sink.send(push).await;
        }
    }

    /// Synthesise presence for the presence-denying items of a newly
    /// effective list.
    ///
    /// presence-in denies yield unavailable presence from each matching
    /// counterparty to the owner session; presence-out denies yield
    /// unavailable from the owner session to each matching counterparty.
    pub async fn regenerate_presence(&self, session: &FullJid, list: &PrivacyList) {
        let owner = session.to_bare();
        let roster = match self.roster.items(&owner).await {
            Ok(items) => items,
            Err(error) => {
                warn!(owner = %owner, %error, "roster walk failed, skipping presence regeneration");
                Vec::new()
            }
        };

        let mut seen: HashSet<(bool, String)> = HashSet::new();

        for item in &list.items {
            for outbound in [false, true] {
                if !item.denies_presence(outbound) {
                    continue;
                }
                for target in counterparties(item.predicate.clone(), &roster, outbound) {
                    if !seen.insert((outbound, target.clone())) {
                        continue;
                    }
                    let Ok(target) = Jid::new(&target) else {
                        continue;
                    };
                    let presence = if outbound {
                        Stanza::presence(
                            Some(Jid::from(session.clone())),
                            Some(target),
                            Some("unavailable"),
                        )
                    } else {
                        Stanza::presence(
                            Some(target),
                            Some(Jid::from(session.clone())),
                            Some("unavailable"),
                        )
                    };
                    self.sink.send(presence).await;
                }
            }
        }
    }

    /// Presence shift towards specific counterparties after a block or
    /// unblock: unavailable for new blocks, available for removed ones,
    /// from every available session of the owner.
    pub async fn presence_shift(&self, owner: &BareJid, targets: &[Jid], available: bool) {
        let stype = if available { None } else { Some("unavailable") };
        for session in self.sessions.sessions_of(owner).await {
            if !session.available {
                continue;
            }
            for target in targets {
                let presence = Stanza::presence(
                    Some(Jid::from(session.jid.clone())),
                    Some(target.clone()),
                    stype,
                );
                self.sink.send(presence).await;
            }
        }
    }

    /// Unavailable broadcast from a session that just went invisible: one
    /// unavailable presence towards every contact subscribed to the
    /// owner's presence.
    pub async fn broadcast_unavailable(&self, session: &FullJid) {
        let owner = session.to_bare();
        let roster = match self.roster.items(&owner).await {
            Ok(items) => items,
            Err(error) => {
                warn!(owner = %owner, %error, "roster walk failed, skipping unavailable broadcast");
                return;
            }
        };
        for contact in roster.iter().filter(|item| item.is_from_item()) {
            let presence = Stanza::presence(
                Some(Jid::from(session.clone())),
                Some(Jid::from(contact.jid.clone())),
                Some("unavailable"),
            );
            self.sink.send(presence).await;
        }
    }
}

/// Counterparties a presence-denying item applies to.
///
/// JID predicates name the literal value; group/subscription predicates and
/// catch-alls walk the owner's to-items (inbound) or from-items (outbound).
fn counterparties(
    predicate: Predicate,
    roster: &[RosterItem],
    outbound: bool,
) -> Vec<String> {
    let walk = || {
        roster
            .iter()
            .filter(|item| {
                if outbound {
                    item.is_from_item()
                } else {
                    item.is_to_item()
                }
            })
            .collect::<Vec<_>>()
    };

    match predicate {
        Predicate::Jid(value) => vec![value],
        Predicate::None => walk().into_iter().map(|item| item.jid.to_string()).collect(),
        Predicate::Group(group) => walk()
            .into_iter()
            .filter(|item| item.groups.iter().any(|g| g == &group))
            .map(|item| item.jid.to_string())
            .collect(),
        Predicate::Subscription(sub) => walk()
            .into_iter()
            .filter(|item| crate::matcher::subscription_matches(sub, Some(item)))
            .map(|item| item.jid.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ListCache;
    use crate::host::MockHost;
    use crate::model::{Action, PrivacyItem, StanzaMask};
    use crate::roster::{MemoryRoster, SubscriptionState};
    use std::sync::Arc;

    struct Fixture {
        host: Arc<MockHost>,
        roster: Arc<MemoryRoster>,
        cache: SharedListCache,
        emitter: Emitter,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(MockHost::new());
        let roster = Arc::new(MemoryRoster::new());
        let cache = Arc::new(ListCache::new());
        let emitter = Emitter::new(
            host.clone(),
            host.clone(),
            roster.clone(),
            cache.clone(),
        );
        Fixture {
            host,
            roster,
            cache,
            emitter,
        }
    }

    fn jid(s: &str) -> Jid {
        Jid::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_denied_presence_dropped_silently() {
        let f = fixture();
        let presence = Stanza::presence(Some(jid("b@s")), Some(jid("a@s")), None);
        let denial = Denial {
            owner: jid("a@s/r"),
            direction: Direction::In,
        };
        f.emitter.deny_response(&presence, &denial).await;
        assert_eq!(f.host.sent_count().await, 0);
    }

    // Scenario 1: inbound message denial draws service-unavailable.
    #[tokio::test]
    async fn test_denied_inbound_message_errors() {
        let f = fixture();
        let msg = Stanza::message(jid("b@s/h"), jid("a@s"), None);
        let denial = Denial {
            owner: jid("a@s/r"),
            direction: Direction::In,
        };
        f.emitter.deny_response(&msg, &denial).await;

        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 1);
        let reply = &sent[0];
        assert_eq!(reply.stype.as_deref(), Some("error"));
        assert_eq!(reply.to, Some(jid("b@s/h")));
        let error = reply.payload.as_ref().unwrap();
        assert!(error.has_child("service-unavailable", ns::STANZAS));
        assert!(!error.has_child("blocked", ns::BLOCKING_ERRORS));
    }

    #[tokio::test]
    async fn test_sender_list_denial_carries_blocked_marker() {
        let f = fixture();
        let msg = Stanza::message(jid("a@s/r"), jid("c@s"), None);
        let denial = Denial {
            owner: jid("a@s/r"),
            direction: Direction::Out,
        };
        f.emitter.deny_response(&msg, &denial).await;

        let sent = f.host.take_sent().await;
        let error = sent[0].payload.as_ref().unwrap();
        assert!(error.has_child("not-acceptable", ns::STANZAS));
        assert!(error.has_child("blocked", ns::BLOCKING_ERRORS));
    }

    #[tokio::test]
    async fn test_groupchat_and_result_iq_dropped() {
        let f = fixture();
        let denial = Denial {
            owner: jid("a@s/r"),
            direction: Direction::In,
        };

        let gc = Stanza::message(jid("room@muc.s/nick"), jid("a@s"), Some("groupchat"));
        f.emitter.deny_response(&gc, &denial).await;

        let mut result_iq = Stanza::iq_get(Some(jid("b@s/h")), Some(jid("a@s")), "1",
            Element::builder("query", "jabber:iq:version").build());
        result_iq.stype = Some("result".to_string());
        f.emitter.deny_response(&result_iq, &denial).await;

        assert_eq!(f.host.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_push_shapes_depend_on_block_list_view() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        let origin = FullJid::new("a@s/r1").unwrap();
        let plain = FullJid::new("a@s/r2").unwrap();
        let blocker = FullJid::new("a@s/r3").unwrap();

        f.host.bind(&origin, true).await;
        f.host.bind(&plain, true).await;
        f.host.bind(&blocker, true).await;
        f.cache.add_block_list_user(&blocker).await;

        let block_payload = Element::builder("block", ns::BLOCKING)
            .append(
                Element::builder("item", ns::BLOCKING)
                    .attr("jid", "c@s")
                    .build(),
            )
            .build();
        let original = Stanza::iq_set(Some(jid("a@s/r1")), None, "b1", block_payload);

        f.emitter
            .push_list_update(&owner, &origin, "block", Some(&original))
            .await;

        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 2);

        let to_plain = sent.iter().find(|s| s.to == Some(jid("a@s/r2"))).unwrap();
        let payload = to_plain.payload.as_ref().unwrap();
        assert!(payload.is("query", ns::PRIVACY));
        let list = payload.get_child("list", ns::PRIVACY).unwrap();
        assert_eq!(list.attr("name"), Some("block"));

        let to_blocker = sent.iter().find(|s| s.to == Some(jid("a@s/r3"))).unwrap();
        assert!(to_blocker.payload.as_ref().unwrap().is("block", ns::BLOCKING));
    }

    // Scenario 2: catch-all presence-out deny fans unavailable out to the
    // from-roster.
    #[tokio::test]
    async fn test_regenerate_presence_walks_from_items() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        let session = FullJid::new("a@s/r1").unwrap();

        f.roster
            .put(
                &owner,
                RosterItem::new(BareJid::new("b@s").unwrap(), SubscriptionState::both()),
            )
            .await;
        f.roster
            .put(
                &owner,
                RosterItem::new(BareJid::new("c@s").unwrap(), SubscriptionState::from()),
            )
            .await;
        // to-only contact does not receive our presence
        f.roster
            .put(
                &owner,
                RosterItem::new(BareJid::new("d@s").unwrap(), SubscriptionState::to()),
            )
            .await;

        let list = PrivacyList::new("invisible", vec![PrivacyItem::invisibility(1, false)]);
        f.emitter.regenerate_presence(&session, &list).await;

        let sent = f.host.take_sent().await;
        let mut to: Vec<String> = sent
            .iter()
            .map(|s| s.to.as_ref().unwrap().to_string())
            .collect();
        to.sort();
        assert_eq!(to, vec!["b@s", "c@s"]);
        assert!(sent
            .iter()
            .all(|s| s.stype.as_deref() == Some("unavailable")));
    }

    #[tokio::test]
    async fn test_regenerate_presence_jid_item_inbound() {
        let f = fixture();
        let session = FullJid::new("a@s/r1").unwrap();
        let list = PrivacyList::new(
            "quiet",
            vec![PrivacyItem::new(
                1,
                Action::Deny,
                Predicate::Jid("b@s".to_string()),
                StanzaMask {
                    presence_in: true,
                    ..StanzaMask::ALL
                },
            )],
        );
        f.emitter.regenerate_presence(&session, &list).await;

        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, Some(jid("b@s")));
        assert_eq!(sent[0].to, Some(jid("a@s/r1")));
        assert_eq!(sent[0].stype.as_deref(), Some("unavailable"));
    }

    #[tokio::test]
    async fn test_presence_shift_from_available_sessions_only() {
        let f = fixture();
        let owner = BareJid::new("a@s").unwrap();
        f.host.bind(&FullJid::new("a@s/r1").unwrap(), true).await;
        f.host.bind(&FullJid::new("a@s/r2").unwrap(), false).await;

        f.emitter
            .presence_shift(&owner, &[jid("c@s")], false)
            .await;

        let sent = f.host.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from, Some(jid("a@s/r1")));
        assert_eq!(sent[0].stype.as_deref(), Some("unavailable"));

        // Restoration sends available presence.
        f.emitter.presence_shift(&owner, &[jid("c@s")], true).await;
        let sent = f.host.take_sent().await;
        assert_eq!(sent[0].stype, None);
    }
}
