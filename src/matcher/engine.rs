//! Ordered evaluation of a privacy list against a stanza.

use jid::Jid;
use tracing::{trace, warn};

use super::predicate;
use crate::model::{Action, Predicate, PrivacyList};
use crate::roster::{RosterItem, RosterSource};
use crate::stanza::{Direction, Stanza, StanzaKind};

/// Outcome of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl From<Action> for Verdict {
    fn from(action: Action) -> Self {
        match action {
            Action::Allow => Verdict::Allow,
            Action::Deny => Verdict::Deny,
        }
    }
}

/// A deny verdict, reporting whose list produced it so the response can be
/// shaped accordingly.
#[derive(Debug, Clone)]
pub struct Denial {
    /// JID whose list was being applied
    pub owner: Jid,
    /// Direction of the denying pass
    pub direction: Direction,
}

/// Evaluate `list` against one stanza.
///
/// `owner` is the JID whose list is applied, `other` the counterparty.
/// Items are visited in stored order; the first item that passes the
/// stanza-kind gate and whose predicate matches decides. Roster lookups
/// are fetched lazily, at most once; a failed lookup is treated as "not in
/// roster".
pub async fn evaluate(
    list: &PrivacyList,
    stanza: &Stanza,
    direction: Direction,
    owner: &Jid,
    other: &Jid,
    roster: &dyn RosterSource,
) -> Verdict {
    // Traffic between resources of the same account is never filtered.
    if owner.to_bare() == other.to_bare() {
        return Verdict::Allow;
    }

    let mut roster_entry: Option<Option<RosterItem>> = None;

    for item in &list.items {
        if !predicate::mask_gates(item, stanza, direction) {
            continue;
        }

        // Directed presences bypass catch-all invisibility filters; a
        // probe-flagged item still applies.
        if direction == Direction::Out
            && stanza.kind == StanzaKind::Presence
            && item.predicate.is_none()
            && !item.probe_only
            && stanza.is_directed_client_presence()
        {
            continue;
        }

        let hit = match &item.predicate {
            Predicate::None => true,
            Predicate::Jid(pattern) => predicate::jid_pattern_matches(pattern, other),
            Predicate::Group(group) => {
                let entry = fetch_entry(&mut roster_entry, owner, other, roster).await;
                predicate::group_matches(group, entry)
            }
            Predicate::Subscription(sub) => {
                let entry = fetch_entry(&mut roster_entry, owner, other, roster).await;
                predicate::subscription_matches(*sub, entry)
            }
        };

        if hit {
            trace!(
                list = %list.name,
                order = item.order,
                action = item.action.as_str(),
                other = %other,
                "privacy item matched"
            );
            return item.action.into();
        }
    }

    Verdict::Allow
}

async fn fetch_entry<'a>(
    cached: &'a mut Option<Option<RosterItem>>,
    owner: &Jid,
    other: &Jid,
    roster: &dyn RosterSource,
) -> Option<&'a RosterItem> {
    if cached.is_none() {
        let fetched = match roster.get(&owner.to_bare(), &other.to_bare()).await {
            Ok(entry) => entry,
            Err(error) => {
                warn!(owner = %owner, %error, "roster lookup failed, treating as empty");
                None
            }
        };
        *cached = Some(fetched);
    }
    cached.as_ref().and_then(|entry| entry.as_ref())
}

/// Two-pass check for a stanza transiting the server: the recipient's
/// effective list is consulted first (`in`), then the sender's (`out`).
/// The first denying pass wins.
pub async fn transit_check(
    stanza: &Stanza,
    recipient: Option<(&Jid, &PrivacyList)>,
    sender: Option<(&Jid, &PrivacyList)>,
    roster: &dyn RosterSource,
) -> Option<Denial> {
    if let Some((owner, list)) = recipient {
        if let Some(other) = stanza.from.as_ref() {
            if evaluate(list, stanza, Direction::In, owner, other, roster).await == Verdict::Deny {
                return Some(Denial {
                    owner: owner.clone(),
                    direction: Direction::In,
                });
            }
        }
    }
    if let Some((owner, list)) = sender {
        if let Some(other) = stanza.to.as_ref() {
            if evaluate(list, stanza, Direction::Out, owner, other, roster).await == Verdict::Deny {
                return Some(Denial {
                    owner: owner.clone(),
                    direction: Direction::Out,
                });
            }
        }
    }
    None
}
