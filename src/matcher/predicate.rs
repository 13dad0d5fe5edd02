//! Item predicates: JID patterns, roster relations, stanza-kind gate.

use jid::Jid;

use crate::model::{PrivacyItem, SubscriptionPredicate};
use crate::roster::RosterItem;
use crate::stanza::{Direction, Stanza, StanzaKind};

/// Match a candidate JID against a rule pattern.
///
/// Checked most-specific first; the order is observable because it decides
/// which rule wins when patterns overlap:
/// 1. full JID equals the pattern
/// 2. bare JID equals the pattern
/// 3. `domain/resource` equals the pattern (candidates with a resource)
/// 4. domain equals the pattern
pub fn jid_pattern_matches(pattern: &str, candidate: &Jid) -> bool {
    if candidate.to_string() == pattern {
        return true;
    }
    if candidate.to_bare().to_string() == pattern {
        return true;
    }
    if let Some(resource) = candidate.resource() {
        if format!("{}/{}", candidate.domain(), resource) == pattern {
            return true;
        }
    }
    candidate.domain().to_string() == pattern
}

/// Match a subscription predicate against a roster entry.
///
/// Only the to/from bits are compared (pending bits masked); `none`
/// matches a counterparty absent from the roster.
pub fn subscription_matches(predicate: SubscriptionPredicate, entry: Option<&RosterItem>) -> bool {
    let bits = entry
        .map(|item| item.subscription.bits())
        .unwrap_or((false, false));
    let wanted = match predicate {
        SubscriptionPredicate::None => (false, false),
        SubscriptionPredicate::To => (true, false),
        SubscriptionPredicate::From => (false, true),
        SubscriptionPredicate::Both => (true, true),
    };
    bits == wanted
}

/// Match a group predicate against a roster entry.
pub fn group_matches(group: &str, entry: Option<&RosterItem>) -> bool {
    entry.is_some_and(|item| item.groups.iter().any(|g| g == group))
}

/// Stanza-kind gate.
///
/// An empty mask applies to everything. Presence bits gate presence
/// *state* notifications only; a probe-flagged item instead gates
/// outbound presence probes.
pub fn mask_gates(item: &PrivacyItem, stanza: &Stanza, direction: Direction) -> bool {
    let mask = &item.mask;
    if mask.is_empty() {
        return true;
    }
    match stanza.kind {
        StanzaKind::Iq => mask.iq,
        StanzaKind::Message => mask.message,
        StanzaKind::Presence => match direction {
            Direction::In => mask.presence_in && stanza.is_presence_state(),
            Direction::Out => {
                mask.presence_out
                    && if item.probe_only {
                        stanza.is_presence_probe()
                    } else {
                        stanza.is_presence_state()
                    }
            }
        },
    }
}
