//! Privacy list items.

use serde::{Deserialize, Serialize};

/// What a matching item does to the stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Deny,
}

impl Action {
    /// Parse the wire attribute value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Action::Allow),
            "deny" => Some(Action::Deny),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
        }
    }
}

/// Subscription state an item can demand of the counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPredicate {
    None,
    To,
    From,
    Both,
}

impl SubscriptionPredicate {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SubscriptionPredicate::None),
            "to" => Some(SubscriptionPredicate::To),
            "from" => Some(SubscriptionPredicate::From),
            "both" => Some(SubscriptionPredicate::Both),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionPredicate::None => "none",
            SubscriptionPredicate::To => "to",
            SubscriptionPredicate::From => "from",
            SubscriptionPredicate::Both => "both",
        }
    }
}

/// Who an item applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Catch-all: matches any counterparty
    None,
    /// JID pattern (full, bare, domain/resource, or domain)
    Jid(String),
    /// Roster group membership
    Group(String),
    /// Roster subscription state
    Subscription(SubscriptionPredicate),
}

impl Predicate {
    pub fn is_none(&self) -> bool {
        matches!(self, Predicate::None)
    }
}

/// Which stanza kinds an item applies to. Empty mask = every kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaMask {
    #[serde(default)]
    pub iq: bool,
    #[serde(default)]
    pub message: bool,
    #[serde(default)]
    pub presence_in: bool,
    #[serde(default)]
    pub presence_out: bool,
}

impl StanzaMask {
    pub const ALL: StanzaMask = StanzaMask {
        iq: false,
        message: false,
        presence_in: false,
        presence_out: false,
    };

    pub const PRESENCE_OUT: StanzaMask = StanzaMask {
        iq: false,
        message: false,
        presence_in: false,
        presence_out: true,
    };

    /// An empty mask applies to every stanza kind.
    pub fn is_empty(&self) -> bool {
        !(self.iq || self.message || self.presence_in || self.presence_out)
    }
}

/// One rule of a privacy list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyItem {
    /// Position within the list, ascending
    pub order: u32,
    pub action: Action,
    #[serde(default = "predicate_none")]
    pub predicate: Predicate,
    #[serde(default)]
    pub mask: StanzaMask,
    /// Restrict a presence-out deny to presence probes (invisibility
    /// extension; never serialised on the wire)
    #[serde(default)]
    pub probe_only: bool,
}

fn predicate_none() -> Predicate {
    Predicate::None
}

impl PrivacyItem {
    pub fn new(order: u32, action: Action, predicate: Predicate, mask: StanzaMask) -> Self {
        Self {
            order,
            action,
            predicate,
            mask,
            probe_only: false,
        }
    }

    /// Deny rule for a single JID across every stanza kind, as produced by
    /// the Blocking Command.
    pub fn blocking(order: u32, jid: &str) -> Self {
        Self::new(
            order,
            Action::Deny,
            Predicate::Jid(jid.to_string()),
            StanzaMask::ALL,
        )
    }

    /// Catch-all presence-out deny, as injected by the Invisible Command.
    pub fn invisibility(order: u32, probe_only: bool) -> Self {
        Self {
            order,
            action: Action::Deny,
            predicate: Predicate::None,
            mask: StanzaMask::PRESENCE_OUT,
            probe_only,
        }
    }

    /// Blocking-shape: JID predicate, deny, empty mask. No other field
    /// distinguishes it.
    pub fn is_blocking_shape(&self) -> bool {
        matches!(self.predicate, Predicate::Jid(_))
            && self.action == Action::Deny
            && self.mask.is_empty()
    }

    /// The JID value of a Blocking-shape item.
    pub fn blocking_value(&self) -> Option<&str> {
        if !self.is_blocking_shape() {
            return None;
        }
        match &self.predicate {
            Predicate::Jid(value) => Some(value),
            _ => None,
        }
    }

    /// Invisibility-shape: no predicate, deny, presence-out only. The
    /// probe flag narrows it to the probe variant.
    pub fn is_invisibility_shape(&self) -> bool {
        self.predicate.is_none()
            && self.action == Action::Deny
            && self.mask == StanzaMask::PRESENCE_OUT
    }

    /// Does this item deny inbound or outbound presence? Used by presence
    /// regeneration after a list change.
    pub fn denies_presence(&self, outbound: bool) -> bool {
        if self.action != Action::Deny {
            return false;
        }
        if outbound {
            self.mask.presence_out
        } else {
            self.mask.presence_in
        }
    }
}
