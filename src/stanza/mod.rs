//! Stanza contract types.
//!
//! The XML parser and full stanza objects belong to the host server; this
//! module defines the narrow view of a stanza the privacy core needs at its
//! hook points, plus constructors for the fragments the core itself emits
//! (pushes, synthesised presence, error replies). Payloads are
//! [`minidom::Element`] values, the element type of the host parser.

mod error;

pub use error::{ErrorCondition, ErrorType, StanzaError};

use jid::{FullJid, Jid};
use minidom::Element;

/// Top-level stanza kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaKind {
    Iq,
    Message,
    Presence,
}

/// Which side of the server a stanza is traversing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Towards a local recipient
    In,
    /// Away from a local sender
    Out,
}

/// Where a stanza entered the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaOrigin {
    /// Read from a bound client connection
    Client,
    /// Generated by the server itself (or received over s2s)
    Server,
}

/// Parsed presence `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceType {
    Available,
    Unavailable,
    Probe,
    Subscribe,
    Subscribed,
    Unsubscribe,
    Unsubscribed,
    Error,
}

/// Parsed IQ `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IqType {
    Get,
    Set,
    Result,
    Error,
}

/// The privacy core's view of a stanza.
///
/// Addressing and the type attribute are lifted out of the XML; the first
/// child element (the IQ payload) is carried verbatim for the command
/// handlers. Everything else about the original stanza stays with the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Stanza {
    pub kind: StanzaKind,
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub id: Option<String>,
    /// Raw `type` attribute
    pub stype: Option<String>,
    pub origin: StanzaOrigin,
    /// IQ payload (or error) element
    pub payload: Option<Element>,
}

impl Stanza {
    /// Client-originated IQ of type `set`.
    pub fn iq_set(from: Option<Jid>, to: Option<Jid>, id: &str, payload: Element) -> Self {
        Self {
            kind: StanzaKind::Iq,
            from,
            to,
            id: Some(id.to_string()),
            stype: Some("set".to_string()),
            origin: StanzaOrigin::Client,
            payload: Some(payload),
        }
    }

    /// Client-originated IQ of type `get`.
    pub fn iq_get(from: Option<Jid>, to: Option<Jid>, id: &str, payload: Element) -> Self {
        Self {
            stype: Some("get".to_string()),
            ..Self::iq_set(from, to, id, payload)
        }
    }

    /// Message stanza with the given type attribute (`None` = normal/chat).
    pub fn message(from: Jid, to: Jid, stype: Option<&str>) -> Self {
        Self {
            kind: StanzaKind::Message,
            from: Some(from),
            to: Some(to),
            id: None,
            stype: stype.map(str::to_string),
            origin: StanzaOrigin::Server,
            payload: None,
        }
    }

    /// Presence stanza with the given type attribute (`None` = available).
    pub fn presence(from: Option<Jid>, to: Option<Jid>, stype: Option<&str>) -> Self {
        Self {
            kind: StanzaKind::Presence,
            from,
            to,
            id: None,
            stype: stype.map(str::to_string),
            origin: StanzaOrigin::Server,
            payload: None,
        }
    }

    /// Mark the stanza as read from a client connection.
    pub fn from_client(mut self) -> Self {
        self.origin = StanzaOrigin::Client;
        self
    }

    /// Result reply to an IQ, addressed to the submitting session.
    pub fn reply_result(request: &Stanza, session: &FullJid, payload: Option<Element>) -> Self {
        Self {
            kind: StanzaKind::Iq,
            from: request.to.clone(),
            to: Some(Jid::from(session.clone())),
            id: request.id.clone(),
            stype: Some("result".to_string()),
            origin: StanzaOrigin::Server,
            payload,
        }
    }

    /// Error reply to an IQ, addressed to the submitting session.
    pub fn reply_error(request: &Stanza, session: &FullJid, error: &StanzaError) -> Self {
        Self {
            kind: StanzaKind::Iq,
            from: request.to.clone(),
            to: Some(Jid::from(session.clone())),
            id: request.id.clone(),
            stype: Some("error".to_string()),
            origin: StanzaOrigin::Server,
            payload: Some(error.element()),
        }
    }

    /// Server-originated stanza error response for a denied stanza, sent
    /// back to its sender.
    pub fn denial_error(denied: &Stanza, error: &StanzaError) -> Self {
        Self {
            kind: denied.kind,
            from: denied.to.clone(),
            to: denied.from.clone(),
            id: denied.id.clone(),
            stype: Some("error".to_string()),
            origin: StanzaOrigin::Server,
            payload: Some(error.element()),
        }
    }

    pub fn presence_type(&self) -> PresenceType {
        match self.stype.as_deref() {
            None => PresenceType::Available,
            Some("unavailable") => PresenceType::Unavailable,
            Some("probe") => PresenceType::Probe,
            Some("subscribe") => PresenceType::Subscribe,
            Some("subscribed") => PresenceType::Subscribed,
            Some("unsubscribe") => PresenceType::Unsubscribe,
            Some("unsubscribed") => PresenceType::Unsubscribed,
            _ => PresenceType::Error,
        }
    }

    pub fn iq_type(&self) -> Option<IqType> {
        if self.kind != StanzaKind::Iq {
            return None;
        }
        match self.stype.as_deref() {
            Some("get") => Some(IqType::Get),
            Some("set") => Some(IqType::Set),
            Some("result") => Some(IqType::Result),
            Some("error") => Some(IqType::Error),
            _ => None,
        }
    }

    /// Presence state notification: available or unavailable.
    pub fn is_presence_state(&self) -> bool {
        self.kind == StanzaKind::Presence
            && matches!(
                self.presence_type(),
                PresenceType::Available | PresenceType::Unavailable
            )
    }

    pub fn is_presence_probe(&self) -> bool {
        self.kind == StanzaKind::Presence && self.presence_type() == PresenceType::Probe
    }

    pub fn is_groupchat_message(&self) -> bool {
        self.kind == StanzaKind::Message && self.stype.as_deref() == Some("groupchat")
    }

    /// Directed presence: a presence state addressed to a specific
    /// recipient, read off the owner's own connection.
    pub fn is_directed_client_presence(&self) -> bool {
        self.origin == StanzaOrigin::Client && self.to.is_some() && self.is_presence_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> Jid {
        Jid::new(s).unwrap()
    }

    #[test]
    fn test_presence_type_parsing() {
        let p = Stanza::presence(Some(jid("a@s")), None, None);
        assert_eq!(p.presence_type(), PresenceType::Available);
        assert!(p.is_presence_state());

        let p = Stanza::presence(Some(jid("a@s")), None, Some("unavailable"));
        assert!(p.is_presence_state());

        let p = Stanza::presence(Some(jid("a@s")), None, Some("probe"));
        assert!(!p.is_presence_state());
        assert!(p.is_presence_probe());

        let p = Stanza::presence(Some(jid("a@s")), None, Some("subscribe"));
        assert!(!p.is_presence_state());
    }

    #[test]
    fn test_directed_client_presence() {
        let broadcast = Stanza::presence(Some(jid("a@s/r")), None, None).from_client();
        assert!(!broadcast.is_directed_client_presence());

        let directed = Stanza::presence(Some(jid("a@s/r")), Some(jid("b@s")), None).from_client();
        assert!(directed.is_directed_client_presence());

        // Not from the owner's connection
        let relayed = Stanza::presence(Some(jid("a@s/r")), Some(jid("b@s")), None);
        assert!(!relayed.is_directed_client_presence());

        // A probe is not a presence state
        let probe =
            Stanza::presence(Some(jid("a@s/r")), Some(jid("b@s")), Some("probe")).from_client();
        assert!(!probe.is_directed_client_presence());
    }

    #[test]
    fn test_reply_addressing() {
        let session = FullJid::new("romeo@example.com/orchard").unwrap();
        let query = Element::builder("query", crate::ns::PRIVACY).build();
        let request = Stanza::iq_get(Some(Jid::from(session.clone())), None, "q1", query);

        let reply = Stanza::reply_result(&request, &session, None);
        assert_eq!(reply.id.as_deref(), Some("q1"));
        assert_eq!(reply.stype.as_deref(), Some("result"));
        assert_eq!(reply.to, Some(Jid::from(session)));
    }
}
