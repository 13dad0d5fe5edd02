//! Protocol namespace constants.

/// Privacy Lists (XEP-0016).
pub const PRIVACY: &str = "jabber:iq:privacy";

/// Blocking Command (XEP-0191).
pub const BLOCKING: &str = "urn:xmpp:blocking";

/// Error marker namespace for blocking-caused denials (XEP-0191 §3.3).
pub const BLOCKING_ERRORS: &str = "urn:xmpp:blocking:errors";

/// Invisible Command, revision 0 (XEP-0186).
pub const INVISIBLE_0: &str = "urn:xmpp:invisible:0";

/// Invisible Command, revision 1.
pub const INVISIBLE_1: &str = "urn:xmpp:invisible:1";

/// RFC 6120 stanza error conditions.
pub const STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Features the host should advertise on behalf of this subsystem.
pub const SERVER_FEATURES: &[&str] = &[PRIVACY, BLOCKING, INVISIBLE_0, INVISIBLE_1];
