//! RFC 6120 stanza errors.

use minidom::Element;

use crate::ns;

/// Stanza error `type` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Cancel,
    Modify,
}

impl ErrorType {
    fn as_str(self) -> &'static str {
        match self {
            ErrorType::Cancel => "cancel",
            ErrorType::Modify => "modify",
        }
    }
}

/// Error conditions this subsystem emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCondition {
    BadRequest,
    ItemNotFound,
    Conflict,
    JidMalformed,
    ServiceUnavailable,
    NotAcceptable,
}

impl ErrorCondition {
    fn element_name(self) -> &'static str {
        match self {
            ErrorCondition::BadRequest => "bad-request",
            ErrorCondition::ItemNotFound => "item-not-found",
            ErrorCondition::Conflict => "conflict",
            ErrorCondition::JidMalformed => "jid-malformed",
            ErrorCondition::ServiceUnavailable => "service-unavailable",
            ErrorCondition::NotAcceptable => "not-acceptable",
        }
    }
}

/// A stanza error, optionally carrying the Blocking `blocked` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StanzaError {
    pub condition: ErrorCondition,
    pub error_type: ErrorType,
    /// Append `<blocked/>` in the Blocking errors namespace
    pub blocked: bool,
}

impl StanzaError {
    pub fn new(condition: ErrorCondition, error_type: ErrorType) -> Self {
        Self {
            condition,
            error_type,
            blocked: false,
        }
    }

    pub fn bad_request(error_type: ErrorType) -> Self {
        Self::new(ErrorCondition::BadRequest, error_type)
    }

    pub fn item_not_found() -> Self {
        Self::new(ErrorCondition::ItemNotFound, ErrorType::Cancel)
    }

    pub fn conflict() -> Self {
        Self::new(ErrorCondition::Conflict, ErrorType::Cancel)
    }

    pub fn jid_malformed() -> Self {
        Self::new(ErrorCondition::JidMalformed, ErrorType::Modify)
    }

    pub fn service_unavailable() -> Self {
        Self::new(ErrorCondition::ServiceUnavailable, ErrorType::Cancel)
    }

    /// Denial of a message by the sender's own list.
    pub fn not_acceptable_blocked() -> Self {
        Self {
            condition: ErrorCondition::NotAcceptable,
            error_type: ErrorType::Cancel,
            blocked: true,
        }
    }

    /// Render the `<error/>` fragment.
    pub fn element(&self) -> Element {
        let mut builder = Element::builder("error", "jabber:client")
            .attr("type", self.error_type.as_str())
            .append(Element::builder(self.condition.element_name(), ns::STANZAS).build());
        if self.blocked {
            builder = builder.append(Element::builder("blocked", ns::BLOCKING_ERRORS).build());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_element_shape() {
        let el = StanzaError::service_unavailable().element();
        assert_eq!(el.name(), "error");
        assert_eq!(el.attr("type"), Some("cancel"));
        assert!(el.has_child("service-unavailable", ns::STANZAS));
        assert!(!el.has_child("blocked", ns::BLOCKING_ERRORS));
    }

    #[test]
    fn test_blocked_marker() {
        let el = StanzaError::not_acceptable_blocked().element();
        assert_eq!(el.attr("type"), Some("cancel"));
        assert!(el.has_child("not-acceptable", ns::STANZAS));
        assert!(el.has_child("blocked", ns::BLOCKING_ERRORS));
    }

    #[test]
    fn test_modify_errors() {
        let el = StanzaError::jid_malformed().element();
        assert_eq!(el.attr("type"), Some("modify"));
        assert!(el.has_child("jid-malformed", ns::STANZAS));

        let el = StanzaError::bad_request(ErrorType::Modify).element();
        assert_eq!(el.attr("type"), Some("modify"));
    }
}
