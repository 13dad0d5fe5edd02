//! Admin command handlers.
//!
//! Parses and applies the Privacy, Blocking, and Invisible IQ surfaces.
//! Every handler replies exactly once (result or error) and sequences its
//! side effects as reply, then broadcast, then synthesised presence.

mod blocking;
mod privacy;
mod visibility;

use jid::FullJid;
use minidom::Element;

use crate::model::{Action, Predicate, PrivacyItem, PrivacyList, StanzaMask, SubscriptionPredicate};
use crate::ns;
use crate::pipeline::PrivacyModule;
use crate::stanza::{ErrorType, IqType, Stanza, StanzaError};

/// Route an admin IQ to its handler. Returns whether the stanza was one of
/// ours; unknown payloads are left to the rest of the host pipeline.
pub(crate) async fn dispatch(module: &PrivacyModule, session: &FullJid, stanza: &Stanza) -> bool {
    let Some(payload) = stanza.payload.as_ref() else {
        return false;
    };
    let Some(iq_type) = stanza.iq_type() else {
        return false;
    };

    let invisible_ns =
        payload.is("invisible", ns::INVISIBLE_0) || payload.is("invisible", ns::INVISIBLE_1);
    let visible_ns =
        payload.is("visible", ns::INVISIBLE_0) || payload.is("visible", ns::INVISIBLE_1);

    match iq_type {
        IqType::Get if payload.is("query", ns::PRIVACY) => {
            privacy::handle_get(module, session, stanza, payload).await;
            true
        }
        IqType::Set if payload.is("query", ns::PRIVACY) => {
            privacy::handle_set(module, session, stanza, payload).await;
            true
        }
        IqType::Get if payload.is("blocklist", ns::BLOCKING) => {
            blocking::handle_blocklist(module, session, stanza).await;
            true
        }
        IqType::Set if payload.is("block", ns::BLOCKING) => {
            blocking::handle_block(module, session, stanza, payload).await;
            true
        }
        IqType::Set if payload.is("unblock", ns::BLOCKING) => {
            blocking::handle_unblock(module, session, stanza, payload).await;
            true
        }
        IqType::Set if invisible_ns => {
            visibility::handle_invisible(module, session, stanza, payload).await;
            true
        }
        IqType::Set if visible_ns => {
            visibility::handle_visible(module, session, stanza).await;
            true
        }
        _ => false,
    }
}

/// Parse the items of a `<list/>` element. Any violation aborts with
/// `bad-request (cancel)`; no partial result escapes.
fn parse_items(list_el: &Element) -> Result<Vec<PrivacyItem>, StanzaError> {
    let bad = || StanzaError::bad_request(ErrorType::Cancel);
    let mut items = Vec::new();

    for child in list_el.children() {
        if !child.is("item", ns::PRIVACY) {
            return Err(bad());
        }
        items.push(parse_item(child)?);
    }
    Ok(items)
}

fn parse_item(el: &Element) -> Result<PrivacyItem, StanzaError> {
    let bad = || StanzaError::bad_request(ErrorType::Cancel);

    let order: u32 = el
        .attr("order")
        .ok_or_else(bad)?
        .parse()
        .map_err(|_| bad())?;
    let action = Action::parse(el.attr("action").ok_or_else(bad)?).ok_or_else(bad)?;

    let predicate = match el.attr("type") {
        None => Predicate::None,
        Some(kind) => {
            let value = el.attr("value").ok_or_else(bad)?;
            match kind {
                "jid" => Predicate::Jid(value.to_string()),
                "group" => Predicate::Group(value.to_string()),
                "subscription" => Predicate::Subscription(
                    SubscriptionPredicate::parse(value).ok_or_else(bad)?,
                ),
                _ => return Err(bad()),
            }
        }
    };

    let mut mask = StanzaMask::ALL;
    for child in el.children() {
        match child.name() {
            "iq" => mask.iq = true,
            "message" => mask.message = true,
            "presence-in" => mask.presence_in = true,
            "presence-out" => mask.presence_out = true,
            _ => return Err(bad()),
        }
    }

    Ok(PrivacyItem::new(order, action, predicate, mask))
}

/// Render a list with its items for a single-list fetch.
fn render_list(list: &PrivacyList) -> Element {
    let mut builder = Element::builder("list", ns::PRIVACY).attr("name", list.name.clone());
    for item in &list.items {
        builder = builder.append(render_item(item));
    }
    builder.build()
}

fn render_item(item: &PrivacyItem) -> Element {
    let mut builder = Element::builder("item", ns::PRIVACY)
        .attr("action", item.action.as_str())
        .attr("order", item.order.to_string());

    match &item.predicate {
        Predicate::None => {}
        Predicate::Jid(value) => {
            builder = builder.attr("type", "jid").attr("value", value.clone());
        }
        Predicate::Group(value) => {
            builder = builder.attr("type", "group").attr("value", value.clone());
        }
        Predicate::Subscription(sub) => {
            builder = builder
                .attr("type", "subscription")
                .attr("value", sub.as_str());
        }
    }

    for (flag, name) in [
        (item.mask.iq, "iq"),
        (item.mask.message, "message"),
        (item.mask.presence_in, "presence-in"),
        (item.mask.presence_out, "presence-out"),
    ] {
        if flag {
            builder = builder.append(Element::builder(name, ns::PRIVACY).build());
        }
    }

    builder.build()
}
