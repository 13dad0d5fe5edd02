//! Blocking Command surface (`urn:xmpp:blocking`).
//!
//! The flat block list is a projection of the account's default privacy
//! list: blocking a JID prepends a Blocking-shape item, unblocking removes
//! it, and the blocklist read shows only items of that shape. A `block`
//! list is auto-created as the default when the account has none.

use std::sync::Arc;

use jid::{FullJid, Jid};
use minidom::Element;
use tracing::{debug, error};

use crate::model::{PrivacyItem, PrivacyList};
use crate::ns;
use crate::pipeline::PrivacyModule;
use crate::stanza::{ErrorType, Stanza, StanzaError};
use crate::store::ListStore;

/// `get blocklist`: project the default list's Blocking-shape items and
/// subscribe the session to Blocking-shaped pushes.
pub(crate) async fn handle_blocklist(module: &PrivacyModule, session: &FullJid, request: &Stanza) {
    let owner = session.to_bare();

    let mut builder = Element::builder("blocklist", ns::BLOCKING);
    if let Some(default) = module.default_list(&owner).await {
        for value in default.blocking_values() {
            builder = builder.append(
                Element::builder("item", ns::BLOCKING)
                    .attr("jid", value)
                    .build(),
            );
        }
    }

    module.cache.add_block_list_user(session).await;
    module
        .send_result(request, session, Some(builder.build()))
        .await;
}

/// `set block`: prepend a Blocking-shape item per JID, below every
/// existing order.
pub(crate) async fn handle_block(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    block_el: &Element,
) {
    let owner = session.to_bare();

    let jids = match parse_item_jids(block_el) {
        Ok(jids) => jids,
        Err(error) => {
            module.send_error(request, session, error).await;
            return;
        }
    };
    if jids.is_empty() {
        module
            .send_error(request, session, StanzaError::bad_request(ErrorType::Cancel))
            .await;
        return;
    }

    let current = match module.default_list(&owner).await {
        Some(list) => (*list).clone(),
        None => PrivacyList::new(&module.config.block_list_name, Vec::new()).with_default(true),
    };

    let fresh: Vec<&Jid> = jids
        .iter()
        .filter(|jid| {
            let value = jid.to_string();
            !current.blocking_values().any(|existing| existing == value)
        })
        .collect();
    if fresh.is_empty() {
        // Everything listed was already blocked.
        module.send_result(request, session, None).await;
        return;
    }

    // New items take orders 0..k; existing items shift up when the floor
    // is occupied.
    let count = fresh.len() as u32;
    let floor = current.min_order().unwrap_or(count);
    let shift = count.saturating_sub(floor);

    let mut items: Vec<PrivacyItem> = fresh
        .iter()
        .enumerate()
        .map(|(index, jid)| PrivacyItem::blocking(index as u32, &jid.to_string()))
        .collect();
    items.extend(current.items.iter().cloned().map(|mut item| {
        item.order += shift;
        item
    }));

    let updated = current.with_items(items).with_default(true);
    if let Err(err) = module.store.store(&owner, updated.clone()).await {
        error!(owner = %owner, %err, "block list not persisted");
    }
    let updated = Arc::new(updated);
    module.cache.set_default(&owner, Some(updated.clone())).await;

    debug!(owner = %owner, blocked = fresh.len(), "jids blocked");

    let targets: Vec<Jid> = fresh.into_iter().cloned().collect();
    module.send_result(request, session, None).await;
    module
        .emitter
        .push_list_update(&owner, session, &updated.name, Some(request))
        .await;
    module.emitter.presence_shift(&owner, &targets, false).await;
}

/// `set unblock`: remove Blocking-shape items. Without items, every
/// Blocking-shape item goes; other privacy rules are kept.
pub(crate) async fn handle_unblock(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    unblock_el: &Element,
) {
    let owner = session.to_bare();

    let jids = match parse_item_jids(unblock_el) {
        Ok(jids) => jids,
        Err(error) => {
            module.send_error(request, session, error).await;
            return;
        }
    };

    let current = module.default_list(&owner).await;
    let Some(current) = current else {
        if jids.is_empty() {
            // Nothing blocked, nothing to strip.
            module.send_result(request, session, None).await;
        } else {
            module
                .send_error(request, session, StanzaError::bad_request(ErrorType::Cancel))
                .await;
        }
        return;
    };

    let unblock_all = jids.is_empty();
    if !unblock_all && current.blocking_values().next().is_none() {
        // Nothing is blocked; a targeted unblock is a client error.
        module
            .send_error(request, session, StanzaError::bad_request(ErrorType::Cancel))
            .await;
        return;
    }
    let wanted: Vec<String> = jids.iter().map(|jid| jid.to_string()).collect();

    let mut removed: Vec<Jid> = Vec::new();
    let mut remaining: Vec<PrivacyItem> = Vec::new();
    for item in &current.items {
        let strip = match item.blocking_value() {
            Some(value) => unblock_all || wanted.iter().any(|jid| jid == value),
            None => false,
        };
        if strip {
            if let Ok(jid) = Jid::new(item.blocking_value().unwrap_or_default()) {
                removed.push(jid);
            }
        } else {
            remaining.push(item.clone());
        }
    }

    if removed.is_empty() {
        module.send_result(request, session, None).await;
        return;
    }

    let updated = current.with_items(remaining);
    if let Err(err) = module.store.store(&owner, updated.clone()).await {
        error!(owner = %owner, %err, "unblock not persisted");
    }
    let name = updated.name.clone();
    if updated.is_empty() {
        // Removal semantics: the emptied default list is gone.
        module.cache.set_default(&owner, None).await;
    } else {
        module
            .cache
            .set_default(&owner, Some(Arc::new(updated)))
            .await;
    }

    debug!(owner = %owner, unblocked = removed.len(), "jids unblocked");

    module.send_result(request, session, None).await;
    module
        .emitter
        .push_list_update(&owner, session, &name, Some(request))
        .await;
    module.emitter.presence_shift(&owner, &removed, true).await;
}

/// Parse the `<item jid="…"/>` children. A missing attribute is a
/// `bad-request`, an unparseable JID a `jid-malformed`.
fn parse_item_jids(el: &Element) -> Result<Vec<Jid>, StanzaError> {
    let mut jids = Vec::new();
    for child in el.children() {
        if !child.is("item", ns::BLOCKING) {
            return Err(StanzaError::bad_request(ErrorType::Cancel));
        }
        let value = child
            .attr("jid")
            .ok_or_else(|| StanzaError::bad_request(ErrorType::Cancel))?;
        let jid = Jid::new(value).map_err(|_| StanzaError::jid_malformed())?;
        jids.push(jid);
    }
    Ok(jids)
}
