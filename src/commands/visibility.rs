//! Invisible Command surface (`urn:xmpp:invisible:0|1`).
//!
//! Invisibility is a session-scoped profile expressed through the active
//! list: going invisible injects an Invisibility-shape item (optionally
//! probe-restricted), going visible strips such items again. A session
//! with no active list gets a transient one that lives only in the cache.

use std::sync::Arc;

use jid::FullJid;
use minidom::Element;
use tracing::debug;

use crate::host::SessionDirectory;
use crate::model::{PrivacyItem, PrivacyList};
use crate::pipeline::PrivacyModule;
use crate::stanza::Stanza;
use crate::store::ListStore;

/// Name of the auto-created transient active list.
const TRANSIENT_LIST: &str = "invisible";

/// `set invisible`, optionally with `probe="true"`.
pub(crate) async fn handle_invisible(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    invisible_el: &Element,
) {
    let probe = matches!(invisible_el.attr("probe"), Some("true") | Some("1"));

    match module.cache.get_active(session).await {
        Some(active) => {
            match active.invisibility_item() {
                Some(existing) if existing.probe_only != probe => {
                    // Same shape, different probe restriction: adjust in
                    // place via a fresh list value.
                    let items = active
                        .items
                        .iter()
                        .cloned()
                        .map(|mut item| {
                            if item.is_invisibility_shape() {
                                item.probe_only = probe;
                            }
                            item
                        })
                        .collect();
                    let adjusted = Arc::new(active.with_items(items));
                    module.cache.set_active(session, Some(adjusted)).await;
                    debug!(session = %session, probe, "invisibility probe flag adjusted");
                }
                Some(_) => {}
                // An unrelated active list is in effect; the request is
                // intentionally ignored.
                None => {
                    debug!(session = %session, list = %active.name, "invisible ignored, active list in effect");
                }
            }
            module.send_result(request, session, None).await;
        }
        None => {
            let list = Arc::new(PrivacyList::transient(
                TRANSIENT_LIST,
                vec![PrivacyItem::invisibility(0, probe)],
            ));
            module.cache.set_active(session, Some(list)).await;
            debug!(session = %session, probe, "transient invisibility list bound");

            module.send_result(request, session, None).await;

            // Contacts already hold the session's presence; retract it.
            // A probe-only block leaves broadcast presence visible.
            if !probe && past_initial_presence(module, session).await {
                module.emitter.broadcast_unavailable(session).await;
            }
        }
    }
}

/// `set visible`: strip Invisibility-shape items from the active list.
pub(crate) async fn handle_visible(module: &PrivacyModule, session: &FullJid, request: &Stanza) {
    let Some(active) = module.cache.get_active(session).await else {
        module.send_result(request, session, None).await;
        return;
    };

    let remaining: Vec<PrivacyItem> = active
        .items
        .iter()
        .filter(|item| !item.is_invisibility_shape())
        .cloned()
        .collect();

    if remaining.len() == active.items.len() {
        // Nothing to strip.
        module.send_result(request, session, None).await;
        return;
    }

    if remaining.is_empty() || active.transient {
        module.cache.set_active(session, None).await;
        debug!(session = %session, "invisibility binding discarded");
        module.send_result(request, session, None).await;
        return;
    }

    // A named active list keeps its other rules; persist the narrowed
    // value and tell the other sessions.
    let owner = session.to_bare();
    let updated = active.with_items(remaining);
    if let Err(err) = module.store.store(&owner, updated.clone()).await {
        tracing::error!(owner = %owner, list = %updated.name, %err, "visibility change not persisted");
    }
    let name = updated.name.clone();
    let updated = Arc::new(updated);
    module.cache.set_active(session, Some(updated)).await;

    module.send_result(request, session, None).await;
    module
        .emitter
        .push_list_update(&owner, session, &name, None)
        .await;
}

async fn past_initial_presence(module: &PrivacyModule, session: &FullJid) -> bool {
    module
        .sessions
        .sessions_of(&session.to_bare())
        .await
        .iter()
        .any(|info| &info.jid == session && info.available)
}
