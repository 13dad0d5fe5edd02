//! Privacy Lists admin surface (`jabber:iq:privacy`).

use std::sync::Arc;

use jid::FullJid;
use minidom::Element;
use tracing::{debug, error};

use super::{parse_items, render_list};
use crate::host::SessionDirectory;
use crate::model::PrivacyList;
use crate::ns;
use crate::pipeline::PrivacyModule;
use crate::stanza::{ErrorType, Stanza, StanzaError};
use crate::store::ListStore;

/// `get query`: list enumeration, or a single-list fetch.
pub(crate) async fn handle_get(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    query: &Element,
) {
    let named: Vec<&Element> = query
        .children()
        .filter(|child| child.is("list", ns::PRIVACY))
        .collect();

    match named.len() {
        0 => enumerate(module, session, request).await,
        1 => fetch_one(module, session, request, named[0]).await,
        _ => {
            module
                .send_error(request, session, StanzaError::bad_request(ErrorType::Modify))
                .await;
        }
    }
}

async fn enumerate(module: &PrivacyModule, session: &FullJid, request: &Stanza) {
    let owner = session.to_bare();

    let all = match module.store.list_all(&owner).await {
        Ok(all) => all,
        Err(err) => {
            error!(owner = %owner, %err, "list enumeration failed");
            module
                .send_error(request, session, StanzaError::service_unavailable())
                .await;
            return;
        }
    };

    let mut builder = Element::builder("query", ns::PRIVACY);
    if let Some(active) = module.cache.active_name(session).await {
        builder = builder.append(
            Element::builder("active", ns::PRIVACY)
                .attr("name", active)
                .build(),
        );
    }
    if let Some(default) = module.default_list(&owner).await {
        builder = builder.append(
            Element::builder("default", ns::PRIVACY)
                .attr("name", default.name.clone())
                .build(),
        );
    }
    for list in &all {
        builder = builder.append(
            Element::builder("list", ns::PRIVACY)
                .attr("name", list.name.clone())
                .build(),
        );
    }

    module
        .send_result(request, session, Some(builder.build()))
        .await;
}

async fn fetch_one(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    list_el: &Element,
) {
    let owner = session.to_bare();
    let Some(name) = list_el.attr("name").filter(|name| !name.is_empty()) else {
        module
            .send_error(request, session, StanzaError::bad_request(ErrorType::Modify))
            .await;
        return;
    };

    match module.store.load(&owner, name).await {
        Ok(Some(list)) => {
            let payload = Element::builder("query", ns::PRIVACY)
                .append(render_list(&list))
                .build();
            module.send_result(request, session, Some(payload)).await;
        }
        Ok(None) => {
            module
                .send_error(request, session, StanzaError::item_not_found())
                .await;
        }
        Err(err) => {
            error!(owner = %owner, list = name, %err, "list fetch failed");
            module
                .send_error(request, session, StanzaError::service_unavailable())
                .await;
        }
    }
}

/// `set query`: activate, set default, or create/replace/delete a list.
/// The body must contain exactly one child.
pub(crate) async fn handle_set(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    query: &Element,
) {
    let children: Vec<&Element> = query.children().collect();
    if children.len() != 1 {
        module
            .send_error(request, session, StanzaError::bad_request(ErrorType::Modify))
            .await;
        return;
    }

    let child = children[0];
    match child.name() {
        "active" => set_active(module, session, request, child).await,
        "default" => set_default(module, session, request, child).await,
        "list" => set_list(module, session, request, child).await,
        _ => {
            module
                .send_error(request, session, StanzaError::bad_request(ErrorType::Modify))
                .await;
        }
    }
}

async fn set_active(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    active_el: &Element,
) {
    let owner = session.to_bare();

    match active_el.attr("name").filter(|name| !name.is_empty()) {
        None => {
            module.cache.set_active(session, None).await;
            module.send_result(request, session, None).await;
        }
        Some(name) => match module.store.load(&owner, name).await {
            Ok(Some(list)) => {
                module.cache.set_active(session, Some(Arc::new(list))).await;
                module.send_result(request, session, None).await;
            }
            Ok(None) => {
                module
                    .send_error(request, session, StanzaError::item_not_found())
                    .await;
            }
            Err(err) => {
                error!(owner = %owner, list = name, %err, "active list resolution failed");
                module
                    .send_error(request, session, StanzaError::service_unavailable())
                    .await;
            }
        },
    }
}

async fn set_default(
    module: &PrivacyModule,
    session: &FullJid,
    request: &Stanza,
    default_el: &Element,
) {
    let owner = session.to_bare();
    let current = module.default_list(&owner).await;
    let requested = default_el.attr("name").filter(|name| !name.is_empty());

    // Another session with no active binding relies on the current
    // default; changing it out from under them is a conflict.
    if let Some(current) = current.as_ref() {
        if requested != Some(current.name.as_str())
            && other_session_on_default(module, session, &owner).await
        {
            module.send_error(request, session, StanzaError::conflict()).await;
            return;
        }
    }

    match requested {
        None => {
            if let Some(current) = current {
                let detached = (*current).clone().with_default(false);
                if let Err(err) = module.store.store(&owner, detached).await {
                    error!(owner = %owner, %err, "default detach not persisted");
                }
            }
            module.cache.set_default(&owner, None).await;
            module.send_result(request, session, None).await;
        }
        Some(name) => {
            if current.as_ref().is_some_and(|list| list.name == name) {
                module.send_result(request, session, None).await;
                return;
            }
            match module.store.load(&owner, name).await {
                Ok(Some(list)) => {
                    let list = list.with_default(true);
                    if let Err(err) = module.store.store(&owner, list.clone()).await {
                        error!(owner = %owner, list = name, %err, "default change not persisted");
                    }
                    module.cache.set_default(&owner, Some(Arc::new(list))).await;
                    module.send_result(request, session, None).await;
                }
                Ok(None) => {
                    module
                        .send_error(request, session, StanzaError::item_not_found())
                        .await;
                }
                Err(err) => {
                    error!(owner = %owner, list = name, %err, "default resolution failed");
                    module
                        .send_error(request, session, StanzaError::service_unavailable())
                        .await;
                }
            }
        }
    }
}

async fn set_list(module: &PrivacyModule, session: &FullJid, request: &Stanza, list_el: &Element) {
    let owner = session.to_bare();
    let Some(name) = list_el.attr("name").filter(|name| !name.is_empty()) else {
        module
            .send_error(request, session, StanzaError::bad_request(ErrorType::Modify))
            .await;
        return;
    };

    if list_el.children().next().is_none() {
        delete_list(module, session, request, name).await;
        return;
    }

    let items = match parse_items(list_el) {
        Ok(items) => items,
        Err(error) => {
            module.send_error(request, session, error).await;
            return;
        }
    };

    let is_default = module
        .default_list(&owner)
        .await
        .is_some_and(|current| current.name == name);
    let list = PrivacyList::new(name, items).with_default(is_default);

    // The cache stays authoritative for running sessions even when the
    // write fails; durability is degraded, not the session's view.
    if let Err(err) = module.store.store(&owner, list.clone()).await {
        error!(owner = %owner, list = name, %err, "list not persisted");
    }

    let list = Arc::new(list);
    if is_default {
        module.cache.set_default(&owner, Some(list.clone())).await;
    }
    let rebinds = module.cache.sessions_with_active_name(&owner, name).await;
    for bound in &rebinds {
        module.cache.set_active(bound, Some(list.clone())).await;
    }

    debug!(owner = %owner, list = name, items = list.items.len(), "list replaced");

    module.send_result(request, session, None).await;
    module
        .emitter
        .push_list_update(&owner, session, name, None)
        .await;

    if is_default || rebinds.iter().any(|bound| bound == session) {
        module.emitter.regenerate_presence(session, &list).await;
    }
}

async fn delete_list(module: &PrivacyModule, session: &FullJid, request: &Stanza, name: &str) {
    let owner = session.to_bare();

    let exists = match module.store.load(&owner, name).await {
        Ok(found) => found.is_some(),
        Err(err) => {
            error!(owner = %owner, list = name, %err, "list resolution failed");
            module
                .send_error(request, session, StanzaError::service_unavailable())
                .await;
            return;
        }
    };
    if !exists {
        module
            .send_error(request, session, StanzaError::item_not_found())
            .await;
        return;
    }

    let is_default = module
        .default_list(&owner)
        .await
        .is_some_and(|current| current.name == name);

    // A list another live session depends on cannot be removed.
    if is_default && other_session_on_default(module, session, &owner).await {
        module.send_error(request, session, StanzaError::conflict()).await;
        return;
    }
    if module
        .cache
        .sessions_with_active_name(&owner, name)
        .await
        .iter()
        .any(|bound| bound != session)
    {
        module.send_error(request, session, StanzaError::conflict()).await;
        return;
    }

    if let Err(err) = module.store.store(&owner, PrivacyList::tombstone(name)).await {
        error!(owner = %owner, list = name, %err, "list removal not persisted");
    }

    if is_default {
        module.cache.set_default(&owner, None).await;
    }
    if module.cache.is_cached_with_name(session, name).await {
        module.cache.set_active(session, None).await;
    }

    debug!(owner = %owner, list = name, "list deleted");

    module.send_result(request, session, None).await;
    module
        .emitter
        .push_list_update(&owner, session, name, None)
        .await;
}

/// Is any *other* session of `owner` running on the default list (no
/// active binding)?
async fn other_session_on_default(
    module: &PrivacyModule,
    session: &FullJid,
    owner: &jid::BareJid,
) -> bool {
    for other in module.sessions.sessions_of(owner).await {
        if &other.jid == session {
            continue;
        }
        if module.cache.get_active(&other.jid).await.is_none() {
            return true;
        }
    }
    false
}
