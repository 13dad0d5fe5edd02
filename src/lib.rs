//! Privacy and blocking core for an XMPP server.
//!
//! In-process engine deciding, for every stanza that transits the host
//! server, whether a user's rules deny delivery, plus the admin surfaces
//! that configure those rules. Three protocols interoperate on one rule
//! space:
//!
//! - **Privacy Lists** (`jabber:iq:privacy`): ordered per-user rule lists
//!   with stanza-kind and roster-relation predicates
//! - **Blocking Command** (`urn:xmpp:blocking`): a flat block/unblock view
//!   projected onto the same lists
//! - **Invisible Command** (`urn:xmpp:invisible:0|1`): a session-scoped
//!   profile injecting presence-out deny rules
//!
//! The host server supplies the parser, routing pipeline, roster store,
//! and session bookkeeping; this crate reaches them through the contracts
//! in [`stanza`], [`roster`], [`store`], and [`host`], and plugs into the
//! pipeline via [`pipeline::PrivacyModule`]'s hook methods.

pub use jid;
pub use minidom;

pub mod cache;
pub mod config;
pub mod emitter;
pub mod host;
pub mod matcher;
pub mod model;
pub mod ns;
pub mod pipeline;
pub mod roster;
pub mod stanza;
pub mod store;

mod commands;

pub use config::{PrivacyConfig, StorageConfig};
pub use pipeline::{HookOutcome, HookPoint, PrivacyModule, DELIVER_PRIORITY, REGISTRATIONS};
