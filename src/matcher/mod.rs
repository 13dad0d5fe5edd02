//! Rule matching.
//!
//! Evaluates an ordered privacy list against a stanza:
//!
//! ```text
//! stanza ──> [ kind gate ] ──> [ directed-presence carve-out ]
//!                 │                        │
//!                 ▼                        ▼
//!            [ predicate: jid / group / subscription / none ]
//!                 │
//!                 ▼
//!            first hit wins ──> Allow | Deny
//! ```
//!
//! Group and subscription predicates consult the roster; the lookup is a
//! suspension point and is awaited inline, fetched at most once per
//! evaluation.

mod engine;
mod predicate;

pub use engine::{evaluate, transit_check, Denial, Verdict};
pub use predicate::{group_matches, jid_pattern_matches, mask_gates, subscription_matches};
