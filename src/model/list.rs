//! Privacy lists.

use serde::{Deserialize, Serialize};

use super::PrivacyItem;

/// An identified, ordered collection of privacy items.
///
/// Items are kept sorted by `order` ascending from the moment the list is
/// built; the match engine iterates without re-sorting. Lists are
/// copy-on-replace: mutation helpers return a new value, and installed
/// lists are never modified in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyList {
    /// Unique per owner
    pub name: String,
    pub items: Vec<PrivacyItem>,
    /// Account default list
    #[serde(default)]
    pub is_default: bool,
    /// Session-lifetime list, never persisted (auto-created invisibility)
    #[serde(skip)]
    pub transient: bool,
}

impl PrivacyList {
    /// Build a list, sorting the items by ascending order. The sort is
    /// stable, so items sharing an order value keep their given sequence.
    pub fn new(name: &str, mut items: Vec<PrivacyItem>) -> Self {
        items.sort_by_key(|item| item.order);
        Self {
            name: name.to_string(),
            items,
            is_default: false,
            transient: false,
        }
    }

    pub fn transient(name: &str, items: Vec<PrivacyItem>) -> Self {
        Self {
            transient: true,
            ..Self::new(name, items)
        }
    }

    /// An empty-bodied list: the store interprets it as removal.
    pub fn tombstone(name: &str) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// New list value with replaced items (re-sorted), keeping identity.
    pub fn with_items(&self, items: Vec<PrivacyItem>) -> Self {
        let mut next = Self::new(&self.name, items);
        next.is_default = self.is_default;
        next.transient = self.transient;
        next
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// Lowest order value in the list.
    pub fn min_order(&self) -> Option<u32> {
        self.items.first().map(|item| item.order)
    }

    /// JID values of the Blocking-shape items, in list order.
    pub fn blocking_values(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| item.blocking_value())
    }

    /// First Invisibility-shape item, if any.
    pub fn invisibility_item(&self) -> Option<&PrivacyItem> {
        self.items.iter().find(|item| item.is_invisibility_shape())
    }
}
