//! # Snapshot Differ
//!
//! Captures the user's input (form fields, selected items, per-item extra
//! fields) and classifies what changed between two captures.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Identifier of a selectable item (a product in the offer generator).
pub type ItemId = String;

/// Field name → value for one item's extra data
pub type ExtraFields = BTreeMap<String, String>;

/// Immutable capture of everything that feeds a regeneration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSnapshot {
    /// Form field values
    pub fields: BTreeMap<String, String>,

    /// Selected items, in selection order
    pub items: Vec<ItemId>,

    /// Per-item extra fields
    pub extras: BTreeMap<ItemId, ExtraFields>,
}

impl InputSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra(
        mut self,
        item_id: impl Into<ItemId>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.extras
            .entry(item_id.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// What changed between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub fields_changed: bool,
    pub items_changed: bool,
    pub added_items: Vec<ItemId>,
    pub removed_items: Vec<ItemId>,

    /// Per-item extra fields differ. Kept apart from `items_changed` so the
    /// generator can re-render only the affected item pages.
    pub extras_changed: bool,
}

impl ChangeReport {
    /// True if any class of change was detected
    pub fn has_changes(&self) -> bool {
        self.fields_changed
            || self.items_changed
            || self.extras_changed
            || !self.added_items.is_empty()
            || !self.removed_items.is_empty()
    }
}

/// Compare two snapshots.
///
/// Field comparison is string-exact with no normalization. Item comparison is
/// order-sensitive for `items_changed`, while `added_items` and
/// `removed_items` are plain set differences.
pub fn diff(previous: &InputSnapshot, current: &InputSnapshot) -> ChangeReport {
    let previous_items: HashSet<&str> = previous.items.iter().map(String::as_str).collect();
    let current_items: HashSet<&str> = current.items.iter().map(String::as_str).collect();

    ChangeReport {
        fields_changed: previous.fields != current.fields,
        items_changed: previous.items != current.items,
        added_items: current
            .items
            .iter()
            .filter(|id| !previous_items.contains(id.as_str()))
            .cloned()
            .collect(),
        removed_items: previous
            .items
            .iter()
            .filter(|id| !current_items.contains(id.as_str()))
            .cloned()
            .collect(),
        extras_changed: previous.extras != current.extras,
    }
}
