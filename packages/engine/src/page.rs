//! Page records and the descriptors that create them

use crate::snapshot::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Token identifying one regeneration's page set.
///
/// Epoch 0 is the empty state before any regeneration was dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EpochId(pub u64);

impl EpochId {
    pub fn next(self) -> Self {
        EpochId(self.0 + 1)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch-{}", self.0)
    }
}

/// Per-page generation state. Ordering follows the only legal direction of
/// travel: `Pending < Generating < Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Pending,
    Generating,
    Ready,
}

/// Column a page belongs to on the reorder board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageGroup {
    Template,
    Item,
}

/// Where a page comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PageOrigin {
    Template {
        /// Page index inside the template file
        index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_file: Option<String>,
    },
    Item {
        item_id: ItemId,
        /// Page index inside the item's own document
        index: u32,
    },
}

impl PageOrigin {
    pub fn template(index: u32) -> Self {
        PageOrigin::Template {
            index,
            source_file: None,
        }
    }

    pub fn item(item_id: impl Into<ItemId>, index: u32) -> Self {
        PageOrigin::Item {
            item_id: item_id.into(),
            index,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            PageOrigin::Item { item_id, .. } => Some(item_id),
            PageOrigin::Template { .. } => None,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            PageOrigin::Template { index, .. } | PageOrigin::Item { index, .. } => *index,
        }
    }

    pub fn group(&self) -> PageGroup {
        match self {
            PageOrigin::Template { .. } => PageGroup::Template,
            PageOrigin::Item { .. } => PageGroup::Item,
        }
    }
}

/// Rendered page payload (an encoded image, usually a data URL).
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageContent(Arc<str>);

impl PageContent {
    pub fn new(data: impl Into<Arc<str>>) -> Self {
        PageContent(data.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageContent({} bytes)", self.0.len())
    }
}

impl From<&str> for PageContent {
    fn from(s: &str) -> Self {
        PageContent::new(s)
    }
}

impl From<String> for PageContent {
    fn from(s: String) -> Self {
        PageContent::new(s)
    }
}

/// Page descriptor returned by the regeneration acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStub {
    pub number: u32,
    pub origin: PageOrigin,

    /// The generator already holds this page's content and it may be
    /// fetched lazily
    #[serde(default)]
    pub hydratable: bool,
}

impl PageStub {
    pub fn new(number: u32, origin: PageOrigin) -> Self {
        Self {
            number,
            origin,
            hydratable: false,
        }
    }

    pub fn hydratable(mut self) -> Self {
        self.hydratable = true;
        self
    }
}

/// A page completion delivered by the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReady {
    pub number: u32,
    pub origin: PageOrigin,
    pub content: Option<PageContent>,
    /// The frame named the page's type. An untyped completion leaves the
    /// origin of a known page alone.
    pub typed: bool,
}

impl PageReady {
    pub fn new(number: u32, origin: PageOrigin, content: impl Into<PageContent>) -> Self {
        Self {
            number,
            origin,
            content: Some(content.into()),
            typed: true,
        }
    }
}

/// One page of the active epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub number: u32,
    pub origin: PageOrigin,
    pub lifecycle: Lifecycle,
    pub content: Option<PageContent>,
    pub hydratable: bool,
    pub order: Option<u32>,
}

impl Page {
    pub fn from_stub(stub: PageStub) -> Self {
        Self {
            number: stub.number,
            origin: stub.origin,
            lifecycle: Lifecycle::Pending,
            content: None,
            hydratable: stub.hydratable,
            order: None,
        }
    }

    pub fn from_ready(ready: PageReady) -> Self {
        let hydratable = ready.content.is_none();
        Self {
            number: ready.number,
            origin: ready.origin,
            lifecycle: Lifecycle::Ready,
            content: ready.content,
            hydratable,
            order: None,
        }
    }

    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Content is missing but can be fetched on demand
    pub fn needs_hydration(&self) -> bool {
        self.content.is_none() && self.hydratable
    }

    /// Move the lifecycle forward; returns false if `next` would go backward
    /// or stay put.
    pub fn advance(&mut self, next: Lifecycle) -> bool {
        if next > self.lifecycle {
            self.lifecycle = next;
            if next == Lifecycle::Ready && self.content.is_none() {
                self.hydratable = true;
            }
            true
        } else {
            false
        }
    }

    pub(crate) fn sort_key(&self, manual: bool) -> (u32, u32) {
        if manual {
            // Pages that arrived after the reorder go behind the ordered ones
            (self.order.unwrap_or(u32::MAX), self.number)
        } else {
            (self.number, 0)
        }
    }
}
