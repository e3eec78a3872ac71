//! # Page Store
//!
//! Ordered, keyed collection of the active epoch's pages.
//!
//! ## Design
//!
//! - Pages are indexed by number so upserts never scan the collection
//! - Display order is a separate list of numbers, re-sorted after mutations
//! - Sort key is the manual `order` once a reorder happened, else `number`
//! - Only one epoch lives in the store; opening a new one drops the old set

use crate::errors::{EngineError, EngineResult};
use crate::page::{EpochId, Lifecycle, Page, PageContent, PageReady, PageStub};
use std::collections::HashMap;
use tracing::debug;

/// What `apply_page_ready` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// The number was unknown to the epoch and got appended
    Inserted,
    /// An existing page was completed or refreshed
    Updated,
}

#[derive(Debug, Default)]
pub struct PageStore {
    epoch: EpochId,
    pages: HashMap<u32, Page>,
    display: Vec<u32>,
    manual: bool,
}

impl PageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    /// Drop the current page set and start accepting events for `epoch`.
    ///
    /// Returns false (and changes nothing) if `epoch` is older than the
    /// active one.
    pub fn open_epoch(&mut self, epoch: EpochId) -> bool {
        if epoch < self.epoch {
            return false;
        }
        if epoch > self.epoch {
            debug!(from = %self.epoch, to = %epoch, dropped = self.pages.len(), "Opening page epoch");
            self.pages.clear();
            self.display.clear();
            self.manual = false;
            self.epoch = epoch;
        }
        true
    }

    /// Install the stub set of `epoch` as pending pages.
    ///
    /// A newer epoch replaces everything. For the already-open epoch, pages
    /// that completed before the acknowledgement arrived keep their lifecycle
    /// and content.
    pub fn begin_epoch(&mut self, epoch: EpochId, stubs: Vec<PageStub>) -> bool {
        if !self.open_epoch(epoch) {
            return false;
        }

        for stub in stubs {
            match self.pages.get_mut(&stub.number) {
                Some(existing) => {
                    existing.origin = stub.origin;
                    existing.hydratable |= stub.hydratable;
                }
                None => {
                    self.display.push(stub.number);
                    self.pages.insert(stub.number, Page::from_stub(stub));
                }
            }
        }

        self.resort();
        true
    }

    /// Upsert a completed page.
    ///
    /// Unknown numbers are inserted as late pages. Number 0 is not a valid
    /// 1-based page number and is rejected without touching the store.
    pub fn apply_page_ready(&mut self, ready: PageReady) -> EngineResult<ReadyOutcome> {
        if ready.number == 0 {
            return Err(EngineError::MalformedEvent(
                "page_ready with page number 0".to_string(),
            ));
        }

        let outcome = match self.pages.get_mut(&ready.number) {
            Some(page) => {
                page.lifecycle = Lifecycle::Ready;
                if ready.typed {
                    page.origin = ready.origin;
                }
                match ready.content {
                    Some(content) => page.content = Some(content),
                    None => page.hydratable = true,
                }
                ReadyOutcome::Updated
            }
            None => {
                self.display.push(ready.number);
                self.pages.insert(ready.number, Page::from_ready(ready));
                ReadyOutcome::Inserted
            }
        };

        self.resort();
        Ok(outcome)
    }

    /// Advance every page of `item_id` to `lifecycle`, never backward.
    /// Returns the numbers of the pages that moved.
    pub fn apply_status(&mut self, item_id: &str, lifecycle: Lifecycle) -> Vec<u32> {
        let mut advanced: Vec<u32> = self
            .pages
            .values_mut()
            .filter(|page| page.origin.item_id() == Some(item_id))
            .filter_map(|page| page.advance(lifecycle).then_some(page.number))
            .collect();
        advanced.sort_unstable();
        advanced
    }

    /// Assign `order = position + 1` following `sequence`.
    ///
    /// Numbers the store doesn't know are skipped. Returns how many pages got
    /// an order.
    pub fn set_manual_order(&mut self, sequence: &[u32]) -> usize {
        let mut assigned = 0;
        for (position, number) in sequence.iter().enumerate() {
            if let Some(page) = self.pages.get_mut(number) {
                page.order = Some(position as u32 + 1);
                assigned += 1;
            }
        }
        if assigned > 0 {
            self.manual = true;
            self.resort();
        }
        assigned
    }

    /// Attach hydrated content. Content is set at most once; returns false for
    /// a stale epoch, an unknown page, or a page that already has content.
    pub fn attach_content(&mut self, epoch: EpochId, number: u32, content: PageContent) -> bool {
        if epoch != self.epoch {
            return false;
        }
        match self.pages.get_mut(&number) {
            Some(page) if page.content.is_none() => {
                page.content = Some(content);
                true
            }
            _ => false,
        }
    }

    pub fn pages_in_display_order(&self) -> impl Iterator<Item = &Page> + '_ {
        self.display.iter().filter_map(move |n| self.pages.get(n))
    }

    pub fn numbers_in_display_order(&self) -> &[u32] {
        &self.display
    }

    pub fn page_by_number(&self, number: u32) -> Option<&Page> {
        self.pages.get(&number)
    }

    pub fn page_at(&self, index: usize) -> Option<&Page> {
        self.display.get(index).and_then(|n| self.pages.get(n))
    }

    pub fn index_of(&self, number: u32) -> Option<usize> {
        self.display.iter().position(|n| *n == number)
    }

    pub fn len(&self) -> usize {
        self.display.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.pages.values().filter(|p| p.is_ready()).count()
    }

    pub fn has_manual_order(&self) -> bool {
        self.manual
    }

    fn resort(&mut self) {
        let manual = self.manual;
        let pages = &self.pages;
        self.display
            .sort_by_key(|n| pages.get(n).map(|p| p.sort_key(manual)).unwrap_or((u32::MAX, *n)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageOrigin;

    fn stubs(numbers: &[u32]) -> Vec<PageStub> {
        numbers
            .iter()
            .map(|n| PageStub::new(*n, PageOrigin::template(n - 1)))
            .collect()
    }

    fn ready(number: u32, content: &str) -> PageReady {
        PageReady::new(number, PageOrigin::template(number - 1), content)
    }

    fn display(store: &PageStore) -> Vec<u32> {
        store.numbers_in_display_order().to_vec()
    }

    #[test]
    fn test_begin_epoch_installs_pending_pages() {
        let mut store = PageStore::new();
        assert!(store.begin_epoch(EpochId(1), stubs(&[1, 2, 3])));

        assert_eq!(store.len(), 3);
        assert!(store
            .pages_in_display_order()
            .all(|p| p.lifecycle == Lifecycle::Pending && !p.has_content()));
    }

    #[test]
    fn test_out_of_order_ready_events_sort_by_number() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2, 3]));

        for n in [3, 1, 2] {
            store.apply_page_ready(ready(n, "img")).unwrap();
        }

        assert_eq!(display(&store), vec![1, 2, 3]);
        assert_eq!(store.ready_count(), 3);
    }

    #[test]
    fn test_repeated_ready_overwrites_content() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2]));

        assert_eq!(
            store.apply_page_ready(ready(2, "first")).unwrap(),
            ReadyOutcome::Updated
        );
        store.apply_page_ready(ready(2, "second")).unwrap();

        assert_eq!(store.len(), 2);
        let page = store.page_by_number(2).unwrap();
        assert_eq!(page.lifecycle, Lifecycle::Ready);
        assert_eq!(page.content.as_ref().unwrap().as_str(), "second");
    }

    #[test]
    fn test_unknown_number_is_inserted() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2]));

        let outcome = store.apply_page_ready(ready(7, "late")).unwrap();
        assert_eq!(outcome, ReadyOutcome::Inserted);
        assert_eq!(display(&store), vec![1, 2, 7]);
    }

    #[test]
    fn test_malformed_ready_leaves_store_untouched() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1]));

        let bad = PageReady {
            number: 0,
            origin: PageOrigin::template(0),
            content: None,
            typed: true,
        };
        assert!(matches!(
            store.apply_page_ready(bad),
            Err(EngineError::MalformedEvent(_))
        ));
        assert_eq!(display(&store), vec![1]);
    }

    #[test]
    fn test_untyped_ready_keeps_stub_origin() {
        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            vec![
                PageStub::new(1, PageOrigin::template(0)),
                PageStub::new(2, PageOrigin::item("p1", 0)),
                PageStub::new(3, PageOrigin::item("p1", 1)),
            ],
        );

        let frame = r#"{"event":"page_ready","data":{"number":2,"image":"img"}}"#;
        let crate::wire::StreamEvent::PageReady(ready) =
            crate::wire::decode_frame(frame, EpochId(1)).unwrap().event
        else {
            panic!("Expected page_ready");
        };
        store.apply_page_ready(ready).unwrap();

        let page = store.page_by_number(2).unwrap();
        assert_eq!(page.origin, PageOrigin::item("p1", 0));
        assert_eq!(page.content.as_ref().unwrap().as_str(), "img");
        assert_eq!(store.apply_status("p1", Lifecycle::Generating), vec![3]);

        // A typed frame still wins
        store
            .apply_page_ready(PageReady::new(3, PageOrigin::item("p2", 0), "img"))
            .unwrap();
        assert_eq!(
            store.page_by_number(3).unwrap().origin.item_id(),
            Some("p2")
        );
    }

    #[test]
    fn test_status_advances_only_item_pages_forward() {
        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            vec![
                PageStub::new(1, PageOrigin::template(0)),
                PageStub::new(2, PageOrigin::item("p1", 0)),
                PageStub::new(3, PageOrigin::item("p1", 1)),
                PageStub::new(4, PageOrigin::item("p2", 0)),
            ],
        );

        assert_eq!(store.apply_status("p1", Lifecycle::Generating), vec![2, 3]);
        assert_eq!(store.apply_status("p1", Lifecycle::Pending), Vec::<u32>::new());
        assert_eq!(
            store.page_by_number(2).unwrap().lifecycle,
            Lifecycle::Generating
        );
        assert_eq!(store.page_by_number(4).unwrap().lifecycle, Lifecycle::Pending);
        assert_eq!(store.page_by_number(1).unwrap().lifecycle, Lifecycle::Pending);
    }

    #[test]
    fn test_manual_order_survives_later_ready_event() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2, 3]));

        assert_eq!(store.set_manual_order(&[3, 1, 2]), 3);
        store.apply_page_ready(ready(2, "img")).unwrap();

        assert_eq!(display(&store), vec![3, 1, 2]);
        assert_eq!(store.page_by_number(3).unwrap().order, Some(1));
    }

    #[test]
    fn test_pages_without_order_go_last_under_manual_order() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2, 3]));
        store.set_manual_order(&[2, 1, 99]);

        assert_eq!(display(&store), vec![2, 1, 3]);
    }

    #[test]
    fn test_new_epoch_discards_previous_set() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), stubs(&[1, 2, 3]));
        store.apply_page_ready(ready(1, "old")).unwrap();
        store.set_manual_order(&[3, 2, 1]);

        store.begin_epoch(EpochId(2), stubs(&[1, 2]));

        assert_eq!(store.epoch(), EpochId(2));
        assert_eq!(display(&store), vec![1, 2]);
        assert!(!store.has_manual_order());
        assert!(store.page_by_number(1).unwrap().content.is_none());
    }

    #[test]
    fn test_early_ready_survives_acknowledgement() {
        let mut store = PageStore::new();
        store.open_epoch(EpochId(1));
        store.apply_page_ready(ready(2, "early")).unwrap();

        store.begin_epoch(EpochId(1), stubs(&[1, 2, 3]));

        let page = store.page_by_number(2).unwrap();
        assert_eq!(page.lifecycle, Lifecycle::Ready);
        assert_eq!(page.content.as_ref().unwrap().as_str(), "early");
        assert_eq!(display(&store), vec![1, 2, 3]);
    }

    #[test]
    fn test_older_epoch_is_refused() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(3), stubs(&[1]));

        assert!(!store.begin_epoch(EpochId(2), stubs(&[1, 2, 3, 4])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_attach_content_is_set_once_and_epoch_checked() {
        let mut store = PageStore::new();
        store.begin_epoch(EpochId(1), vec![PageStub::new(1, PageOrigin::template(0)).hydratable()]);

        assert!(!store.attach_content(EpochId(0), 1, "stale".into()));
        assert!(store.attach_content(EpochId(1), 1, "fresh".into()));
        assert!(!store.attach_content(EpochId(1), 1, "again".into()));
        assert_eq!(
            store.page_by_number(1).unwrap().content.as_ref().unwrap().as_str(),
            "fresh"
        );
    }
}
