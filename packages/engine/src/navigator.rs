//! # Viewport Navigator
//!
//! Owns the cursor into the page store's display order and decides what the
//! viewport shows. It never copies pages; every decision reads the store.

use crate::page::{Page, PageContent};
use crate::store::PageStore;
use serde::Serialize;
use std::fmt;

/// What the viewport currently shows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewState {
    /// Nothing to show yet (no epoch, or waiting for the first page)
    Waiting,
    /// The page exists but the generator hasn't finished it
    Generating { number: u32 },
    /// Content is being fetched
    Loading { number: u32 },
    /// Content is on screen
    Showing { number: u32 },
    /// Regeneration or hydration failed
    Failed { number: Option<u32>, reason: String },
}

impl ViewState {
    /// Anything other than real page content
    pub fn is_placeholder(&self) -> bool {
        !matches!(self, ViewState::Showing { .. })
    }
}

/// Navigation command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Navigate {
    Prev,
    Next,
    First,
    Last,
    Index(usize),
}

/// Which row of the ready-page decision table matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyReaction {
    JumpToFirst,
    RefreshInPlace,
    AutoAdvance,
    ListOnly,
}

/// Rendered state of the viewport, including navigation affordances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub index: usize,
    pub total: usize,
    pub number: Option<u32>,
    pub state: ViewState,
    #[serde(skip)]
    pub content: Option<PageContent>,
    pub can_prev: bool,
    pub can_next: bool,
}

impl fmt::Display for PageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            write!(f, "no pages")
        } else {
            write!(f, "page {} of {}", self.index + 1, self.total)
        }
    }
}

/// Result of putting a page on screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowOutcome {
    pub view: PageView,
    /// Page number to hydrate for display
    pub hydrate: Option<u32>,
    /// Neighbour page numbers to prefetch
    pub prefetch: Vec<u32>,
}

#[derive(Debug)]
pub struct ViewportNavigator {
    cursor: usize,
    view: ViewState,
    prefetch_radius: usize,
}

impl ViewportNavigator {
    pub fn new() -> Self {
        Self::with_prefetch_radius(1)
    }

    pub fn with_prefetch_radius(prefetch_radius: usize) -> Self {
        Self {
            cursor: 0,
            view: ViewState::Waiting,
            prefetch_radius,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// New epoch: back to the first slot, waiting for content
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.view = ViewState::Waiting;
    }

    /// Put a failure placeholder on screen
    pub fn fail(&mut self, number: Option<u32>, reason: impl Into<String>) {
        self.view = ViewState::Failed {
            number,
            reason: reason.into(),
        };
    }

    /// Apply the ready-page decision table. First match wins:
    ///
    /// 1. page 1 always takes over the view
    /// 2. the cursor sits on this page's slot behind a placeholder: refresh
    /// 3. it's the page right after a page being read: follow forward
    /// 4. otherwise only the page list changes
    pub fn on_page_became_ready(
        &mut self,
        store: &PageStore,
        number: u32,
    ) -> (ReadyReaction, Option<ShowOutcome>) {
        if number == 1 {
            return (ReadyReaction::JumpToFirst, self.show_page(store, 0));
        }

        let slot = (number as usize).saturating_sub(1);
        if self.cursor == slot && self.view.is_placeholder() {
            return (ReadyReaction::RefreshInPlace, self.show_page(store, self.cursor));
        }

        if slot == self.cursor + 1 && !self.view.is_placeholder() {
            return (ReadyReaction::AutoAdvance, self.show_page(store, self.cursor + 1));
        }

        (ReadyReaction::ListOnly, None)
    }

    pub fn navigate(&mut self, store: &PageStore, target: Navigate) -> Option<ShowOutcome> {
        let index = match target {
            Navigate::Prev => self.cursor.checked_sub(1)?,
            Navigate::Next => self.cursor + 1,
            Navigate::First => 0,
            Navigate::Last => store.len().checked_sub(1)?,
            Navigate::Index(index) => index,
        };
        self.show_page(store, index)
    }

    /// Show the page at `index` of the display order. Out-of-range indexes
    /// are ignored.
    pub fn show_page(&mut self, store: &PageStore, index: usize) -> Option<ShowOutcome> {
        let page = store.page_at(index)?;
        self.cursor = index;

        let mut hydrate = None;
        let mut prefetch = Vec::new();

        self.view = if page.has_content() {
            prefetch = self.neighbours_to_prefetch(store, index);
            ViewState::Showing {
                number: page.number,
            }
        } else if page.needs_hydration() {
            hydrate = Some(page.number);
            ViewState::Loading {
                number: page.number,
            }
        } else if !page.is_ready() {
            ViewState::Generating {
                number: page.number,
            }
        } else {
            ViewState::Failed {
                number: Some(page.number),
                reason: "page has no content".to_string(),
            }
        };

        Some(ShowOutcome {
            view: self.current_view(store),
            hydrate,
            prefetch,
        })
    }

    /// Content for `number` arrived. Re-renders only if the viewport is still
    /// waiting on that very page.
    pub fn on_hydrated(&mut self, store: &PageStore, number: u32) -> Option<ShowOutcome> {
        if self.view != (ViewState::Loading { number }) {
            return None;
        }
        let index = store.index_of(number)?;
        if index != self.cursor {
            return None;
        }
        self.show_page(store, index)
    }

    /// Fetching `number` failed. Returns true if the viewport was waiting on
    /// it and now shows the failure.
    pub fn on_hydration_failed(&mut self, number: u32, reason: &str) -> bool {
        if self.view != (ViewState::Loading { number }) {
            return false;
        }
        self.fail(Some(number), reason);
        true
    }

    /// Keep the cursor on the page that is on screen after the display order
    /// changed
    pub fn follow(&mut self, store: &PageStore) {
        let number = match &self.view {
            ViewState::Generating { number }
            | ViewState::Loading { number }
            | ViewState::Showing { number } => *number,
            _ => return,
        };
        if let Some(index) = store.index_of(number) {
            self.cursor = index;
        }
    }

    pub fn current_view(&self, store: &PageStore) -> PageView {
        let total = store.len();
        let page = store.page_at(self.cursor);
        let content = match self.view {
            ViewState::Showing { .. } => page.and_then(|p| p.content.clone()),
            _ => None,
        };

        PageView {
            index: self.cursor,
            total,
            number: page.map(|p| p.number),
            state: self.view.clone(),
            content,
            can_prev: total > 0 && self.cursor > 0,
            can_next: total > 0 && self.cursor + 1 < total,
        }
    }

    fn neighbours_to_prefetch(&self, store: &PageStore, index: usize) -> Vec<u32> {
        let first = index.saturating_sub(self.prefetch_radius);
        let last = (index + self.prefetch_radius).min(store.len().saturating_sub(1));

        (first..=last)
            .filter(|i| *i != index)
            .filter_map(|i| store.page_at(i))
            .filter(|p| p.needs_hydration())
            .map(|p: &Page| p.number)
            .collect()
    }
}

impl Default for ViewportNavigator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{EpochId, PageOrigin, PageReady, PageStub};

    fn store_with(numbers: &[u32]) -> PageStore {
        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            numbers
                .iter()
                .map(|n| PageStub::new(*n, PageOrigin::template(n - 1)))
                .collect(),
        );
        store
    }

    fn complete(store: &mut PageStore, number: u32) {
        store
            .apply_page_ready(PageReady::new(number, PageOrigin::template(number - 1), "img"))
            .unwrap();
    }

    #[test]
    fn test_first_page_takes_over_from_any_cursor() {
        let mut store = store_with(&[1, 2, 3]);
        let mut nav = ViewportNavigator::new();

        nav.show_page(&store, 2);
        assert_eq!(nav.view(), &ViewState::Generating { number: 3 });

        complete(&mut store, 1);
        let (reaction, outcome) = nav.on_page_became_ready(&store, 1);

        assert_eq!(reaction, ReadyReaction::JumpToFirst);
        assert_eq!(nav.cursor(), 0);
        assert_eq!(outcome.unwrap().view.state, ViewState::Showing { number: 1 });
    }

    #[test]
    fn test_refresh_in_place_when_waiting_on_that_page() {
        let mut store = store_with(&[1, 2, 3]);
        let mut nav = ViewportNavigator::new();
        nav.show_page(&store, 1);

        complete(&mut store, 2);
        let (reaction, _) = nav.on_page_became_ready(&store, 2);

        assert_eq!(reaction, ReadyReaction::RefreshInPlace);
        assert_eq!(nav.view(), &ViewState::Showing { number: 2 });
    }

    #[test]
    fn test_auto_advance_follows_reader() {
        let mut store = store_with(&[1, 2, 3]);
        let mut nav = ViewportNavigator::new();

        complete(&mut store, 1);
        nav.on_page_became_ready(&store, 1);

        complete(&mut store, 2);
        let (reaction, _) = nav.on_page_became_ready(&store, 2);

        assert_eq!(reaction, ReadyReaction::AutoAdvance);
        assert_eq!(nav.cursor(), 1);
    }

    #[test]
    fn test_no_advance_from_placeholder() {
        let mut store = store_with(&[1, 2, 3]);
        let mut nav = ViewportNavigator::new();
        nav.show_page(&store, 0);

        complete(&mut store, 2);
        let (reaction, outcome) = nav.on_page_became_ready(&store, 2);

        assert_eq!(reaction, ReadyReaction::ListOnly);
        assert!(outcome.is_none());
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn test_far_page_only_updates_list() {
        let mut store = store_with(&[1, 2, 3, 4]);
        let mut nav = ViewportNavigator::new();
        complete(&mut store, 1);
        nav.on_page_became_ready(&store, 1);

        complete(&mut store, 4);
        let (reaction, _) = nav.on_page_became_ready(&store, 4);

        assert_eq!(reaction, ReadyReaction::ListOnly);
        assert_eq!(nav.view(), &ViewState::Showing { number: 1 });
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let store = store_with(&[1, 2]);
        let mut nav = ViewportNavigator::new();
        nav.show_page(&store, 1);

        assert!(nav.show_page(&store, 5).is_none());
        assert!(nav.navigate(&store, Navigate::Next).is_none());
        assert_eq!(nav.cursor(), 1);

        nav.navigate(&store, Navigate::First);
        assert!(nav.navigate(&store, Navigate::Prev).is_none());
        assert_eq!(nav.cursor(), 0);
    }

    #[test]
    fn test_affordances() {
        let store = store_with(&[1, 2, 3]);
        let mut nav = ViewportNavigator::new();

        let first = nav.show_page(&store, 0).unwrap().view;
        assert!(!first.can_prev);
        assert!(first.can_next);

        let last = nav.navigate(&store, Navigate::Last).unwrap().view;
        assert!(last.can_prev);
        assert!(!last.can_next);
        assert_eq!(last.to_string(), "page 3 of 3");
    }

    #[test]
    fn test_hydratable_page_requests_fetch_and_neighbours_prefetch() {
        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            (1..=3)
                .map(|n| PageStub::new(n, PageOrigin::template(n - 1)).hydratable())
                .collect(),
        );
        let mut nav = ViewportNavigator::new();

        let outcome = nav.show_page(&store, 1).unwrap();
        assert_eq!(outcome.hydrate, Some(2));
        assert!(outcome.prefetch.is_empty());
        assert_eq!(nav.view(), &ViewState::Loading { number: 2 });

        store.attach_content(EpochId(1), 2, "img".into());
        let outcome = nav.on_hydrated(&store, 2).unwrap();
        assert_eq!(outcome.view.state, ViewState::Showing { number: 2 });
        assert_eq!(outcome.prefetch, vec![1, 3]);
    }

    #[test]
    fn test_hydration_failure_only_affects_waiting_view() {
        let mut nav = ViewportNavigator::new();
        assert!(!nav.on_hydration_failed(2, "timeout"));

        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            vec![PageStub::new(1, PageOrigin::template(0)).hydratable()],
        );
        nav.show_page(&store, 0);
        assert!(nav.on_hydration_failed(1, "timeout"));
        assert!(matches!(nav.view(), ViewState::Failed { number: Some(1), .. }));
    }
}
