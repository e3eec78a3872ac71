//! # Manual Reorder
//!
//! Board of page cards grouped into columns (template pages, item pages).
//! Cards move only inside their own column; the linear page sequence is the
//! columns read one after the other.

use crate::errors::{EngineError, EngineResult};
use crate::page::PageGroup;
use crate::store::PageStore;
use std::collections::HashSet;

const COLUMN_ORDER: [PageGroup; 2] = [PageGroup::Template, PageGroup::Item];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub group: PageGroup,
    pub cards: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderBoard {
    columns: Vec<Column>,
}

impl ReorderBoard {
    /// Lay out the store's pages, keeping the current display order inside
    /// each column
    pub fn from_store(store: &PageStore) -> Self {
        let columns = COLUMN_ORDER
            .iter()
            .map(|group| Column {
                group: *group,
                cards: store
                    .pages_in_display_order()
                    .filter(|p| p.origin.group() == *group)
                    .map(|p| p.number)
                    .collect(),
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, group: PageGroup) -> &[u32] {
        self.columns
            .iter()
            .find(|c| c.group == group)
            .map(|c| c.cards.as_slice())
            .unwrap_or(&[])
    }

    /// Move a card to `to_index` within its own column. Indexes past the
    /// end drop the card at the bottom.
    pub fn move_card(&mut self, number: u32, to_index: usize) -> EngineResult<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.cards.contains(&number))
            .ok_or(EngineError::UnknownPage(number))?;

        let from = column
            .cards
            .iter()
            .position(|n| *n == number)
            .ok_or(EngineError::UnknownPage(number))?;
        let card = column.cards.remove(from);
        let to = to_index.min(column.cards.len());
        column.cards.insert(to, card);

        Ok(())
    }

    /// Drop a card into `group` at `to_index`. Cross-column drops are
    /// rejected: a page's group is fixed by its origin.
    pub fn drop_card(&mut self, number: u32, group: PageGroup, to_index: usize) -> EngineResult<()> {
        let current = self
            .columns
            .iter()
            .find(|c| c.cards.contains(&number))
            .map(|c| c.group)
            .ok_or(EngineError::UnknownPage(number))?;

        if current != group {
            return Err(EngineError::ReorderRejected(format!(
                "page {} cannot leave the {:?} column",
                number, current
            )));
        }

        self.move_card(number, to_index)
    }

    /// Linear page sequence in board order
    pub fn sequence(&self) -> Vec<u32> {
        self.columns
            .iter()
            .flat_map(|c| c.cards.iter().copied())
            .collect()
    }
}

/// A usable reorder sequence names each page at most once
pub fn validate_sequence(sequence: &[u32]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(sequence.len());
    for number in sequence {
        if !seen.insert(*number) {
            return Err(EngineError::ReorderRejected(format!(
                "page {} appears twice",
                number
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{EpochId, PageOrigin, PageStub};

    fn mixed_store() -> PageStore {
        let mut store = PageStore::new();
        store.begin_epoch(
            EpochId(1),
            vec![
                PageStub::new(1, PageOrigin::template(0)),
                PageStub::new(2, PageOrigin::template(1)),
                PageStub::new(3, PageOrigin::item("p1", 0)),
                PageStub::new(4, PageOrigin::item("p2", 0)),
                PageStub::new(5, PageOrigin::template(2)),
            ],
        );
        store
    }

    #[test]
    fn test_board_groups_pages() {
        let board = ReorderBoard::from_store(&mixed_store());

        assert_eq!(board.column(PageGroup::Template), &[1, 2, 5]);
        assert_eq!(board.column(PageGroup::Item), &[3, 4]);
        assert_eq!(board.sequence(), vec![1, 2, 5, 3, 4]);
    }

    #[test]
    fn test_move_within_column() {
        let mut board = ReorderBoard::from_store(&mixed_store());

        board.move_card(4, 0).unwrap();
        board.move_card(5, 0).unwrap();

        assert_eq!(board.sequence(), vec![5, 1, 2, 4, 3]);
    }

    #[test]
    fn test_move_past_end_goes_last() {
        let mut board = ReorderBoard::from_store(&mixed_store());
        board.move_card(1, 99).unwrap();
        assert_eq!(board.column(PageGroup::Template), &[2, 5, 1]);
    }

    #[test]
    fn test_cross_column_drop_rejected() {
        let mut board = ReorderBoard::from_store(&mixed_store());
        let before = board.clone();

        let result = board.drop_card(3, PageGroup::Template, 0);
        assert!(matches!(result, Err(EngineError::ReorderRejected(_))));
        assert_eq!(board, before);
    }

    #[test]
    fn test_unknown_card() {
        let mut board = ReorderBoard::from_store(&mixed_store());
        assert_eq!(board.move_card(42, 0), Err(EngineError::UnknownPage(42)));
    }

    #[test]
    fn test_validate_sequence() {
        assert!(validate_sequence(&[3, 1, 2]).is_ok());
        assert!(validate_sequence(&[3, 1, 3]).is_err());
    }
}
