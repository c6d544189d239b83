//! Ordered item selection.
//!
//! An insertion-ordered id set: re-adding an item moves it to the end, so
//! the last element is always the most recently selected. The history
//! manager snapshots and restores selections across undo/redo.

use indexmap::IndexSet;

use graphedit_core::ItemId;

/// The current selection, in selection order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    items: IndexSet<ItemId>,
}

impl Selection {
    pub fn new() -> Self {
        Selection::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: ItemId) -> bool {
        self.items.contains(&item)
    }

    /// Adds an item, moving it to the end if already selected.
    pub fn add(&mut self, item: ItemId) {
        self.items.shift_remove(&item);
        self.items.insert(item);
    }

    pub fn remove(&mut self, item: ItemId) -> bool {
        self.items.shift_remove(&item)
    }

    /// Adds if absent, removes if present.
    pub fn toggle(&mut self, item: ItemId) {
        if !self.remove(item) {
            self.items.insert(item);
        }
    }

    /// The most recently selected item.
    pub fn last(&self) -> Option<ItemId> {
        self.items.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Snapshot in selection order.
    pub fn to_vec(&self) -> Vec<ItemId> {
        self.items.iter().copied().collect()
    }

    /// Replaces the selection with a snapshot.
    pub fn set_from(&mut self, items: &[ItemId]) {
        self.items.clear();
        self.items.extend(items.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> ItemId {
        ItemId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn add_tracks_last_selected() {
        let mut sel = Selection::new();
        sel.add(id(1));
        sel.add(id(2));
        assert_eq!(sel.last(), Some(id(2)));
        // Re-adding moves to the end.
        sel.add(id(1));
        assert_eq!(sel.last(), Some(id(1)));
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut sel = Selection::new();
        sel.toggle(id(3));
        assert!(sel.contains(id(3)));
        sel.toggle(id(3));
        assert!(!sel.contains(id(3)));
    }

    #[test]
    fn snapshot_roundtrip_preserves_order() {
        let mut sel = Selection::new();
        sel.add(id(2));
        sel.add(id(0));
        sel.add(id(7));
        let snap = sel.to_vec();
        sel.clear();
        sel.set_from(&snap);
        assert_eq!(sel.to_vec(), snap);
        assert_eq!(sel.last(), Some(id(7)));
    }
}
