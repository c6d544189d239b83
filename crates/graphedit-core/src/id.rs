//! Stable item identity and the generational arena backing it.
//!
//! [`ItemId`] is the only durable cross-reference key in the kernel. Reference
//! fields on items hold an `ItemId`, never a pointer, so references survive
//! clone and serialize round trips. Ids are resolved through [`Arena`], a
//! dense slot table with generation counters: a stale id (one whose item was
//! removed) resolves to `None`, even if the slot has since been reused for a
//! new item.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity for any item (node or edge) in the graph.
///
/// The `index` addresses a slot in the [`Arena`]; the `generation` must match
/// the slot's current generation for the id to resolve. Assigned once on
/// construction and stable for the item's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// One arena slot: the current generation plus the occupant, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Dense id-to-item table with generation counters.
///
/// Freed slots go on a free list and are handed out again with a bumped
/// generation, so an id held across its item's removal never resolves to the
/// slot's new occupant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T> Arena<T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Arena {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the arena holds no live items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocates a slot for `value` and returns its id.
    pub fn insert(&mut self, value: T) -> ItemId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.value = Some(value);
            return ItemId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ItemId {
            index,
            generation: 0,
        }
    }

    /// Allocates a slot and builds the value from the id it will occupy, so
    /// items can carry their own id.
    pub fn insert_with(&mut self, build: impl FnOnce(ItemId) -> T) -> ItemId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let generation = self.slots[index as usize].generation + 1;
            let id = ItemId { index, generation };
            let slot = &mut self.slots[index as usize];
            slot.generation = generation;
            slot.value = Some(build(id));
            return id;
        }
        let id = ItemId {
            index: self.slots.len() as u32,
            generation: 0,
        };
        self.slots.push(Slot {
            generation: 0,
            value: Some(build(id)),
        });
        id
    }

    /// Resolves an id to its item. Returns `None` for stale or never-issued
    /// ids -- never panics, never resolves to a reused slot's new occupant.
    pub fn get(&self, id: ItemId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.value.as_mut()
    }

    /// Returns `true` if `id` resolves to a live item.
    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Removes and returns the item at `id`. The slot is freed for reuse
    /// under a new generation; `id` will no longer resolve.
    pub fn remove(&mut self, id: ItemId) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(id.index);
        self.len -= 1;
        Some(value)
    }

    /// Re-occupies the exact slot an id names, restoring its generation.
    ///
    /// Used by history replay: a change record that re-inserts a removed item
    /// must bring it back under its original id so every other record that
    /// references the id stays valid. Panics if the slot is occupied --
    /// replay order guarantees vacancy, so occupancy is a programmer error.
    pub fn restore(&mut self, id: ItemId, value: T) {
        let slot = &mut self.slots[id.index as usize];
        assert!(
            slot.value.is_none(),
            "restore into occupied arena slot {}",
            id.index
        );
        slot.generation = id.generation;
        slot.value = Some(value);
        self.free.retain(|&i| i != id.index);
        self.len += 1;
    }

    /// Iterates over all live `(id, item)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ItemId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
