//! Structured change records.
//!
//! Every mutation of the graph is observed exactly once, in mutation order,
//! as a [`Change`]. Each variant captures enough to apply the mutation
//! forward and to compute its inverse, so a transaction's recorded list,
//! inverted and replayed in reverse, restores the exact pre-transaction
//! state. Records are serde-serializable (the insert/remove variants carry
//! the item payload for re-insertion).

use serde::{Deserialize, Serialize};

use crate::id::ItemId;
use crate::item::Item;
use crate::prop::{ChildProp, Prop, Value};

/// One observed mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Change {
    /// A property was written.
    ValueChanged {
        item: ItemId,
        prop: Prop,
        old: Value,
        new: Value,
    },
    /// An item was inserted into a container's child or edge list.
    ElementInserted {
        parent: ItemId,
        prop: ChildProp,
        index: usize,
        item: ItemId,
    },
    /// An item was removed from a container's child or edge list.
    ElementRemoved {
        parent: ItemId,
        prop: ChildProp,
        index: usize,
        item: ItemId,
    },
    /// An item became live (entered the arena's live sets). `state` is the
    /// item as of insertion, so removal on undo is replayable.
    ItemInserted { item: ItemId, state: Box<Item> },
    /// An item was dropped from the live graph. `state` is the item as of
    /// removal, so re-insertion on undo is replayable.
    ItemRemoved { item: ItemId, state: Box<Item> },
}

impl Change {
    /// The exact inverse record: applying `change.inverse()` after `change`
    /// leaves the graph unchanged.
    pub fn inverse(&self) -> Change {
        match self {
            Change::ValueChanged {
                item,
                prop,
                old,
                new,
            } => Change::ValueChanged {
                item: *item,
                prop: *prop,
                old: new.clone(),
                new: old.clone(),
            },
            Change::ElementInserted {
                parent,
                prop,
                index,
                item,
            } => Change::ElementRemoved {
                parent: *parent,
                prop: *prop,
                index: *index,
                item: *item,
            },
            Change::ElementRemoved {
                parent,
                prop,
                index,
                item,
            } => Change::ElementInserted {
                parent: *parent,
                prop: *prop,
                index: *index,
                item: *item,
            },
            Change::ItemInserted { item, state } => Change::ItemRemoved {
                item: *item,
                state: state.clone(),
            },
            Change::ItemRemoved { item, state } => Change::ItemInserted {
                item: *item,
                state: state.clone(),
            },
        }
    }

    /// The item this change touches (for dirty tracking).
    pub fn touched(&self) -> ItemId {
        match self {
            Change::ValueChanged { item, .. } => *item,
            Change::ElementInserted { item, .. } => *item,
            Change::ElementRemoved { item, .. } => *item,
            Change::ItemInserted { item, .. } => *item,
            Change::ItemRemoved { item, .. } => *item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Edge, Item};

    fn id(index: u32) -> ItemId {
        ItemId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn value_changed_inverse_swaps_old_and_new() {
        let change = Change::ValueChanged {
            item: id(1),
            prop: Prop::X,
            old: Value::F64(0.0),
            new: Value::F64(50.0),
        };
        match change.inverse() {
            Change::ValueChanged { old, new, .. } => {
                assert_eq!(old, Value::F64(50.0));
                assert_eq!(new, Value::F64(0.0));
            }
            other => panic!("expected ValueChanged, got {:?}", other),
        }
    }

    #[test]
    fn element_insert_and_remove_are_inverses() {
        let change = Change::ElementInserted {
            parent: id(0),
            prop: ChildProp::Children,
            index: 2,
            item: id(3),
        };
        let inv = change.inverse();
        assert!(matches!(
            inv,
            Change::ElementRemoved {
                index: 2,
                prop: ChildProp::Children,
                ..
            }
        ));
        // Double inversion is the identity.
        assert!(matches!(inv.inverse(), Change::ElementInserted { index: 2, .. }));
    }

    #[test]
    fn item_insert_inverse_carries_state() {
        let edge = Item::Edge(Edge {
            id: id(4),
            parent: None,
            src: Some(id(1)),
            src_pin: 0,
            dst: Some(id(2)),
            dst_pin: 1,
        });
        let change = Change::ItemInserted {
            item: id(4),
            state: Box::new(edge),
        };
        match change.inverse() {
            Change::ItemRemoved { item, state } => {
                assert_eq!(item, id(4));
                assert_eq!(state.as_edge().unwrap().dst_pin, 1);
            }
            other => panic!("expected ItemRemoved, got {:?}", other),
        }
    }

    #[test]
    fn serde_roundtrip() {
        let change = Change::ValueChanged {
            item: id(1),
            prop: Prop::Name,
            old: Value::Str("a".into()),
            new: Value::Str("b".into()),
        };
        let json = serde_json::to_string(&change).unwrap();
        let back: Change = serde_json::from_str(&json).unwrap();
        let json2 = serde_json::to_string(&back).unwrap();
        assert_eq!(json, json2);
    }
}
