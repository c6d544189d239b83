//! The transaction manager.
//!
//! Batches mutations into a named, atomic transaction. Every observed
//! [`Change`] appends to an ordered change list; the first touch of each
//! `(item, property)` pair snapshots its pre-transaction value, so
//! [`old_value`](TransactionManager::old_value) is stable for the whole
//! transaction no matter how many times the property is rewritten (the
//! "delta from gesture start" read a drag performs every frame).
//!
//! Nesting is unsupported by design: a `begin` while a transaction is open
//! warns and is ignored, and never touches the open transaction's change
//! list. Reading an old value or committing while idle is a programmer
//! error and panics.

use std::collections::HashMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use graphedit_core::{Change, ItemGraph, ItemId, Prop, Value};

/// Transaction life-cycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Idle,
    InTransaction,
    Committing,
    Cancelling,
}

/// A committed transaction, frozen for history replay: the ordered change
/// list plus the selections bracketing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompoundOp {
    pub name: String,
    pub changes: Vec<Change>,
    /// Selection when the transaction began; restored by undo.
    pub selection_before: Vec<ItemId>,
    /// Selection at commit; restored by redo.
    pub selection_after: Vec<ItemId>,
}

/// Records changes between `begin` and commit/cancel.
#[derive(Debug, Default)]
pub struct TransactionManager {
    state: Option<Txn>,
    committing: bool,
    cancelling: bool,
}

#[derive(Debug)]
struct Txn {
    name: String,
    changes: Vec<Change>,
    old_values: HashMap<(ItemId, Prop), Value>,
    selection_before: Vec<ItemId>,
    dirty: IndexSet<ItemId>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager::default()
    }

    pub fn state(&self) -> TxnState {
        if self.committing {
            TxnState::Committing
        } else if self.cancelling {
            TxnState::Cancelling
        } else if self.state.is_some() {
            TxnState::InTransaction
        } else {
            TxnState::Idle
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Opens a transaction. Returns `false` (after a warning) if one is
    /// already open; the open transaction is untouched.
    pub fn begin(&mut self, name: &str, selection_before: Vec<ItemId>) -> bool {
        if let Some(open) = &self.state {
            tracing::warn!(
                open = %open.name,
                ignored = %name,
                "begin_transaction while a transaction is open; ignored"
            );
            return false;
        }
        self.state = Some(Txn {
            name: name.to_string(),
            changes: Vec::new(),
            old_values: HashMap::new(),
            selection_before,
            dirty: IndexSet::new(),
        });
        true
    }

    /// Appends an observed change, snapshotting first-touch old values and
    /// marking touched items dirty.
    pub fn record(&mut self, change: Change) {
        let txn = self
            .state
            .as_mut()
            .expect("change recorded with no open transaction");
        if let Change::ValueChanged {
            item, prop, old, ..
        } = &change
        {
            txn.old_values
                .entry((*item, *prop))
                .or_insert_with(|| old.clone());
        }
        txn.dirty.insert(change.touched());
        if let Change::ElementInserted { parent, .. } | Change::ElementRemoved { parent, .. } =
            &change
        {
            txn.dirty.insert(*parent);
        }
        txn.changes.push(change);
    }

    /// The value of `(item, prop)` as of transaction start: the first-touch
    /// snapshot, or the live value if untouched this transaction.
    ///
    /// Panics while idle -- valid only inside a transaction.
    pub fn old_value(&self, graph: &ItemGraph, item: ItemId, prop: Prop) -> Value {
        let txn = self
            .state
            .as_ref()
            .expect("old_value called with no open transaction");
        if let Some(value) = txn.old_values.get(&(item, prop)) {
            return value.clone();
        }
        graph
            .read_prop(item, prop)
            .expect("old_value: item not live and property untouched")
    }

    /// The changes recorded so far, in mutation order.
    pub fn changes(&self) -> &[Change] {
        self.state.as_ref().map_or(&[], |txn| txn.changes.as_slice())
    }

    /// Takes the accumulated dirty set.
    pub fn drain_dirty(&mut self) -> Vec<ItemId> {
        self.state
            .as_mut()
            .map_or_else(Vec::new, |txn| txn.dirty.drain(..).collect())
    }

    /// Freezes the transaction into a [`CompoundOp`] and returns to idle.
    /// Panics while idle.
    pub fn commit(&mut self, selection_after: Vec<ItemId>) -> CompoundOp {
        self.committing = true;
        let txn = self
            .state
            .take()
            .expect("commit called with no open transaction");
        self.committing = false;
        CompoundOp {
            name: txn.name,
            changes: txn.changes,
            selection_before: txn.selection_before,
            selection_after,
        }
    }

    /// Drops the transaction, returning its change list for rollback along
    /// with the selection as of `begin`, so the caller can restore it too.
    /// Panics while idle.
    pub fn cancel(&mut self) -> (Vec<Change>, Vec<ItemId>) {
        self.cancelling = true;
        let txn = self
            .state
            .take()
            .expect("cancel called with no open transaction");
        self.cancelling = false;
        (txn.changes, txn.selection_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphedit_core::PinType;

    fn graph_with_node() -> (ItemGraph, ItemId) {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let n = graph.new_plain("n", vec![PinType(0)], vec![]);
        graph.add_item(n, root).unwrap();
        (graph, n)
    }

    #[test]
    fn begin_while_open_is_ignored() {
        let mut txn = TransactionManager::new();
        assert!(txn.begin("first", Vec::new()));
        assert!(!txn.begin("second", Vec::new()));
        assert_eq!(txn.state(), TxnState::InTransaction);
        let op = txn.commit(Vec::new());
        assert_eq!(op.name, "first");
    }

    #[test]
    fn old_value_is_first_touch_snapshot() {
        let (mut graph, n) = graph_with_node();
        let mut txn = TransactionManager::new();
        txn.begin("move", Vec::new());

        txn.record(graph.write_prop(n, Prop::X, Value::F64(10.0)).unwrap());
        txn.record(graph.write_prop(n, Prop::X, Value::F64(20.0)).unwrap());
        txn.record(graph.write_prop(n, Prop::X, Value::F64(30.0)).unwrap());

        // Stable across any number of writes.
        assert_eq!(txn.old_value(&graph, n, Prop::X), Value::F64(0.0));
        // Untouched properties read live.
        assert_eq!(txn.old_value(&graph, n, Prop::Y), Value::F64(0.0));
    }

    #[test]
    #[should_panic(expected = "no open transaction")]
    fn old_value_while_idle_panics() {
        let (graph, n) = graph_with_node();
        let txn = TransactionManager::new();
        txn.old_value(&graph, n, Prop::X);
    }

    #[test]
    #[should_panic(expected = "no open transaction")]
    fn commit_while_idle_panics() {
        let mut txn = TransactionManager::new();
        txn.commit(Vec::new());
    }

    #[test]
    fn cancel_returns_the_begin_time_selection() {
        let (mut graph, n) = graph_with_node();
        let mut txn = TransactionManager::new();
        txn.begin("delete", vec![n]);
        txn.record(graph.write_prop(n, Prop::X, Value::F64(5.0)).unwrap());
        let (changes, selection_before) = txn.cancel();
        assert_eq!(changes.len(), 1);
        assert_eq!(selection_before, vec![n]);
        assert_eq!(txn.state(), TxnState::Idle);
    }

    #[test]
    fn dirty_set_accumulates_touched_items() {
        let (mut graph, n) = graph_with_node();
        let mut txn = TransactionManager::new();
        txn.begin("edit", Vec::new());
        txn.record(graph.write_prop(n, Prop::X, Value::F64(1.0)).unwrap());
        txn.record(graph.write_prop(n, Prop::X, Value::F64(2.0)).unwrap());
        let dirty = txn.drain_dirty();
        assert_eq!(dirty, vec![n]);
    }
}
