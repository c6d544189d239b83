//! The editing facade.
//!
//! [`Editor`] owns the graph and every piece of editing machinery and is the
//! only mutation surface callers see. All mutation happens inside a named
//! transaction: commands route their change records into the open
//! transaction, commit runs the consistency engine and validates, and a
//! failed validation rolls the whole transaction back and reports one reason
//! string. Committed transactions land on the history stacks.
//!
//! Mutating with no open transaction is a programmer error and panics, as
//! does committing or cancelling while idle.

use graphedit_core::{Change, ItemGraph, ItemId, PinType, Prop, PseudoKind, Value};

use crate::collab::{CollectingReporter, ErrorReporter, Layout, NoLayout};
use crate::consistency::ConsistencyEngine;
use crate::error::EditError;
use crate::history::HistoryManager;
use crate::selection::Selection;
use crate::transaction::{TransactionManager, TxnState};

/// Transactional editor over an [`ItemGraph`].
pub struct Editor<L: Layout, R: ErrorReporter> {
    graph: ItemGraph,
    txn: TransactionManager,
    history: HistoryManager,
    engine: ConsistencyEngine,
    selection: Selection,
    layout: L,
    reporter: R,
}

impl Editor<NoLayout, CollectingReporter> {
    /// An editor with no layout and a collecting reporter. For tests and
    /// non-interactive use.
    pub fn headless(root_name: &str) -> Self {
        Editor::new(root_name, NoLayout, CollectingReporter::default())
    }
}

impl<L: Layout, R: ErrorReporter> Editor<L, R> {
    pub fn new(root_name: &str, layout: L, reporter: R) -> Self {
        Editor {
            graph: ItemGraph::new(root_name),
            txn: TransactionManager::new(),
            history: HistoryManager::new(),
            engine: ConsistencyEngine::new(),
            selection: Selection::new(),
            layout,
            reporter,
        }
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn graph(&self) -> &ItemGraph {
        &self.graph
    }

    pub fn root(&self) -> ItemId {
        self.graph.root()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn txn_state(&self) -> TxnState {
        self.txn.state()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn read_value(&self, item: ItemId, prop: Prop) -> Result<Value, EditError> {
        Ok(self.graph.read_prop(item, prop)?)
    }

    /// The value of `(item, prop)` as of transaction start. Valid only
    /// inside a transaction; panics while idle.
    pub fn old_value(&self, item: ItemId, prop: Prop) -> Value {
        self.txn.old_value(&self.graph, item, prop)
    }

    // -----------------------------------------------------------------------
    // Item factories -- allocation only; `add_item` makes the item live
    // -----------------------------------------------------------------------

    pub fn new_plain(&mut self, name: &str, inputs: Vec<PinType>, outputs: Vec<PinType>) -> ItemId {
        self.graph.new_plain(name, inputs, outputs)
    }

    pub fn new_modifier(
        &mut self,
        name: &str,
        inputs: Vec<PinType>,
        outputs: Vec<PinType>,
    ) -> ItemId {
        self.graph.new_modifier(name, inputs, outputs)
    }

    pub fn new_instance(&mut self, source: Option<ItemId>) -> ItemId {
        self.graph.new_instance(source)
    }

    pub fn new_pseudo(&mut self, kind: PseudoKind, ty: PinType) -> ItemId {
        self.graph.new_pseudo(kind, ty)
    }

    pub fn new_container(&mut self, name: &str) -> ItemId {
        self.graph.new_container(name)
    }

    /// Allocates an edge with explicit, possibly unattached endpoints. Most
    /// callers want [`connect`](Self::connect); this is the raw factory the
    /// deserializer and drag gestures use.
    pub fn new_edge(
        &mut self,
        src: Option<ItemId>,
        src_pin: u32,
        dst: Option<ItemId>,
        dst_pin: u32,
    ) -> ItemId {
        self.graph.new_edge(src, src_pin, dst, dst_pin)
    }

    // -----------------------------------------------------------------------
    // Commands -- require an open transaction
    // -----------------------------------------------------------------------

    /// Writes a property inside the open transaction.
    pub fn set_value(&mut self, item: ItemId, prop: Prop, value: Value) -> Result<(), EditError> {
        self.assert_open("set_value");
        let change = self.graph.write_prop(item, prop, value)?;
        self.txn.record(change);
        Ok(())
    }

    /// Attaches `item` to `parent`, making it live on first attachment and
    /// reparenting (position-preserving) otherwise.
    pub fn add_item(&mut self, item: ItemId, parent: ItemId) -> Result<(), EditError> {
        self.assert_open("add_item");
        let changes = self.graph.add_item(item, parent)?;
        self.record_all(changes);
        Ok(())
    }

    /// Removes `item` and everything it owns. References into the removed
    /// subtree dangle until commit repairs them.
    pub fn remove_item(&mut self, item: ItemId) -> Result<(), EditError> {
        self.assert_open("remove_item");
        let changes = self.graph.remove_item(item)?;
        self.selection.remove(item);
        self.record_all(changes);
        Ok(())
    }

    /// Wires `src`'s output pin to `dst`'s input pin. An input pin holds at
    /// most one edge, so an occupant edge on `(dst, dst_pin)` is replaced.
    /// Returns the new edge, owned by the endpoints' lowest common ancestor.
    pub fn connect(
        &mut self,
        src: ItemId,
        src_pin: u32,
        dst: ItemId,
        dst_pin: u32,
    ) -> Result<ItemId, EditError> {
        self.assert_open("connect");
        let occupant = self.graph.edges().iter().copied().find(|&edge_id| {
            self.graph
                .item(edge_id)
                .and_then(|it| it.as_edge())
                .map_or(false, |e| e.dst == Some(dst) && e.dst_pin == dst_pin)
        });
        if let Some(old) = occupant {
            let changes = self.graph.remove_item(old)?;
            self.record_all(changes);
        }
        let edge = self.graph.new_edge(Some(src), src_pin, Some(dst), dst_pin);
        let owner = self
            .graph
            .lowest_common_ancestor(src, dst)
            .unwrap_or_else(|| self.graph.root());
        let changes = self.graph.add_item(edge, owner)?;
        self.record_all(changes);
        Ok(edge)
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Opens a named transaction. A `begin` while one is open warns and is
    /// ignored. Clears any displayed error.
    pub fn begin_transaction(&mut self, name: &str) -> bool {
        self.reporter.clear();
        self.txn.begin(name, self.selection.to_vec())
    }

    /// Repairs, validates and commits the open transaction. On a validation
    /// failure the transaction rolls back completely, the reason is
    /// reported, and `Err` is returned; the graph is in its exact
    /// pre-transaction state. Panics while idle.
    pub fn end_transaction(&mut self) -> Result<(), EditError> {
        self.assert_open("end_transaction");
        let repairs = self.engine.make_consistent(&mut self.graph);
        self.record_all(repairs);
        if let Err(err) = self.engine.validate(&self.graph) {
            let reason = err.to_string();
            self.rollback();
            self.reporter.report(&reason);
            return Err(err);
        }
        let dirty = self.txn.drain_dirty();
        let op = self.txn.commit(self.selection.to_vec());
        tracing::debug!(name = %op.name, changes = op.changes.len(), "commit");
        self.history.push_committed(op);
        for item in dirty {
            if self.graph.item(item).is_some() {
                self.layout.layout(&mut self.graph, item);
            }
        }
        Ok(())
    }

    /// Abandons the open transaction, rolling every change back and
    /// restoring the selection as of `begin`. Panics while idle.
    pub fn cancel_transaction(&mut self) {
        self.assert_open("cancel_transaction");
        self.rollback();
    }

    /// Rolls back by replaying inverses in reverse, then repairs derived
    /// state. The pre-transaction state was consistent, so the repair pass
    /// records nothing persistent. The selection comes back from the
    /// begin-time snapshot; commands such as `remove_item` deselect eagerly,
    /// and the replay just restored any item they deselected.
    fn rollback(&mut self) {
        let (changes, selection_before) = self.txn.cancel();
        for change in changes.iter().rev() {
            self.graph
                .apply(&change.inverse())
                .expect("rollback replays recorded changes");
        }
        self.engine.make_consistent(&mut self.graph);
        self.selection.set_from(&selection_before);
        self.prune_selection();
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Undoes the most recent committed transaction. Returns `false` when
    /// there is nothing to undo or a transaction is open.
    pub fn undo(&mut self) -> bool {
        if self.txn.is_open() {
            tracing::warn!("undo with a transaction open; ignored");
            return false;
        }
        let op = match self.history.pop_undo() {
            Some(op) => op,
            None => return false,
        };
        for change in op.changes.iter().rev() {
            self.graph
                .apply(&change.inverse())
                .expect("undo replays recorded changes");
        }
        self.engine.make_consistent(&mut self.graph);
        self.selection.set_from(&op.selection_before);
        self.prune_selection();
        tracing::debug!(name = %op.name, "undo");
        self.history.push_undone(op);
        true
    }

    /// Re-applies the most recently undone transaction. Returns `false` when
    /// there is nothing to redo or a transaction is open.
    pub fn redo(&mut self) -> bool {
        if self.txn.is_open() {
            tracing::warn!("redo with a transaction open; ignored");
            return false;
        }
        let op = match self.history.pop_redo() {
            Some(op) => op,
            None => return false,
        };
        for change in &op.changes {
            self.graph
                .apply(change)
                .expect("redo replays recorded changes");
        }
        self.engine.make_consistent(&mut self.graph);
        self.selection.set_from(&op.selection_after);
        self.prune_selection();
        tracing::debug!(name = %op.name, "redo");
        self.history.push_redone(op);
        true
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn record_all(&mut self, changes: Vec<Change>) {
        for change in changes {
            self.txn.record(change);
        }
    }

    fn assert_open(&self, op: &str) {
        assert!(
            self.txn.is_open(),
            "{} called with no open transaction",
            op
        );
    }

    /// Drops selected ids that no longer resolve after a replay.
    fn prune_selection(&mut self) {
        let live: Vec<ItemId> = self
            .selection
            .iter()
            .filter(|&id| self.graph.item(id).is_some())
            .collect();
        self.selection.set_from(&live);
    }
}
