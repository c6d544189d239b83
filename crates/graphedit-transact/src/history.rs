//! Undo/redo stacks of committed transactions.
//!
//! Linear history: undo pops the newest committed [`CompoundOp`] and moves
//! it to the redo stack; redo moves it back. Any newly committed transaction
//! clears the redo stack. Replay itself (and selection restore) is driven by
//! the editor, which owns the graph.

use crate::transaction::CompoundOp;

/// LIFO undo and redo stacks.
#[derive(Debug, Default)]
pub struct HistoryManager {
    undo: Vec<CompoundOp>,
    redo: Vec<CompoundOp>,
}

impl HistoryManager {
    pub fn new() -> Self {
        HistoryManager::default()
    }

    /// Pushes a newly committed op. New edits invalidate the redo stack.
    pub fn push_committed(&mut self, op: CompoundOp) {
        self.undo.push(op);
        self.redo.clear();
    }

    /// Pops the op to undo, if any.
    pub fn pop_undo(&mut self) -> Option<CompoundOp> {
        self.undo.pop()
    }

    /// Records an undone op for redo.
    pub fn push_undone(&mut self, op: CompoundOp) {
        self.redo.push(op);
    }

    /// Pops the op to redo, if any.
    pub fn pop_redo(&mut self) -> Option<CompoundOp> {
        self.redo.pop()
    }

    /// Records a redone op for undo again. Does not clear the redo stack.
    pub fn push_redone(&mut self, op: CompoundOp) {
        self.undo.push(op);
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
