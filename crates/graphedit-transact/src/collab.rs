//! Collaborator boundaries: layout and error reporting.
//!
//! The kernel drives re-layout and error display but implements neither.
//! [`Layout`] is called once per structurally changed item after a commit;
//! [`ErrorReporter`] receives exactly one reason string per cancelled
//! transaction. Null/collecting implementations ship for tests and headless
//! use.

use graphedit_core::{ItemGraph, ItemId};

/// An opaque rectangle. The kernel only threads bounds through; it makes no
/// assumptions about geometry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Renderer/layout collaborator.
pub trait Layout {
    /// Recomputes layout for one changed item. Called after commit, once per
    /// item in the transaction's dirty set.
    fn layout(&mut self, graph: &mut ItemGraph, item: ItemId);

    /// Current bounds of an item.
    fn bounds(&self, graph: &ItemGraph, item: ItemId) -> Rect;
}

/// Layout that does nothing. For tests and headless editing.
#[derive(Debug, Default)]
pub struct NoLayout;

impl Layout for NoLayout {
    fn layout(&mut self, _graph: &mut ItemGraph, _item: ItemId) {}

    fn bounds(&self, _graph: &ItemGraph, _item: ItemId) -> Rect {
        Rect::default()
    }
}

/// Error display collaborator.
pub trait ErrorReporter {
    /// Reports one cancelled transaction's reason.
    fn report(&mut self, reason: &str);

    /// Clears any displayed error. Called at every transaction begin.
    fn clear(&mut self);
}

/// Reporter that accumulates reasons. For tests and headless editing.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    pub reports: Vec<String>,
}

impl ErrorReporter for CollectingReporter {
    fn report(&mut self, reason: &str) {
        self.reports.push(reason.to_string());
    }

    fn clear(&mut self) {
        self.reports.clear();
    }
}
