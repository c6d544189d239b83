//! Core error types.
//!
//! Structured, matchable variants via `thiserror`. These cover misdirected
//! graph operations (stale ids, wrong item kinds); transaction validation
//! failures are reported by the transact crate, not here.

use thiserror::Error;

use crate::id::ItemId;

/// Errors produced by the core item graph.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An id did not resolve to a live item.
    #[error("item not found: {id}")]
    ItemNotFound { id: ItemId },

    /// An operation required a container but the id named another variant.
    #[error("item {id} is not a container")]
    NotAContainer { id: ItemId },

    /// An element was not present in its parent's child/edge list where a
    /// structural change expected it.
    #[error("item {id} is not an element of container {parent}")]
    NotAnElement { id: ItemId, parent: ItemId },

    /// An attachment would make an item its own ancestor.
    #[error("attaching {item} under {parent} would create an ownership cycle")]
    OwnershipCycle { item: ItemId, parent: ItemId },
}
