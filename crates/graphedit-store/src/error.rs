//! Store failure modes.

use thiserror::Error;

use graphedit_transact::EditError;

/// Errors raised while writing or reading a document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document names an item type this kernel does not know.
    #[error("unknown item type '{0}'")]
    UnknownTypeName(String),

    /// A reference names a document id no record carries.
    #[error("unknown item id {0}")]
    UnknownId(u32),

    /// Two records carry the same document id.
    #[error("duplicate item id {0}")]
    DuplicateId(u32),

    /// A required field is missing or has the wrong shape.
    #[error("field '{field}' missing or mistyped on item {id}")]
    BadField { id: u32, field: String },

    /// The document root record is not a container.
    #[error("document root must be a container, got '{0}'")]
    BadRoot(String),

    /// The loaded graph failed validation; the editor rolled it back.
    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
