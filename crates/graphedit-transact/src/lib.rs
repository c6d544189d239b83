pub mod collab;
pub mod consistency;
pub mod editor;
pub mod error;
pub mod history;
pub mod selection;
pub mod transaction;

// Re-export commonly used types
pub use collab::{CollectingReporter, ErrorReporter, Layout, NoLayout, Rect};
pub use consistency::ConsistencyEngine;
pub use editor::Editor;
pub use error::EditError;
pub use history::HistoryManager;
pub use selection::Selection;
pub use transaction::{CompoundOp, TransactionManager, TxnState};
