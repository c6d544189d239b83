//! Document serialization for graphedit graphs.
//!
//! The on-disk format is a JSON ownership tree of [`ItemRecord`]s with
//! document-local reference ids. Loading runs inside one editor transaction:
//! a document that fails validation leaves the editor untouched.

pub mod convert;
pub mod error;
pub mod record;

// Re-export commonly used types
pub use convert::{from_json, read, to_json, write};
pub use error::StoreError;
pub use record::ItemRecord;
