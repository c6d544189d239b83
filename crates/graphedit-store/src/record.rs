//! The document record format.
//!
//! A document is a tree of [`ItemRecord`]s mirroring the ownership tree.
//! Cross-references (edge endpoints, modifier targets, instance sources) are
//! document-local integer ids under `refs`, so the format is self-contained
//! and independent of arena slot layout. Derived state (signatures, flags,
//! adjacency) is never written; the consistency engine recomputes it on
//! load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One item, serialized. Kind-specific scalar fields (`name`, `x`,
/// `inputs`, ...) flatten into the record body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    /// Document-local id, unique within one document.
    pub id: u32,
    #[serde(flatten)]
    pub scalars: BTreeMap<String, serde_json::Value>,
    /// Reference fields, by field name, as document-local ids.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<String, u32>,
    /// Owned child nodes, container records only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ItemRecord>,
    /// Owned edges, container records only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<ItemRecord>,
}

impl ItemRecord {
    pub fn new(type_name: &str, id: u32) -> Self {
        ItemRecord {
            type_name: type_name.to_string(),
            id,
            scalars: BTreeMap::new(),
            refs: BTreeMap::new(),
            children: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub(crate) fn set(&mut self, field: &str, value: serde_json::Value) {
        self.scalars.insert(field.to_string(), value);
    }
}
