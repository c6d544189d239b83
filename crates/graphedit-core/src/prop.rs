//! Property identifiers and tagged values.
//!
//! Every mutable field on an item is named by a [`Prop`]; the two owned
//! ordered lists on a container are named by [`ChildProp`]. Reads and writes
//! go through [`Item::get_prop`] / [`Item::set_prop`], which return the
//! previous value so the caller can build a change record -- the explicit
//! command-function replacement for property-interception setters.
//!
//! A `(item, prop)` pairing that does not exist (e.g. `EdgeSrc` on a plain
//! node) is a programmer error, not a data error, and panics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::ItemId;
use crate::item::{Item, Signature};

/// Names one mutable field on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prop {
    /// Horizontal position, local to the parent. All node variants.
    X,
    /// Vertical position, local to the parent. All node variants.
    Y,
    /// Display name. Plain, modifier and container items.
    Name,
    /// Edge source reference.
    EdgeSrc,
    /// Edge source pin index.
    EdgeSrcPin,
    /// Edge destination reference.
    EdgeDst,
    /// Edge destination pin index.
    EdgeDstPin,
    /// Modifier target reference.
    ModifierTarget,
    /// Instance source reference (the instantiated container).
    InstanceSource,
    /// Derived container flag: no concrete interior nodes.
    IsAbstract,
    /// Derived container flag: every interior input pin wired.
    IsClosed,
    /// Derived container signature.
    Sig,
}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Prop::X => "x",
            Prop::Y => "y",
            Prop::Name => "name",
            Prop::EdgeSrc => "src",
            Prop::EdgeSrcPin => "src_pin",
            Prop::EdgeDst => "dst",
            Prop::EdgeDstPin => "dst_pin",
            Prop::ModifierTarget => "target",
            Prop::InstanceSource => "source",
            Prop::IsAbstract => "is_abstract",
            Prop::IsClosed => "is_closed",
            Prop::Sig => "signature",
        };
        write!(f, "{}", name)
    }
}

/// Names one owned ordered list on a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChildProp {
    Children,
    Edges,
}

/// A tagged field value, covering every [`Prop`]'s type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    F64(f64),
    Str(String),
    Bool(bool),
    U32(u32),
    OptId(Option<ItemId>),
    Sig(Signature),
}

impl Value {
    /// Unwraps an `F64`. Panics on any other variant (programmer error).
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::F64(v) => *v,
            other => panic!("expected F64 value, got {:?}", other),
        }
    }

    /// Unwraps an `OptId`. Panics on any other variant (programmer error).
    pub fn as_opt_id(&self) -> Option<ItemId> {
        match self {
            Value::OptId(v) => *v,
            other => panic!("expected OptId value, got {:?}", other),
        }
    }
}

fn bad_pair(item: &Item, prop: Prop) -> ! {
    panic!(
        "property '{}' does not exist on {} item {}",
        prop,
        item.type_name(),
        item.id()
    )
}

fn bad_value(prop: Prop, value: &Value) -> ! {
    panic!("wrong value variant {:?} for property '{}'", value, prop)
}

impl Item {
    /// Reads a property value. Panics if the property does not exist on this
    /// item variant.
    pub fn get_prop(&self, prop: Prop) -> Value {
        match (self, prop) {
            (Item::Plain(n), Prop::X) => Value::F64(n.x),
            (Item::Plain(n), Prop::Y) => Value::F64(n.y),
            (Item::Plain(n), Prop::Name) => Value::Str(n.name.clone()),
            (Item::Modifier(n), Prop::X) => Value::F64(n.x),
            (Item::Modifier(n), Prop::Y) => Value::F64(n.y),
            (Item::Modifier(n), Prop::Name) => Value::Str(n.name.clone()),
            (Item::Modifier(n), Prop::ModifierTarget) => Value::OptId(n.target),
            (Item::Instance(n), Prop::X) => Value::F64(n.x),
            (Item::Instance(n), Prop::Y) => Value::F64(n.y),
            (Item::Instance(n), Prop::InstanceSource) => Value::OptId(n.source),
            (Item::Pseudo(n), Prop::X) => Value::F64(n.x),
            (Item::Pseudo(n), Prop::Y) => Value::F64(n.y),
            (Item::Container(n), Prop::X) => Value::F64(n.x),
            (Item::Container(n), Prop::Y) => Value::F64(n.y),
            (Item::Container(n), Prop::Name) => Value::Str(n.name.clone()),
            (Item::Container(n), Prop::IsAbstract) => Value::Bool(n.is_abstract),
            (Item::Container(n), Prop::IsClosed) => Value::Bool(n.is_closed),
            (Item::Container(n), Prop::Sig) => Value::Sig(n.signature.clone()),
            (Item::Edge(n), Prop::EdgeSrc) => Value::OptId(n.src),
            (Item::Edge(n), Prop::EdgeSrcPin) => Value::U32(n.src_pin),
            (Item::Edge(n), Prop::EdgeDst) => Value::OptId(n.dst),
            (Item::Edge(n), Prop::EdgeDstPin) => Value::U32(n.dst_pin),
            (item, prop) => bad_pair(item, prop),
        }
    }

    /// Writes a property value and returns the previous one. Panics if the
    /// property does not exist on this item variant or the value variant
    /// does not match.
    pub fn set_prop(&mut self, prop: Prop, value: Value) -> Value {
        macro_rules! scalar {
            ($field:expr, $variant:ident) => {{
                match value {
                    Value::$variant(v) => {
                        let old = std::mem::replace(&mut $field, v);
                        Value::$variant(old)
                    }
                    ref other => bad_value(prop, other),
                }
            }};
        }
        match (&mut *self, prop) {
            (Item::Plain(n), Prop::X) => scalar!(n.x, F64),
            (Item::Plain(n), Prop::Y) => scalar!(n.y, F64),
            (Item::Plain(n), Prop::Name) => scalar!(n.name, Str),
            (Item::Modifier(n), Prop::X) => scalar!(n.x, F64),
            (Item::Modifier(n), Prop::Y) => scalar!(n.y, F64),
            (Item::Modifier(n), Prop::Name) => scalar!(n.name, Str),
            (Item::Modifier(n), Prop::ModifierTarget) => scalar!(n.target, OptId),
            (Item::Instance(n), Prop::X) => scalar!(n.x, F64),
            (Item::Instance(n), Prop::Y) => scalar!(n.y, F64),
            (Item::Instance(n), Prop::InstanceSource) => scalar!(n.source, OptId),
            (Item::Pseudo(n), Prop::X) => scalar!(n.x, F64),
            (Item::Pseudo(n), Prop::Y) => scalar!(n.y, F64),
            (Item::Container(n), Prop::X) => scalar!(n.x, F64),
            (Item::Container(n), Prop::Y) => scalar!(n.y, F64),
            (Item::Container(n), Prop::Name) => scalar!(n.name, Str),
            (Item::Container(n), Prop::IsAbstract) => scalar!(n.is_abstract, Bool),
            (Item::Container(n), Prop::IsClosed) => scalar!(n.is_closed, Bool),
            (Item::Container(n), Prop::Sig) => scalar!(n.signature, Sig),
            (Item::Edge(n), Prop::EdgeSrc) => scalar!(n.src, OptId),
            (Item::Edge(n), Prop::EdgeSrcPin) => scalar!(n.src_pin, U32),
            (Item::Edge(n), Prop::EdgeDst) => scalar!(n.dst, OptId),
            (Item::Edge(n), Prop::EdgeDstPin) => scalar!(n.dst_pin, U32),
            (item, prop) => bad_pair(item, prop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{PinType, PlainNode};

    fn plain() -> Item {
        Item::Plain(PlainNode {
            id: ItemId {
                index: 0,
                generation: 0,
            },
            parent: None,
            name: "n".into(),
            x: 1.0,
            y: 2.0,
            inputs: vec![PinType(0)],
            outputs: vec![PinType(0)],
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        })
    }

    #[test]
    fn set_returns_previous_value() {
        let mut item = plain();
        let old = item.set_prop(Prop::X, Value::F64(10.0));
        assert_eq!(old, Value::F64(1.0));
        assert_eq!(item.get_prop(Prop::X), Value::F64(10.0));
    }

    #[test]
    fn name_roundtrip() {
        let mut item = plain();
        let old = item.set_prop(Prop::Name, Value::Str("renamed".into()));
        assert_eq!(old, Value::Str("n".into()));
        assert_eq!(item.get_prop(Prop::Name), Value::Str("renamed".into()));
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn missing_property_panics() {
        let item = plain();
        item.get_prop(Prop::EdgeSrc);
    }

    #[test]
    #[should_panic(expected = "wrong value variant")]
    fn mismatched_value_panics() {
        let mut item = plain();
        item.set_prop(Prop::X, Value::Bool(true));
    }

    #[test]
    fn value_serde_roundtrip() {
        let value = Value::OptId(Some(ItemId {
            index: 5,
            generation: 2,
        }));
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
