//! Item variants for the object graph.
//!
//! [`Item`] is a closed sum type over every kind of entity a chart can hold:
//! plain elements, modifier (wrapper) elements, function-instance elements,
//! pseudo elements (input/output junctions), containers, and edges
//! (wires/transitions). Consumers match exhaustively on the variant instead
//! of chaining type tests.
//!
//! Ownership is a tree: every item has at most one `parent`, always a
//! [`Container`]. Edges additionally carry cross-cutting reference fields
//! (`src`/`dst`), which make the reference graph an arbitrary directed graph
//! layered over the ownership tree.
//!
//! Per-item adjacency (`in_edges`, `out_edges`, `instances`) is derived
//! state, rebuilt from the live edge set by the consistency engine after
//! every transaction. It is excluded from serialization.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::id::ItemId;

/// Nominal pin type tag. Two pins are compatible when their tags are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PinType(pub u32);

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A container's externally visible signature: the pin types it exposes,
/// derived from its interior Input/Output pseudo elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub inputs: Vec<PinType>,
    pub outputs: Vec<PinType>,
}

/// Which side of a container boundary a pseudo element represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PseudoKind {
    /// Exposes a container input: one interior output pin.
    Input,
    /// Exposes a container output: one interior input pin.
    Output,
}

/// Out-edge bucket: the edges leaving one output pin.
pub type OutBucket = SmallVec<[ItemId; 2]>;

// ---------------------------------------------------------------------------
// Node variants
// ---------------------------------------------------------------------------

/// An ordinary element with fixed, typed pin lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlainNode {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub inputs: Vec<PinType>,
    pub outputs: Vec<PinType>,
    /// One slot per input pin; `Some` holds the single incoming edge.
    #[serde(skip)]
    pub in_edges: Vec<Option<ItemId>>,
    /// One bucket per output pin.
    #[serde(skip)]
    pub out_edges: Vec<OutBucket>,
}

/// A wrapper element that modifies another node, referenced by id.
///
/// The `target` reference contributes a use edge to the reference graph, so
/// modifier chains participate in cycle detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierNode {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub target: Option<ItemId>,
    pub inputs: Vec<PinType>,
    pub outputs: Vec<PinType>,
    #[serde(skip)]
    pub in_edges: Vec<Option<ItemId>>,
    #[serde(skip)]
    pub out_edges: Vec<OutBucket>,
}

/// A function-instance element: a use site of a [`Container`], referenced by
/// id. Its pins mirror the source container's signature and are rewritten by
/// the consistency engine whenever that signature changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceNode {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub x: f64,
    pub y: f64,
    pub source: Option<ItemId>,
    pub inputs: Vec<PinType>,
    pub outputs: Vec<PinType>,
    #[serde(skip)]
    pub in_edges: Vec<Option<ItemId>>,
    #[serde(skip)]
    pub out_edges: Vec<OutBucket>,
}

/// An input or output junction defining one pin of the enclosing container's
/// signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PseudoNode {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub x: f64,
    pub y: f64,
    pub kind: PseudoKind,
    pub ty: PinType,
    pub inputs: Vec<PinType>,
    pub outputs: Vec<PinType>,
    #[serde(skip)]
    pub in_edges: Vec<Option<ItemId>>,
    #[serde(skip)]
    pub out_edges: Vec<OutBucket>,
}

/// A chart: owns an ordered list of child nodes and an ordered list of
/// edges, and carries derived aggregate state recomputed bottom-up by the
/// consistency engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub children: Vec<ItemId>,
    pub edges: Vec<ItemId>,
    /// Derived: exposed pins, from interior pseudo elements.
    pub signature: Signature,
    /// Derived: no concrete interior nodes.
    pub is_abstract: bool,
    /// Derived: every interior input pin is wired.
    pub is_closed: bool,
    /// Derived: instance nodes whose `source` is this container.
    #[serde(skip)]
    pub instances: Vec<ItemId>,
    #[serde(skip)]
    pub in_edges: Vec<Option<ItemId>>,
    #[serde(skip)]
    pub out_edges: Vec<OutBucket>,
}

/// A wire/transition between two pin-addressed endpoints. Endpoints are
/// `None` while transiently unattached (mid-drag); the owning container is
/// derived -- always the lowest common ownership ancestor of the resolved
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: ItemId,
    pub parent: Option<ItemId>,
    pub src: Option<ItemId>,
    pub src_pin: u32,
    pub dst: Option<ItemId>,
    pub dst_pin: u32,
}

// ---------------------------------------------------------------------------
// The closed item sum type
// ---------------------------------------------------------------------------

/// Any node or edge in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Item {
    Plain(PlainNode),
    Modifier(ModifierNode),
    Instance(InstanceNode),
    Pseudo(PseudoNode),
    Container(Container),
    Edge(Edge),
}

impl Item {
    /// The item's stable id.
    pub fn id(&self) -> ItemId {
        match self {
            Item::Plain(n) => n.id,
            Item::Modifier(n) => n.id,
            Item::Instance(n) => n.id,
            Item::Pseudo(n) => n.id,
            Item::Container(n) => n.id,
            Item::Edge(n) => n.id,
        }
    }

    /// The owning container, or `None` for the root and unattached items.
    pub fn parent(&self) -> Option<ItemId> {
        match self {
            Item::Plain(n) => n.parent,
            Item::Modifier(n) => n.parent,
            Item::Instance(n) => n.parent,
            Item::Pseudo(n) => n.parent,
            Item::Container(n) => n.parent,
            Item::Edge(n) => n.parent,
        }
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ItemId>) {
        match self {
            Item::Plain(n) => n.parent = parent,
            Item::Modifier(n) => n.parent = parent,
            Item::Instance(n) => n.parent = parent,
            Item::Pseudo(n) => n.parent = parent,
            Item::Container(n) => n.parent = parent,
            Item::Edge(n) => n.parent = parent,
        }
    }

    /// Serialization type name; also used by the store's `construct` path.
    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Plain(_) => "plain",
            Item::Modifier(_) => "modifier",
            Item::Instance(_) => "instance",
            Item::Pseudo(_) => "pseudo",
            Item::Container(_) => "container",
            Item::Edge(_) => "edge",
        }
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Item::Edge(_))
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Item::Container(_))
    }

    /// Position of the item, local to its parent. Edges carry no position.
    pub fn position(&self) -> Option<(f64, f64)> {
        match self {
            Item::Plain(n) => Some((n.x, n.y)),
            Item::Modifier(n) => Some((n.x, n.y)),
            Item::Instance(n) => Some((n.x, n.y)),
            Item::Pseudo(n) => Some((n.x, n.y)),
            Item::Container(n) => Some((n.x, n.y)),
            Item::Edge(_) => None,
        }
    }

    /// Input pin types. Empty for edges.
    pub fn input_pins(&self) -> &[PinType] {
        match self {
            Item::Plain(n) => &n.inputs,
            Item::Modifier(n) => &n.inputs,
            Item::Instance(n) => &n.inputs,
            Item::Pseudo(n) => &n.inputs,
            Item::Container(n) => &n.signature.inputs,
            Item::Edge(_) => &[],
        }
    }

    /// Output pin types. Empty for edges.
    pub fn output_pins(&self) -> &[PinType] {
        match self {
            Item::Plain(n) => &n.outputs,
            Item::Modifier(n) => &n.outputs,
            Item::Instance(n) => &n.outputs,
            Item::Pseudo(n) => &n.outputs,
            Item::Container(n) => &n.signature.outputs,
            Item::Edge(_) => &[],
        }
    }

    /// Per-input-pin in-edge slots (derived adjacency).
    pub fn in_edges(&self) -> &[Option<ItemId>] {
        match self {
            Item::Plain(n) => &n.in_edges,
            Item::Modifier(n) => &n.in_edges,
            Item::Instance(n) => &n.in_edges,
            Item::Pseudo(n) => &n.in_edges,
            Item::Container(n) => &n.in_edges,
            Item::Edge(_) => &[],
        }
    }

    /// Per-output-pin out-edge buckets (derived adjacency).
    pub fn out_edges(&self) -> &[OutBucket] {
        match self {
            Item::Plain(n) => &n.out_edges,
            Item::Modifier(n) => &n.out_edges,
            Item::Instance(n) => &n.out_edges,
            Item::Pseudo(n) => &n.out_edges,
            Item::Container(n) => &n.out_edges,
            Item::Edge(_) => &[],
        }
    }

    /// Resets the adjacency scratch to one vacant slot/bucket per pin.
    pub(crate) fn reset_adjacency(&mut self) {
        let (ins, outs) = (self.input_pins().len(), self.output_pins().len());
        match self {
            Item::Plain(n) => {
                n.in_edges = vec![None; ins];
                n.out_edges = vec![OutBucket::new(); outs];
            }
            Item::Modifier(n) => {
                n.in_edges = vec![None; ins];
                n.out_edges = vec![OutBucket::new(); outs];
            }
            Item::Instance(n) => {
                n.in_edges = vec![None; ins];
                n.out_edges = vec![OutBucket::new(); outs];
            }
            Item::Pseudo(n) => {
                n.in_edges = vec![None; ins];
                n.out_edges = vec![OutBucket::new(); outs];
            }
            Item::Container(n) => {
                n.in_edges = vec![None; ins];
                n.out_edges = vec![OutBucket::new(); outs];
                n.instances.clear();
            }
            Item::Edge(_) => {}
        }
    }

    pub(crate) fn in_slot_mut(&mut self, pin: usize) -> Option<&mut Option<ItemId>> {
        match self {
            Item::Plain(n) => n.in_edges.get_mut(pin),
            Item::Modifier(n) => n.in_edges.get_mut(pin),
            Item::Instance(n) => n.in_edges.get_mut(pin),
            Item::Pseudo(n) => n.in_edges.get_mut(pin),
            Item::Container(n) => n.in_edges.get_mut(pin),
            Item::Edge(_) => None,
        }
    }

    pub(crate) fn out_bucket_mut(&mut self, pin: usize) -> Option<&mut OutBucket> {
        match self {
            Item::Plain(n) => n.out_edges.get_mut(pin),
            Item::Modifier(n) => n.out_edges.get_mut(pin),
            Item::Instance(n) => n.out_edges.get_mut(pin),
            Item::Pseudo(n) => n.out_edges.get_mut(pin),
            Item::Container(n) => n.out_edges.get_mut(pin),
            Item::Edge(_) => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Item::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_container_mut(&mut self) -> Option<&mut Container> {
        match self {
            Item::Container(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Item::Edge(e) => Some(e),
            _ => None,
        }
    }
}

impl PseudoNode {
    /// Derives the pin lists from the pseudo kind: an Input junction has one
    /// interior output pin, an Output junction one interior input pin.
    pub fn pins_for(kind: PseudoKind, ty: PinType) -> (Vec<PinType>, Vec<PinType>) {
        match kind {
            PseudoKind::Input => (Vec::new(), vec![ty]),
            PseudoKind::Output => (vec![ty], Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> ItemId {
        ItemId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn pseudo_pins_follow_kind() {
        let (ins, outs) = PseudoNode::pins_for(PseudoKind::Input, PinType(1));
        assert!(ins.is_empty());
        assert_eq!(outs, vec![PinType(1)]);

        let (ins, outs) = PseudoNode::pins_for(PseudoKind::Output, PinType(2));
        assert_eq!(ins, vec![PinType(2)]);
        assert!(outs.is_empty());
    }

    #[test]
    fn reset_adjacency_sizes_to_pins() {
        let mut item = Item::Plain(PlainNode {
            id: id(0),
            parent: None,
            name: "n".into(),
            x: 0.0,
            y: 0.0,
            inputs: vec![PinType(0), PinType(0)],
            outputs: vec![PinType(0)],
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        });
        item.reset_adjacency();
        assert_eq!(item.in_edges().len(), 2);
        assert_eq!(item.out_edges().len(), 1);
    }

    #[test]
    fn container_pins_mirror_signature() {
        let item = Item::Container(Container {
            id: id(1),
            parent: None,
            name: "c".into(),
            x: 0.0,
            y: 0.0,
            children: Vec::new(),
            edges: Vec::new(),
            signature: Signature {
                inputs: vec![PinType(3)],
                outputs: vec![PinType(4), PinType(4)],
            },
            is_abstract: false,
            is_closed: false,
            instances: Vec::new(),
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        });
        assert_eq!(item.input_pins(), &[PinType(3)]);
        assert_eq!(item.output_pins(), &[PinType(4), PinType(4)]);
    }

    #[test]
    fn edge_has_no_position_or_pins() {
        let item = Item::Edge(Edge {
            id: id(2),
            parent: None,
            src: None,
            src_pin: 0,
            dst: None,
            dst_pin: 0,
        });
        assert!(item.position().is_none());
        assert!(item.input_pins().is_empty());
        assert!(item.is_edge());
    }

    #[test]
    fn serde_skips_derived_adjacency() {
        let mut item = Item::Plain(PlainNode {
            id: id(0),
            parent: None,
            name: "n".into(),
            x: 1.0,
            y: 2.0,
            inputs: vec![PinType(0)],
            outputs: vec![],
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        });
        item.reset_adjacency();
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("in_edges"));
        let back: Item = serde_json::from_str(&json).unwrap();
        assert!(back.in_edges().is_empty());
    }
}
