//! The item graph context.
//!
//! [`ItemGraph`] owns every live item: a generational arena plus ordered live
//! node/edge id sets and a root container. All structural mutation goes
//! through methods that return [`Change`] records, so every mutation is
//! observed exactly once; [`apply`](ItemGraph::apply) replays recorded
//! changes (forward for redo, inverted for undo/rollback) through the same
//! mutation paths.
//!
//! Everything here is a total function over well-formed ids: nothing in this
//! module rejects an edit for breaking a graph invariant. Rejection is the
//! consistency engine's job at transaction boundaries.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::error::CoreError;
use crate::id::{Arena, ItemId};
use crate::item::{
    Container, Edge, InstanceNode, Item, ModifierNode, PinType, PlainNode, PseudoKind, PseudoNode,
    Signature,
};
use crate::prop::{ChildProp, Prop, Value};

/// The live object graph: arena, live sets, root container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemGraph {
    arena: Arena<Item>,
    nodes: IndexSet<ItemId>,
    edges: IndexSet<ItemId>,
    root: ItemId,
}

impl ItemGraph {
    /// Creates a graph with a live root container.
    pub fn new(root_name: &str) -> Self {
        let mut arena = Arena::new();
        let root = arena.insert_with(|id| {
            Item::Container(Container {
                id,
                parent: None,
                name: root_name.to_string(),
                x: 0.0,
                y: 0.0,
                children: Vec::new(),
                edges: Vec::new(),
                signature: Signature::default(),
                // An empty container is vacuously abstract and closed, so a
                // fresh graph already matches what the consistency engine
                // would derive.
                is_abstract: true,
                is_closed: true,
                instances: Vec::new(),
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        });
        let mut nodes = IndexSet::new();
        nodes.insert(root);
        ItemGraph {
            arena,
            nodes,
            edges: IndexSet::new(),
            root,
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    /// The root container's id.
    pub fn root(&self) -> ItemId {
        self.root
    }

    /// Resolves an id. `None` for stale ids -- never panics.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.arena.get(id)
    }

    /// Mutable resolution. Reserved for derived-state bookkeeping (adjacency
    /// scratch); recorded mutation goes through [`write_prop`] and the
    /// structural methods.
    ///
    /// [`write_prop`]: ItemGraph::write_prop
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.arena.get_mut(id)
    }

    /// Resolves an optional reference field. `None` for unattached (`None`)
    /// and dangling (stale id) references alike.
    pub fn resolve(&self, reference: Option<ItemId>) -> Option<&Item> {
        reference.and_then(|id| self.arena.get(id))
    }

    /// Returns `true` if the item is attached to the live graph.
    pub fn contains(&self, id: ItemId) -> bool {
        self.nodes.contains(&id) || self.edges.contains(&id)
    }

    /// Live node ids, in insertion order. Includes the root.
    pub fn nodes(&self) -> &IndexSet<ItemId> {
        &self.nodes
    }

    /// Live edge ids, in insertion order.
    pub fn edges(&self) -> &IndexSet<ItemId> {
        &self.edges
    }

    // -----------------------------------------------------------------------
    // Factories -- pure allocation, no graph side effects until `add_item`
    // -----------------------------------------------------------------------

    /// Allocates a plain element. Not live until [`add_item`](Self::add_item).
    pub fn new_plain(&mut self, name: &str, inputs: Vec<PinType>, outputs: Vec<PinType>) -> ItemId {
        self.arena.insert_with(|id| {
            Item::Plain(PlainNode {
                id,
                parent: None,
                name: name.to_string(),
                x: 0.0,
                y: 0.0,
                inputs,
                outputs,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        })
    }

    /// Allocates a modifier element.
    pub fn new_modifier(
        &mut self,
        name: &str,
        inputs: Vec<PinType>,
        outputs: Vec<PinType>,
    ) -> ItemId {
        self.arena.insert_with(|id| {
            Item::Modifier(ModifierNode {
                id,
                parent: None,
                name: name.to_string(),
                x: 0.0,
                y: 0.0,
                target: None,
                inputs,
                outputs,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        })
    }

    /// Allocates an instance element for `source`.
    pub fn new_instance(&mut self, source: Option<ItemId>) -> ItemId {
        self.arena.insert_with(|id| {
            Item::Instance(InstanceNode {
                id,
                parent: None,
                x: 0.0,
                y: 0.0,
                source,
                inputs: Vec::new(),
                outputs: Vec::new(),
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        })
    }

    /// Allocates a pseudo element.
    pub fn new_pseudo(&mut self, kind: PseudoKind, ty: PinType) -> ItemId {
        let (inputs, outputs) = PseudoNode::pins_for(kind, ty);
        self.arena.insert_with(|id| {
            Item::Pseudo(PseudoNode {
                id,
                parent: None,
                x: 0.0,
                y: 0.0,
                kind,
                ty,
                inputs,
                outputs,
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        })
    }

    /// Allocates a container. Flags start at their empty-container values.
    pub fn new_container(&mut self, name: &str) -> ItemId {
        self.arena.insert_with(|id| {
            Item::Container(Container {
                id,
                parent: None,
                name: name.to_string(),
                x: 0.0,
                y: 0.0,
                children: Vec::new(),
                edges: Vec::new(),
                signature: Signature::default(),
                is_abstract: true,
                is_closed: true,
                instances: Vec::new(),
                in_edges: Vec::new(),
                out_edges: Vec::new(),
            })
        })
    }

    /// Allocates an edge. Endpoints may be unattached (`None`).
    pub fn new_edge(
        &mut self,
        src: Option<ItemId>,
        src_pin: u32,
        dst: Option<ItemId>,
        dst_pin: u32,
    ) -> ItemId {
        self.arena.insert_with(|id| {
            Item::Edge(Edge {
                id,
                parent: None,
                src,
                src_pin,
                dst,
                dst_pin,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Property commands
    // -----------------------------------------------------------------------

    /// Reads a property.
    pub fn read_prop(&self, item: ItemId, prop: Prop) -> Result<Value, CoreError> {
        let it = self.item(item).ok_or(CoreError::ItemNotFound { id: item })?;
        Ok(it.get_prop(prop))
    }

    /// Writes a property and returns the change record observing it.
    pub fn write_prop(&mut self, item: ItemId, prop: Prop, value: Value) -> Result<Change, CoreError> {
        let it = self
            .arena
            .get_mut(item)
            .ok_or(CoreError::ItemNotFound { id: item })?;
        let old = it.set_prop(prop, value.clone());
        Ok(Change::ValueChanged {
            item,
            prop,
            old,
            new: value,
        })
    }

    // -----------------------------------------------------------------------
    // Structural commands
    // -----------------------------------------------------------------------

    /// Attaches `item` to `parent`, reparenting if needed.
    ///
    /// A reparent translates the item's position by the difference of the
    /// old and new parents' global origins, so visual placement is preserved.
    /// First attachment also makes the item live (an `ItemInserted` record).
    /// No-op (empty change list) when `item` is already a child of `parent`.
    /// Attaching an item under itself or one of its own descendants errors;
    /// the ownership tree stays acyclic.
    pub fn add_item(&mut self, item: ItemId, parent: ItemId) -> Result<Vec<Change>, CoreError> {
        let it = self.item(item).ok_or(CoreError::ItemNotFound { id: item })?;
        let old_parent = it.parent();
        let is_edge = it.is_edge();
        let parent_item = self
            .item(parent)
            .ok_or(CoreError::ItemNotFound { id: parent })?;
        if !parent_item.is_container() {
            return Err(CoreError::NotAContainer { id: parent });
        }
        // Checked against the pre-move tree: `parent` sitting at or below
        // `item` means the move would make `item` its own ancestor.
        if self.is_ancestor(item, parent) {
            return Err(CoreError::OwnershipCycle { item, parent });
        }
        if old_parent == Some(parent) {
            return Ok(Vec::new());
        }

        let mut changes = Vec::new();

        if !self.contains(item) {
            self.insert_live(item);
            let state = Box::new(self.arena.get(item).expect("checked above").clone());
            changes.push(Change::ItemInserted { item, state });
        }

        if let Some(old) = old_parent {
            // Translate so the global position is unchanged across the move.
            if let Some((x, y)) = self.item(item).expect("checked above").position() {
                let (ogx, ogy) = self.global_position(old);
                let (ngx, ngy) = self.global_position(parent);
                let (dx, dy) = (ogx - ngx, ogy - ngy);
                if dx != 0.0 {
                    changes.push(self.write_prop(item, Prop::X, Value::F64(x + dx))?);
                }
                if dy != 0.0 {
                    changes.push(self.write_prop(item, Prop::Y, Value::F64(y + dy))?);
                }
            }
            let prop = child_prop_for(is_edge);
            let index = self.element_index(old, prop, item)?;
            self.remove_element(old, prop, index)?;
            changes.push(Change::ElementRemoved {
                parent: old,
                prop,
                index,
                item,
            });
        }

        let prop = child_prop_for(is_edge);
        let index = self.element_list(parent, prop)?.len();
        self.insert_element(parent, prop, index, item)?;
        changes.push(Change::ElementInserted {
            parent,
            prop,
            index,
            item,
        });
        Ok(changes)
    }

    /// Removes `item` and every item it transitively owns from the live
    /// graph. Ownership delete cascades; reference deletion never does --
    /// references left dangling are the consistency engine's to clean up.
    pub fn remove_item(&mut self, item: ItemId) -> Result<Vec<Change>, CoreError> {
        if self.item(item).is_none() {
            return Err(CoreError::ItemNotFound { id: item });
        }
        let mut changes = Vec::new();
        // Reverse pre-order: descendants detach before their owners.
        for id in self.pre_order(item).into_iter().rev() {
            let it = self.item(id).expect("ownership walk yields live ids");
            let is_edge = it.is_edge();
            if let Some(parent) = it.parent() {
                let prop = child_prop_for(is_edge);
                let index = self.element_index(parent, prop, id)?;
                self.remove_element(parent, prop, index)?;
                changes.push(Change::ElementRemoved {
                    parent,
                    prop,
                    index,
                    item: id,
                });
            }
            self.remove_live(id);
            let state = Box::new(
                self.arena
                    .remove(id)
                    .expect("ownership walk yields live ids"),
            );
            changes.push(Change::ItemRemoved { item: id, state });
        }
        Ok(changes)
    }

    // -----------------------------------------------------------------------
    // Replay
    // -----------------------------------------------------------------------

    /// Re-applies a recorded change through the live mutation paths. Redo
    /// replays records forward; undo and rollback replay
    /// [`Change::inverse`] records in reverse order.
    pub fn apply(&mut self, change: &Change) -> Result<(), CoreError> {
        match change {
            Change::ValueChanged {
                item, prop, new, ..
            } => {
                self.write_prop(*item, *prop, new.clone())?;
            }
            Change::ElementInserted {
                parent,
                prop,
                index,
                item,
            } => {
                self.insert_element(*parent, *prop, *index, *item)?;
            }
            Change::ElementRemoved {
                parent,
                prop,
                index,
                ..
            } => {
                self.remove_element(*parent, *prop, *index)?;
            }
            Change::ItemInserted { item, state } => {
                self.arena.restore(*item, (**state).clone());
                self.insert_live(*item);
            }
            Change::ItemRemoved { item, .. } => {
                self.remove_live(*item);
                self.arena
                    .remove(*item)
                    .ok_or(CoreError::ItemNotFound { id: *item })?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Derived adjacency
    // -----------------------------------------------------------------------

    /// Rebuilds the derived adjacency scratch (per-pin in/out edge slots and
    /// container instance lists) from the live node and edge sets.
    ///
    /// Returns the edges that found their destination input slot already
    /// occupied; each input pin accepts at most one incoming edge, so these
    /// are fan-in conflicts for the caller to report. Edges with unattached
    /// or out-of-range endpoints are skipped, not wired.
    pub fn rebuild_adjacency(&mut self) -> Vec<ItemId> {
        let node_ids: Vec<ItemId> = self.nodes.iter().copied().collect();
        for &id in &node_ids {
            if let Some(item) = self.arena.get_mut(id) {
                item.reset_adjacency();
            }
        }

        let mut conflicts = Vec::new();
        let edge_ids: Vec<ItemId> = self.edges.iter().copied().collect();
        for edge_id in edge_ids {
            let (src, src_pin, dst, dst_pin) = match self.item(edge_id).and_then(|it| it.as_edge())
            {
                Some(e) => (e.src, e.src_pin, e.dst, e.dst_pin),
                None => continue,
            };
            if let Some(src) = src {
                if let Some(bucket) = self
                    .arena
                    .get_mut(src)
                    .and_then(|it| it.out_bucket_mut(src_pin as usize))
                {
                    bucket.push(edge_id);
                }
            }
            if let Some(dst) = dst {
                if let Some(slot) = self
                    .arena
                    .get_mut(dst)
                    .and_then(|it| it.in_slot_mut(dst_pin as usize))
                {
                    if slot.is_some() {
                        conflicts.push(edge_id);
                    } else {
                        *slot = Some(edge_id);
                    }
                }
            }
        }

        for id in node_ids {
            let source = match self.item(id) {
                Some(Item::Instance(n)) => n.source,
                _ => continue,
            };
            if let Some(source) = source {
                if let Some(Item::Container(c)) = self.arena.get_mut(source) {
                    c.instances.push(id);
                }
            }
        }
        conflicts
    }

    // -----------------------------------------------------------------------
    // Ownership walks
    // -----------------------------------------------------------------------

    /// Pre-order walk over the ownership tree: each item before its owned
    /// children, child list before edge list.
    pub fn pre_order(&self, start: ItemId) -> Vec<ItemId> {
        let mut out = Vec::new();
        self.walk(start, &mut out);
        out
    }

    fn walk(&self, id: ItemId, out: &mut Vec<ItemId>) {
        out.push(id);
        if let Some(Item::Container(c)) = self.item(id) {
            let children = c.children.clone();
            let edges = c.edges.clone();
            for child in children {
                self.walk(child, out);
            }
            for edge in edges {
                out.push(edge);
            }
        }
    }

    /// Returns `true` if `ancestor` is `item` or appears on its parent chain.
    pub fn is_ancestor(&self, ancestor: ItemId, item: ItemId) -> bool {
        let mut current = Some(item);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.item(id).and_then(Item::parent);
        }
        false
    }

    /// The nearest container owning both items (either item counts as its
    /// own ancestor when it is a container).
    pub fn lowest_common_ancestor(&self, a: ItemId, b: ItemId) -> Option<ItemId> {
        let mut chain = IndexSet::new();
        let mut current = Some(a);
        while let Some(id) = current {
            chain.insert(id);
            current = self.item(id).and_then(Item::parent);
        }
        let mut current = Some(b);
        while let Some(id) = current {
            if chain.contains(&id) && self.item(id).map_or(false, Item::is_container) {
                return Some(id);
            }
            current = self.item(id).and_then(Item::parent);
        }
        None
    }

    /// Position in root coordinates: the item's local position plus every
    /// ancestor's offset.
    pub fn global_position(&self, item: ItemId) -> (f64, f64) {
        let (mut gx, mut gy) = (0.0, 0.0);
        let mut current = Some(item);
        while let Some(id) = current {
            let it = match self.item(id) {
                Some(it) => it,
                None => break,
            };
            if let Some((x, y)) = it.position() {
                gx += x;
                gy += y;
            }
            current = it.parent();
        }
        (gx, gy)
    }

    // -----------------------------------------------------------------------
    // Element list plumbing
    // -----------------------------------------------------------------------

    fn element_list(&self, parent: ItemId, prop: ChildProp) -> Result<&Vec<ItemId>, CoreError> {
        let container = self
            .item(parent)
            .ok_or(CoreError::ItemNotFound { id: parent })?
            .as_container()
            .ok_or(CoreError::NotAContainer { id: parent })?;
        Ok(match prop {
            ChildProp::Children => &container.children,
            ChildProp::Edges => &container.edges,
        })
    }

    fn element_index(
        &self,
        parent: ItemId,
        prop: ChildProp,
        item: ItemId,
    ) -> Result<usize, CoreError> {
        self.element_list(parent, prop)?
            .iter()
            .position(|&id| id == item)
            .ok_or(CoreError::NotAnElement { id: item, parent })
    }

    fn insert_element(
        &mut self,
        parent: ItemId,
        prop: ChildProp,
        index: usize,
        item: ItemId,
    ) -> Result<(), CoreError> {
        let container = self
            .arena
            .get_mut(parent)
            .ok_or(CoreError::ItemNotFound { id: parent })?
            .as_container_mut()
            .ok_or(CoreError::NotAContainer { id: parent })?;
        match prop {
            ChildProp::Children => container.children.insert(index, item),
            ChildProp::Edges => container.edges.insert(index, item),
        }
        let it = self
            .arena
            .get_mut(item)
            .ok_or(CoreError::ItemNotFound { id: item })?;
        it.set_parent(Some(parent));
        Ok(())
    }

    fn remove_element(
        &mut self,
        parent: ItemId,
        prop: ChildProp,
        index: usize,
    ) -> Result<ItemId, CoreError> {
        let container = self
            .arena
            .get_mut(parent)
            .ok_or(CoreError::ItemNotFound { id: parent })?
            .as_container_mut()
            .ok_or(CoreError::NotAContainer { id: parent })?;
        let removed = match prop {
            ChildProp::Children => container.children.remove(index),
            ChildProp::Edges => container.edges.remove(index),
        };
        if let Some(it) = self.arena.get_mut(removed) {
            it.set_parent(None);
        }
        Ok(removed)
    }

    fn insert_live(&mut self, item: ItemId) {
        if self.arena.get(item).map_or(false, Item::is_edge) {
            self.edges.insert(item);
        } else {
            self.nodes.insert(item);
        }
    }

    fn remove_live(&mut self, item: ItemId) {
        self.nodes.shift_remove(&item);
        self.edges.shift_remove(&item);
    }
}

fn child_prop_for(is_edge: bool) -> ChildProp {
    if is_edge {
        ChildProp::Edges
    } else {
        ChildProp::Children
    }
}
