//! The consistency engine.
//!
//! Runs at transaction boundaries (commit, and after every rollback, undo and
//! redo) to repair derived state and judge the result:
//!
//! 1. cleanup: clear modifier targets that dangle, delete edges with a
//!    dangling endpoint (reference deletion never cascades; it orphans, and
//!    orphaned edges are repaired here),
//! 2. cycle check over the reference graph (wires, modifier uses,
//!    instancing),
//! 3. reparent every attached edge to the lowest common ancestor of its
//!    endpoints,
//! 4. recompute aggregates bottom-up: container signatures from interior
//!    pseudo elements, instance pins from their source's signature, then the
//!    abstract/closed flags,
//! 5. [`validate`](ConsistencyEngine::validate) the final state.
//!
//! Every repair that touches persistent state goes through the recording
//! mutation paths and is returned as [`Change`]s, so the caller can fold
//! repairs into the open transaction and undo covers them. Adjacency scratch
//! and instance pins are derived state and are rewritten in place.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use graphedit_core::{Change, Item, ItemGraph, ItemId, Prop, PseudoKind, Signature, Value};

use crate::error::EditError;

/// Repairs derived state and validates graph invariants.
#[derive(Debug, Default)]
pub struct ConsistencyEngine {
    updating: bool,
    cyclic: bool,
    invalid: Vec<String>,
}

impl ConsistencyEngine {
    pub fn new() -> Self {
        ConsistencyEngine::default()
    }

    /// Repairs the graph and returns the recorded changes, in mutation order.
    /// Re-entrant calls (a repair triggering another pass) are no-ops.
    pub fn make_consistent(&mut self, graph: &mut ItemGraph) -> Vec<Change> {
        if self.updating {
            return Vec::new();
        }
        self.updating = true;
        self.cyclic = false;
        self.invalid.clear();

        let mut changes = Vec::new();
        self.cleanup(graph, &mut changes);
        self.check_cycles(graph);
        self.reparent_edges(graph, &mut changes);
        self.update_signatures(graph, &mut changes);

        let conflicts = graph.rebuild_adjacency();
        for edge_id in conflicts {
            if let Some(e) = graph.item(edge_id).and_then(|it| it.as_edge()) {
                if let Some(dst) = e.dst {
                    self.invalid.push(format!(
                        "input pin {} of {} already has an incoming edge",
                        e.dst_pin, dst
                    ));
                }
            }
        }

        self.update_flags(graph, &mut changes);
        self.updating = false;
        changes
    }

    /// Judges the repaired graph. `Err` carries the first violation's reason;
    /// the caller rolls the transaction back and reports it.
    pub fn validate(&self, graph: &ItemGraph) -> Result<(), EditError> {
        if self.cyclic {
            return Err(EditError::invalid("graph contains a reference cycle"));
        }
        if let Some(reason) = self.invalid.first() {
            return Err(EditError::invalid(reason.clone()));
        }

        for &edge_id in graph.edges() {
            let e = graph
                .item(edge_id)
                .and_then(|it| it.as_edge())
                .expect("live edge resolves");
            let (src, dst) = match (e.src, e.dst) {
                (Some(src), Some(dst)) => (src, dst),
                _ => {
                    return Err(EditError::invalid(format!(
                        "edge {} has an unattached endpoint",
                        edge_id
                    )))
                }
            };
            let src_item = graph.item(src).ok_or_else(|| {
                EditError::invalid(format!("edge {} source is dangling", edge_id))
            })?;
            let dst_item = graph.item(dst).ok_or_else(|| {
                EditError::invalid(format!("edge {} destination is dangling", edge_id))
            })?;
            let outs = src_item.output_pins();
            let ins = dst_item.input_pins();
            let (sp, dp) = (e.src_pin as usize, e.dst_pin as usize);
            if sp >= outs.len() || dp >= ins.len() {
                return Err(EditError::invalid(format!(
                    "edge {} pin index out of range",
                    edge_id
                )));
            }
            if outs[sp] != ins[dp] {
                return Err(EditError::invalid(format!(
                    "edge {} connects incompatible pin types {} and {}",
                    edge_id, outs[sp], ins[dp]
                )));
            }
        }

        for &id in graph.nodes() {
            let source = match graph.item(id) {
                Some(Item::Instance(n)) => n.source,
                _ => continue,
            };
            let source = source
                .ok_or_else(|| EditError::invalid(format!("instance {} has no source", id)))?;
            let src_item = graph
                .item(source)
                .ok_or_else(|| EditError::invalid(format!("instance {} source is dangling", id)))?;
            if !src_item.is_container() {
                return Err(EditError::invalid(format!(
                    "instance {} source is not a container",
                    id
                )));
            }
            if graph.is_ancestor(source, id) {
                return Err(EditError::invalid(format!(
                    "instance {} is placed inside its own source",
                    id
                )));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    /// Clears dangling modifier targets and deletes edges with a dangling
    /// endpoint. Unattached (`None`) endpoints survive; validation rejects
    /// them at commit, but mid-gesture they are normal.
    fn cleanup(&mut self, graph: &mut ItemGraph, changes: &mut Vec<Change>) {
        let node_ids: Vec<ItemId> = graph.nodes().iter().copied().collect();
        for id in node_ids {
            let target = match graph.item(id) {
                Some(Item::Modifier(m)) => m.target,
                _ => continue,
            };
            if target.is_some() && graph.resolve(target).is_none() {
                let change = graph
                    .write_prop(id, Prop::ModifierTarget, Value::OptId(None))
                    .expect("live modifier resolves");
                changes.push(change);
            }
        }

        let edge_ids: Vec<ItemId> = graph.edges().iter().copied().collect();
        for edge_id in edge_ids {
            let (src, dst) = match graph.item(edge_id).and_then(|it| it.as_edge()) {
                Some(e) => (e.src, e.dst),
                None => continue,
            };
            let src_dangles = src.is_some() && graph.resolve(src).is_none();
            let dst_dangles = dst.is_some() && graph.resolve(dst).is_none();
            if src_dangles || dst_dangles {
                changes.extend(graph.remove_item(edge_id).expect("live edge resolves"));
            }
        }
    }

    /// The reference graph must stay acyclic: wires, modifier use edges
    /// (target to modifier) and instancing edges (source to instance) all
    /// count.
    fn check_cycles(&mut self, graph: &ItemGraph) {
        let mut g = DiGraph::<ItemId, ()>::new();
        let mut index = HashMap::new();
        for &id in graph.nodes() {
            index.insert(id, g.add_node(id));
        }
        for &edge_id in graph.edges() {
            if let Some(e) = graph.item(edge_id).and_then(|it| it.as_edge()) {
                if let (Some(src), Some(dst)) = (e.src, e.dst) {
                    if let (Some(&a), Some(&b)) = (index.get(&src), index.get(&dst)) {
                        g.add_edge(a, b, ());
                    }
                }
            }
        }
        for &id in graph.nodes() {
            let uses = match graph.item(id) {
                Some(Item::Modifier(m)) => m.target,
                Some(Item::Instance(n)) => n.source,
                _ => None,
            };
            if let Some(used) = uses {
                if let Some(&a) = index.get(&used) {
                    g.add_edge(a, index[&id], ());
                }
            }
        }
        self.cyclic = toposort(&g, None).is_err();
    }

    /// An edge belongs to the lowest common ancestor of its endpoints.
    fn reparent_edges(&mut self, graph: &mut ItemGraph, changes: &mut Vec<Change>) {
        let edge_ids: Vec<ItemId> = graph.edges().iter().copied().collect();
        for edge_id in edge_ids {
            let (src, dst, parent) = {
                let it = graph.item(edge_id).expect("live edge resolves");
                let e = it.as_edge().expect("edge id names an edge");
                (e.src, e.dst, it.parent())
            };
            let (src, dst) = match (src, dst) {
                (Some(src), Some(dst)) => (src, dst),
                _ => continue,
            };
            if graph.item(src).is_none() || graph.item(dst).is_none() {
                continue;
            }
            let owner = match graph.lowest_common_ancestor(src, dst) {
                Some(owner) => owner,
                None => continue,
            };
            if parent != Some(owner) {
                changes.extend(
                    graph
                        .add_item(edge_id, owner)
                        .expect("lca of live endpoints is a live container"),
                );
            }
        }
    }

    /// Derives container signatures from interior pseudo elements, in child
    /// order, then mirrors each instance's pins from its source's signature.
    fn update_signatures(&mut self, graph: &mut ItemGraph, changes: &mut Vec<Change>) {
        let order: Vec<ItemId> = graph.pre_order(graph.root()).into_iter().rev().collect();
        for &id in &order {
            let children = match graph.item(id) {
                Some(Item::Container(c)) => c.children.clone(),
                _ => continue,
            };
            let mut sig = Signature::default();
            for child in children {
                if let Some(Item::Pseudo(p)) = graph.item(child) {
                    match p.kind {
                        PseudoKind::Input => sig.inputs.push(p.ty),
                        PseudoKind::Output => sig.outputs.push(p.ty),
                    }
                }
            }
            let current = graph.read_prop(id, Prop::Sig).expect("live container resolves");
            if current != Value::Sig(sig.clone()) {
                let change = graph
                    .write_prop(id, Prop::Sig, Value::Sig(sig))
                    .expect("live container resolves");
                changes.push(change);
            }
        }

        // Instance pins are derived state; rewritten in place, recomputed
        // after every replay.
        let node_ids: Vec<ItemId> = graph.nodes().iter().copied().collect();
        for id in node_ids {
            let source = match graph.item(id) {
                Some(Item::Instance(n)) => n.source,
                _ => continue,
            };
            let sig = match source
                .and_then(|s| graph.item(s))
                .and_then(|it| it.as_container())
            {
                Some(c) => c.signature.clone(),
                None => continue,
            };
            if let Some(Item::Instance(n)) = graph.item_mut(id) {
                if n.inputs != sig.inputs {
                    n.inputs = sig.inputs;
                }
                if n.outputs != sig.outputs {
                    n.outputs = sig.outputs;
                }
            }
        }
    }

    /// Recomputes the abstract and closed flags, deepest container first so
    /// nested flags are final before their owner reads them. Needs rebuilt
    /// adjacency.
    fn update_flags(&mut self, graph: &mut ItemGraph, changes: &mut Vec<Change>) {
        let order: Vec<ItemId> = graph.pre_order(graph.root()).into_iter().rev().collect();
        for &id in &order {
            let children = match graph.item(id) {
                Some(Item::Container(c)) => c.children.clone(),
                _ => continue,
            };
            let mut is_abstract = true;
            let mut is_closed = true;
            for child in children {
                let item = graph.item(child).expect("owned child resolves");
                match item {
                    Item::Pseudo(_) | Item::Edge(_) => {}
                    Item::Container(c) => {
                        if !c.is_abstract {
                            is_abstract = false;
                        }
                    }
                    Item::Plain(_) | Item::Modifier(_) | Item::Instance(_) => {
                        is_abstract = false;
                    }
                }
                if item.in_edges().iter().any(|slot| slot.is_none()) {
                    is_closed = false;
                }
            }
            for (prop, value) in [
                (Prop::IsAbstract, Value::Bool(is_abstract)),
                (Prop::IsClosed, Value::Bool(is_closed)),
            ] {
                let current = graph.read_prop(id, prop).expect("live container resolves");
                if current != value {
                    let change = graph
                        .write_prop(id, prop, value)
                        .expect("live container resolves");
                    changes.push(change);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphedit_core::PinType;

    fn pin() -> PinType {
        PinType(0)
    }

    fn wired_pair(graph: &mut ItemGraph) -> (ItemId, ItemId, ItemId) {
        let root = graph.root();
        let n1 = graph.new_plain("n1", vec![], vec![pin()]);
        let n2 = graph.new_plain("n2", vec![pin()], vec![]);
        graph.add_item(n1, root).unwrap();
        graph.add_item(n2, root).unwrap();
        let e = graph.new_edge(Some(n1), 0, Some(n2), 0);
        graph.add_item(e, root).unwrap();
        (n1, n2, e)
    }

    #[test]
    fn deleting_a_node_deletes_its_dangling_edges() {
        let mut graph = ItemGraph::new("root");
        let (n1, n2, e) = wired_pair(&mut graph);
        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        assert!(engine.validate(&graph).is_ok());

        graph.remove_item(n1).unwrap();
        let changes = engine.make_consistent(&mut graph);
        assert!(!graph.contains(e));
        assert!(graph.item(e).is_none());
        assert_eq!(graph.item(n2).unwrap().in_edges(), &[None]);
        assert!(changes
            .iter()
            .any(|c| matches!(c, Change::ItemRemoved { item, .. } if *item == e)));
        assert!(engine.validate(&graph).is_ok());
    }

    #[test]
    fn stale_modifier_target_is_cleared() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let n = graph.new_plain("n", vec![], vec![]);
        graph.add_item(n, root).unwrap();
        let m = graph.new_modifier("m", vec![], vec![]);
        graph.add_item(m, root).unwrap();
        graph
            .write_prop(m, Prop::ModifierTarget, Value::OptId(Some(n)))
            .unwrap();

        graph.remove_item(n).unwrap();
        let mut engine = ConsistencyEngine::new();
        let changes = engine.make_consistent(&mut graph);
        assert_eq!(
            graph.read_prop(m, Prop::ModifierTarget).unwrap(),
            Value::OptId(None)
        );
        assert!(changes
            .iter()
            .any(|c| matches!(c, Change::ValueChanged { item, prop, .. }
                if *item == m && *prop == Prop::ModifierTarget)));
    }

    #[test]
    fn wire_cycle_is_rejected() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let n1 = graph.new_plain("n1", vec![pin()], vec![pin()]);
        let n2 = graph.new_plain("n2", vec![pin()], vec![pin()]);
        graph.add_item(n1, root).unwrap();
        graph.add_item(n2, root).unwrap();
        let e1 = graph.new_edge(Some(n1), 0, Some(n2), 0);
        let e2 = graph.new_edge(Some(n2), 0, Some(n1), 0);
        graph.add_item(e1, root).unwrap();
        graph.add_item(e2, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        match engine.validate(&graph) {
            Err(EditError::Invalid { reason }) => assert!(reason.contains("cycle")),
            other => panic!("expected cycle rejection, got {:?}", other),
        }
    }

    #[test]
    fn fan_in_is_rejected() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let s1 = graph.new_plain("s1", vec![], vec![pin()]);
        let s2 = graph.new_plain("s2", vec![], vec![pin()]);
        let t = graph.new_plain("t", vec![pin()], vec![]);
        for n in [s1, s2, t] {
            graph.add_item(n, root).unwrap();
        }
        let e1 = graph.new_edge(Some(s1), 0, Some(t), 0);
        let e2 = graph.new_edge(Some(s2), 0, Some(t), 0);
        graph.add_item(e1, root).unwrap();
        graph.add_item(e2, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        match engine.validate(&graph) {
            Err(EditError::Invalid { reason }) => {
                assert!(reason.contains("already has an incoming edge"))
            }
            other => panic!("expected fan-in rejection, got {:?}", other),
        }
    }

    #[test]
    fn unattached_endpoint_is_rejected() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let n = graph.new_plain("n", vec![], vec![pin()]);
        graph.add_item(n, root).unwrap();
        let e = graph.new_edge(Some(n), 0, None, 0);
        graph.add_item(e, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        match engine.validate(&graph) {
            Err(EditError::Invalid { reason }) => assert!(reason.contains("unattached")),
            other => panic!("expected unattached rejection, got {:?}", other),
        }
    }

    #[test]
    fn pin_type_mismatch_is_rejected() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let n1 = graph.new_plain("n1", vec![], vec![PinType(1)]);
        let n2 = graph.new_plain("n2", vec![PinType(2)], vec![]);
        graph.add_item(n1, root).unwrap();
        graph.add_item(n2, root).unwrap();
        let e = graph.new_edge(Some(n1), 0, Some(n2), 0);
        graph.add_item(e, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        match engine.validate(&graph) {
            Err(EditError::Invalid { reason }) => assert!(reason.contains("incompatible")),
            other => panic!("expected type rejection, got {:?}", other),
        }
    }

    #[test]
    fn edge_reparents_to_lowest_common_ancestor() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let x = graph.new_container("x");
        let y = graph.new_container("y");
        graph.add_item(x, root).unwrap();
        graph.add_item(y, x).unwrap();
        let a = graph.new_plain("a", vec![], vec![pin()]);
        let b = graph.new_plain("b", vec![pin()], vec![]);
        graph.add_item(a, x).unwrap();
        graph.add_item(b, y).unwrap();
        let e = graph.new_edge(Some(a), 0, Some(b), 0);
        graph.add_item(e, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        assert_eq!(graph.item(e).unwrap().parent(), Some(x));
        assert!(engine.validate(&graph).is_ok());
    }

    #[test]
    fn signature_derives_from_pseudos_and_flows_to_instances() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let c = graph.new_container("c");
        graph.add_item(c, root).unwrap();
        let input = graph.new_pseudo(PseudoKind::Input, PinType(1));
        let output = graph.new_pseudo(PseudoKind::Output, PinType(2));
        graph.add_item(input, c).unwrap();
        graph.add_item(output, c).unwrap();
        let i = graph.new_instance(Some(c));
        graph.add_item(i, root).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);

        let expected = Signature {
            inputs: vec![PinType(1)],
            outputs: vec![PinType(2)],
        };
        assert_eq!(
            graph.read_prop(c, Prop::Sig).unwrap(),
            Value::Sig(expected.clone())
        );
        assert_eq!(graph.item(i).unwrap().input_pins(), &[PinType(1)]);
        assert_eq!(graph.item(i).unwrap().output_pins(), &[PinType(2)]);
        let container = graph.item(c).unwrap().as_container().unwrap();
        assert_eq!(container.instances, vec![i]);
    }

    #[test]
    fn recursive_instance_is_rejected() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let c = graph.new_container("c");
        graph.add_item(c, root).unwrap();
        let i = graph.new_instance(Some(c));
        graph.add_item(i, c).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        match engine.validate(&graph) {
            Err(EditError::Invalid { reason }) => assert!(reason.contains("its own source")),
            other => panic!("expected recursion rejection, got {:?}", other),
        }
    }

    #[test]
    fn abstract_and_closed_flags_are_derived() {
        let mut graph = ItemGraph::new("root");
        let root = graph.root();
        let c = graph.new_container("c");
        graph.add_item(c, root).unwrap();
        let input = graph.new_pseudo(PseudoKind::Input, pin());
        let output = graph.new_pseudo(PseudoKind::Output, pin());
        graph.add_item(input, c).unwrap();
        graph.add_item(output, c).unwrap();

        let mut engine = ConsistencyEngine::new();
        engine.make_consistent(&mut graph);
        // Pseudo-only interior: abstract, and the output junction's input
        // pin is unwired so not closed.
        assert_eq!(
            graph.read_prop(c, Prop::IsAbstract).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            graph.read_prop(c, Prop::IsClosed).unwrap(),
            Value::Bool(false)
        );

        let e = graph.new_edge(Some(input), 0, Some(output), 0);
        graph.add_item(e, c).unwrap();
        engine.make_consistent(&mut graph);
        assert_eq!(
            graph.read_prop(c, Prop::IsClosed).unwrap(),
            Value::Bool(true)
        );
    }
}
