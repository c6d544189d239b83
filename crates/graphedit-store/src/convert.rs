//! Graph/document conversion.
//!
//! [`write`] walks the ownership tree and emits the record tree; [`read`]
//! rebuilds a graph from a record tree inside a single transaction, so a
//! document that fails validation leaves the editor exactly as it was.
//!
//! Reading is two-pass: construct every item by type name first, then patch
//! reference fields through the document-id map. References can point
//! anywhere in the tree, including forward.

use std::collections::HashMap;

use serde_json::json;

use graphedit_core::{Item, ItemGraph, ItemId, PinType, Prop, PseudoKind, Value};
use graphedit_transact::{Editor, ErrorReporter, Layout};

use crate::error::StoreError;
use crate::record::ItemRecord;

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serializes the live graph to a document record tree. Document ids are
/// assigned in ownership pre-order, so equal graphs write equal documents.
pub fn write(graph: &ItemGraph) -> ItemRecord {
    let mut ids = HashMap::new();
    for (n, id) in graph.pre_order(graph.root()).into_iter().enumerate() {
        ids.insert(id, n as u32);
    }
    build_record(graph, graph.root(), &ids)
}

/// [`write`] to a JSON string.
pub fn to_json(graph: &ItemGraph) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(&write(graph))?)
}

/// Parses a JSON document.
pub fn from_json(json: &str) -> Result<ItemRecord, StoreError> {
    Ok(serde_json::from_str(json)?)
}

fn build_record(graph: &ItemGraph, id: ItemId, ids: &HashMap<ItemId, u32>) -> ItemRecord {
    let item = graph.item(id).expect("owned item resolves");
    let mut rec = ItemRecord::new(item.type_name(), ids[&id]);
    let mut put_ref = |rec: &mut ItemRecord, field: &str, target: Option<ItemId>| {
        if let Some(ext) = target.and_then(|t| ids.get(&t)) {
            rec.refs.insert(field.to_string(), *ext);
        }
    };
    match item {
        Item::Plain(n) => {
            rec.set("name", json!(n.name));
            rec.set("x", json!(n.x));
            rec.set("y", json!(n.y));
            rec.set("inputs", pins_json(&n.inputs));
            rec.set("outputs", pins_json(&n.outputs));
        }
        Item::Modifier(n) => {
            rec.set("name", json!(n.name));
            rec.set("x", json!(n.x));
            rec.set("y", json!(n.y));
            rec.set("inputs", pins_json(&n.inputs));
            rec.set("outputs", pins_json(&n.outputs));
            put_ref(&mut rec, "target", n.target);
        }
        Item::Instance(n) => {
            // Pins are derived from the source signature; not written.
            rec.set("x", json!(n.x));
            rec.set("y", json!(n.y));
            put_ref(&mut rec, "source", n.source);
        }
        Item::Pseudo(n) => {
            rec.set("x", json!(n.x));
            rec.set("y", json!(n.y));
            rec.set(
                "kind",
                json!(match n.kind {
                    PseudoKind::Input => "input",
                    PseudoKind::Output => "output",
                }),
            );
            rec.set("ty", json!(n.ty.0));
        }
        Item::Container(c) => {
            rec.set("name", json!(c.name));
            rec.set("x", json!(c.x));
            rec.set("y", json!(c.y));
            rec.children = c
                .children
                .iter()
                .map(|&child| build_record(graph, child, ids))
                .collect();
            rec.edges = c
                .edges
                .iter()
                .map(|&edge| build_record(graph, edge, ids))
                .collect();
        }
        Item::Edge(e) => {
            rec.set("src_pin", json!(e.src_pin));
            rec.set("dst_pin", json!(e.dst_pin));
            put_ref(&mut rec, "src", e.src);
            put_ref(&mut rec, "dst", e.dst);
        }
    }
    rec
}

fn pins_json(pins: &[PinType]) -> serde_json::Value {
    json!(pins.iter().map(|p| p.0).collect::<Vec<u32>>())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Loads a document into the editor's root, in one transaction. The root
/// record's scalars apply to the existing root container; its subtree is
/// constructed beneath it. On any error, including a failed validation at
/// commit, the editor is left exactly as it was.
///
/// Calling with a transaction already open is a programmer error and
/// panics; the load must own its transaction so a failure cannot cancel a
/// caller's edits.
pub fn read<L: Layout, R: ErrorReporter>(
    editor: &mut Editor<L, R>,
    record: &ItemRecord,
) -> Result<ItemId, StoreError> {
    let opened = editor.begin_transaction("load");
    assert!(opened, "read requires no open transaction");
    match read_inner(editor, record) {
        Ok(root) => {
            editor.end_transaction()?;
            Ok(root)
        }
        Err(err) => {
            editor.cancel_transaction();
            Err(err)
        }
    }
}

fn read_inner<L: Layout, R: ErrorReporter>(
    editor: &mut Editor<L, R>,
    record: &ItemRecord,
) -> Result<ItemId, StoreError> {
    if record.type_name != "container" {
        return Err(StoreError::BadRoot(record.type_name.clone()));
    }
    let root = editor.root();
    if let Some(name) = opt_str(record, "name")? {
        editor.set_value(root, Prop::Name, Value::Str(name))?;
    }
    apply_position(editor, record, root)?;

    let mut map = HashMap::new();
    map.insert(record.id, root);
    for child in &record.children {
        construct(editor, child, root, &mut map)?;
    }
    for edge in &record.edges {
        construct(editor, edge, root, &mut map)?;
    }
    patch(editor, record, &map)?;
    Ok(root)
}

/// Pass one: build the item named by `rec` under `parent` and recurse.
fn construct<L: Layout, R: ErrorReporter>(
    editor: &mut Editor<L, R>,
    rec: &ItemRecord,
    parent: ItemId,
    map: &mut HashMap<u32, ItemId>,
) -> Result<(), StoreError> {
    let item = match rec.type_name.as_str() {
        "plain" => {
            let name = req_str(rec, "name")?;
            editor.new_plain(&name, pin_list(rec, "inputs")?, pin_list(rec, "outputs")?)
        }
        "modifier" => {
            let name = req_str(rec, "name")?;
            editor.new_modifier(&name, pin_list(rec, "inputs")?, pin_list(rec, "outputs")?)
        }
        "instance" => editor.new_instance(None),
        "pseudo" => {
            let kind = match req_str(rec, "kind")?.as_str() {
                "input" => PseudoKind::Input,
                "output" => PseudoKind::Output,
                _ => {
                    return Err(StoreError::BadField {
                        id: rec.id,
                        field: "kind".to_string(),
                    })
                }
            };
            editor.new_pseudo(kind, PinType(req_u32(rec, "ty")?))
        }
        "container" => {
            let name = req_str(rec, "name")?;
            editor.new_container(&name)
        }
        "edge" => editor.new_edge(
            None,
            req_u32(rec, "src_pin")?,
            None,
            req_u32(rec, "dst_pin")?,
        ),
        other => return Err(StoreError::UnknownTypeName(other.to_string())),
    };
    editor.add_item(item, parent)?;
    if rec.type_name != "edge" {
        apply_position(editor, rec, item)?;
    }
    if map.insert(rec.id, item).is_some() {
        return Err(StoreError::DuplicateId(rec.id));
    }
    for child in &rec.children {
        construct(editor, child, item, map)?;
    }
    for edge in &rec.edges {
        construct(editor, edge, item, map)?;
    }
    Ok(())
}

/// Pass two: resolve `refs` through the document-id map and write them.
fn patch<L: Layout, R: ErrorReporter>(
    editor: &mut Editor<L, R>,
    rec: &ItemRecord,
    map: &HashMap<u32, ItemId>,
) -> Result<(), StoreError> {
    let item = map[&rec.id];
    for (field, ext) in &rec.refs {
        let target = *map.get(ext).ok_or(StoreError::UnknownId(*ext))?;
        let prop = match (rec.type_name.as_str(), field.as_str()) {
            ("edge", "src") => Prop::EdgeSrc,
            ("edge", "dst") => Prop::EdgeDst,
            ("modifier", "target") => Prop::ModifierTarget,
            ("instance", "source") => Prop::InstanceSource,
            _ => {
                return Err(StoreError::BadField {
                    id: rec.id,
                    field: field.clone(),
                })
            }
        };
        editor.set_value(item, prop, Value::OptId(Some(target)))?;
    }
    for child in &rec.children {
        patch(editor, child, map)?;
    }
    for edge in &rec.edges {
        patch(editor, edge, map)?;
    }
    Ok(())
}

fn apply_position<L: Layout, R: ErrorReporter>(
    editor: &mut Editor<L, R>,
    rec: &ItemRecord,
    item: ItemId,
) -> Result<(), StoreError> {
    for (field, prop) in [("x", Prop::X), ("y", Prop::Y)] {
        if let Some(value) = rec.scalars.get(field) {
            let v = value.as_f64().ok_or_else(|| StoreError::BadField {
                id: rec.id,
                field: field.to_string(),
            })?;
            editor.set_value(item, prop, Value::F64(v))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Field accessors
// ---------------------------------------------------------------------------

fn opt_str(rec: &ItemRecord, field: &str) -> Result<Option<String>, StoreError> {
    match rec.scalars.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| StoreError::BadField {
                id: rec.id,
                field: field.to_string(),
            }),
    }
}

fn req_str(rec: &ItemRecord, field: &str) -> Result<String, StoreError> {
    opt_str(rec, field)?.ok_or_else(|| StoreError::BadField {
        id: rec.id,
        field: field.to_string(),
    })
}

fn req_u32(rec: &ItemRecord, field: &str) -> Result<u32, StoreError> {
    rec.scalars
        .get(field)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| StoreError::BadField {
            id: rec.id,
            field: field.to_string(),
        })
}

/// Absent pin lists read as empty.
fn pin_list(rec: &ItemRecord, field: &str) -> Result<Vec<PinType>, StoreError> {
    let value = match rec.scalars.get(field) {
        None => return Ok(Vec::new()),
        Some(value) => value,
    };
    let bad = || StoreError::BadField {
        id: rec.id,
        field: field.to_string(),
    };
    let list = value.as_array().ok_or_else(bad)?;
    list.iter()
        .map(|v| {
            v.as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(PinType)
                .ok_or_else(bad)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphedit_core::Signature;
    use graphedit_transact::{CollectingReporter, NoLayout};

    fn pin() -> PinType {
        PinType(0)
    }

    /// A chart exercising every item kind: a container with a wired
    /// input/output pseudo pair, an instance of it, and a modifier
    /// targeting a plain node.
    fn sample_editor() -> Editor<NoLayout, CollectingReporter> {
        let mut editor = Editor::headless("chart");
        let root = editor.root();
        editor.begin_transaction("build");
        let amp = editor.new_container("amp");
        editor.add_item(amp, root).unwrap();
        let input = editor.new_pseudo(PseudoKind::Input, pin());
        let output = editor.new_pseudo(PseudoKind::Output, pin());
        editor.add_item(input, amp).unwrap();
        editor.add_item(output, amp).unwrap();
        editor.connect(input, 0, output, 0).unwrap();

        let i = editor.new_instance(Some(amp));
        editor.add_item(i, root).unwrap();
        editor.set_value(i, Prop::X, Value::F64(120.0)).unwrap();

        let n = editor.new_plain("n", vec![], vec![]);
        editor.add_item(n, root).unwrap();
        let m = editor.new_modifier("m", vec![], vec![]);
        editor.add_item(m, root).unwrap();
        editor
            .set_value(m, Prop::ModifierTarget, Value::OptId(Some(n)))
            .unwrap();
        editor.end_transaction().unwrap();
        editor
    }

    #[test]
    fn round_trip_reproduces_the_document() {
        let editor = sample_editor();
        let doc = write(editor.graph());

        let json = serde_json::to_string(&doc).unwrap();
        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed, doc);

        let mut restored = Editor::headless("tmp");
        read(&mut restored, &parsed).unwrap();
        assert_eq!(write(restored.graph()), doc);
    }

    #[test]
    fn load_recomputes_derived_state() {
        let editor = sample_editor();
        let doc = write(editor.graph());

        let mut restored = Editor::headless("tmp");
        read(&mut restored, &doc).unwrap();
        let graph = restored.graph();
        let amp = graph
            .nodes()
            .iter()
            .copied()
            .find(|&id| {
                graph
                    .item(id)
                    .and_then(|it| it.as_container())
                    .map_or(false, |c| c.name == "amp")
            })
            .unwrap();
        let expected = Signature {
            inputs: vec![pin()],
            outputs: vec![pin()],
        };
        assert_eq!(
            graph.read_prop(amp, Prop::Sig).unwrap(),
            Value::Sig(expected)
        );
        assert_eq!(
            graph.read_prop(amp, Prop::IsClosed).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let mut doc = ItemRecord::new("container", 0);
        doc.set("name", json!("root"));
        doc.children.push(ItemRecord::new("widget", 1));

        let mut editor = Editor::headless("root");
        match read(&mut editor, &doc) {
            Err(StoreError::UnknownTypeName(name)) => assert_eq!(name, "widget"),
            other => panic!("expected unknown type, got {:?}", other),
        }
        // The partial load was rolled back.
        assert_eq!(editor.graph().nodes().len(), 1);
    }

    #[test]
    fn unknown_ref_id_is_rejected() {
        let mut doc = ItemRecord::new("container", 0);
        let mut m = ItemRecord::new("modifier", 1);
        m.set("name", json!("m"));
        m.refs.insert("target".to_string(), 99);
        doc.children.push(m);

        let mut editor = Editor::headless("root");
        match read(&mut editor, &doc) {
            Err(StoreError::UnknownId(id)) => assert_eq!(id, 99),
            other => panic!("expected unknown id, got {:?}", other),
        }
        assert_eq!(editor.graph().nodes().len(), 1);
    }

    #[test]
    #[should_panic(expected = "read requires no open transaction")]
    fn read_with_a_transaction_open_panics() {
        let mut doc = ItemRecord::new("container", 0);
        doc.set("name", json!("root"));

        let mut editor = Editor::headless("root");
        editor.begin_transaction("edit");
        let _ = read(&mut editor, &doc);
    }

    #[test]
    fn invalid_document_rolls_back() {
        // An edge with no endpoints parses fine but fails validation.
        let mut doc = ItemRecord::new("container", 0);
        let mut e = ItemRecord::new("edge", 1);
        e.set("src_pin", json!(0));
        e.set("dst_pin", json!(0));
        doc.edges.push(e);

        let mut editor = Editor::headless("root");
        match read(&mut editor, &doc) {
            Err(StoreError::Edit(_)) => {}
            other => panic!("expected validation failure, got {:?}", other),
        }
        assert_eq!(editor.graph().nodes().len(), 1);
        assert!(editor.graph().edges().is_empty());
        assert_eq!(editor.reporter().reports.len(), 1);
    }
}
