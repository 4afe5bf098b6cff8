//! Reading and writing layers as JSON.
//!
//! The native layer form mirrors the graph model: a top-level object
//! with `@id`, `@type` (`Schema` or `Overlay`) and layer annotations,
//! and a `layer` attribute tree where each attribute carries `@id`,
//! `@type` (its kind), per-kind children (`attributes`, `items`,
//! `allOf`, `oneOf`, `ref`) and an open annotation map whose keys are
//! term IRIs or their registered shorthands.
//!
//! Emitted document graphs use the flat node/edge form with stable
//! integer IDs local to the emission.

use ahash::{AHashMap, AHashSet};
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::layer::{attribute_kind, node_id, set_node_id, AttributeKind, Layer, LayerType};
use crate::property::PropertyValue;
use crate::term::vocab;

const STRUCTURAL_KEYS: [&str; 7] = ["@id", "@type", "attributes", "items", "allOf", "oneOf", "ref"];

/// Parses a layer from its JSON text.
pub fn layer_from_json_str(text: &str) -> Result<Layer> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| Error::InvalidSchema(format!("bad layer JSON: {e}")))?;
    layer_from_json(&value)
}

/// Parses a layer from a JSON value.
pub fn layer_from_json(value: &Value) -> Result<Layer> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidSchema("layer is not an object".into()))?;
    let id = object
        .get("@id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::InvalidSchema("layer without @id".into()))?;
    let layer_type = match object.get("@type").and_then(Value::as_str) {
        Some("Schema") => LayerType::Schema,
        Some("Overlay") => LayerType::Overlay,
        other => {
            return Err(Error::InvalidSchema(format!(
                "invalid layer type: {}",
                other.unwrap_or("<missing>")
            )))
        }
    };
    let mut layer = Layer::new(layer_type, id);
    for (key, value) in object {
        if key == "@id" || key == "@type" || key == "layer" || key == "@context" {
            continue;
        }
        let term = vocab::annotation_term(key);
        let property = PropertyValue::from_json(value)
            .ok_or_else(|| Error::InvalidSchema(format!("unsupported value for {key}")))?;
        let info = layer.info();
        layer.graph_mut().node_mut(info).set_property(term, property);
    }
    if let Some(root_value) = object.get("layer") {
        let mut state = ReadState {
            layer_type,
            blank_seq: 0,
            seen: AHashSet::new(),
        };
        let root = parse_attribute(&mut layer, root_value, None, &mut state)?;
        layer.set_schema_root(root);
    }
    Ok(layer)
}

struct ReadState {
    layer_type: LayerType,
    blank_seq: u64,
    seen: AHashSet<String>,
}

fn parse_attribute(
    layer: &mut Layer,
    value: &Value,
    default_id: Option<&str>,
    state: &mut ReadState,
) -> Result<NodeId> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::InvalidSchema("attribute is not an object".into()))?;
    let id = match object.get("@id").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => match default_id {
            Some(id) => id.to_string(),
            None => {
                state.blank_seq += 1;
                format!("_b:{}", state.blank_seq)
            }
        },
    };
    if !state.seen.insert(id.clone()) {
        return Err(Error::DuplicateAttribute(id));
    }
    // Overlay attributes may stay kindless; in a schema base a leaf
    // with nothing declared is a value slot.
    let kind = match declared_kind(object)?.or_else(|| infer_kind(object)) {
        Some(kind) => Some(kind),
        None if state.layer_type == LayerType::Schema => Some(AttributeKind::Value),
        None => None,
    };
    let node = layer.graph_mut().new_node([vocab::ATTRIBUTE]);
    if let Some(kind) = kind {
        layer.graph_mut().node_mut(node).add_label(kind.label());
    }
    set_node_id(layer.graph_mut().node_mut(node), &id);

    if let Some(attributes) = object.get("attributes") {
        let attributes = attributes
            .as_object()
            .ok_or_else(|| Error::InvalidSchema(format!("attributes of {id} is not an object")))?;
        for (index, (name, child_value)) in attributes.iter().enumerate() {
            let child = parse_attribute(layer, child_value, Some(name), state)?;
            if layer.graph().node(child).property(vocab::ATTRIBUTE_NAME).is_none() {
                layer
                    .graph_mut()
                    .node_mut(child)
                    .set_property(vocab::ATTRIBUTE_NAME, PropertyValue::string(name));
            }
            attach(layer, node, child, vocab::OBJECT_ATTRIBUTES, index as i64);
        }
    }
    if let Some(items) = object.get("items") {
        let child = parse_attribute(layer, items, None, state)?;
        attach(layer, node, child, vocab::ARRAY_ITEMS, 0);
    }
    for (key, label) in [("allOf", vocab::ALL_OF), ("oneOf", vocab::ONE_OF)] {
        if let Some(parts) = object.get(key) {
            let parts = parts
                .as_array()
                .ok_or_else(|| Error::InvalidSchema(format!("{key} of {id} is not an array")))?;
            for (index, part) in parts.iter().enumerate() {
                let child = parse_attribute(layer, part, None, state)?;
                attach(layer, node, child, label, index as i64);
            }
        }
    }
    if let Some(reference) = object.get("ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| Error::InvalidSchema(format!("ref of {id} is not a string")))?;
        layer
            .graph_mut()
            .node_mut(node)
            .set_property(vocab::REF, PropertyValue::string(reference));
    }

    for (key, value) in object {
        if STRUCTURAL_KEYS.contains(&key.as_str()) {
            continue;
        }
        let term = vocab::annotation_term(key);
        let property = PropertyValue::from_json(value)
            .ok_or_else(|| Error::InvalidSchema(format!("unsupported value for {key} on {id}")))?;
        layer.graph_mut().node_mut(node).set_property(term, property);
    }
    Ok(node)
}

fn attach(layer: &mut Layer, parent: NodeId, child: NodeId, label: &str, index: i64) {
    let edge = layer.graph_mut().new_edge(parent, child, label);
    layer
        .graph_mut()
        .edge_mut(edge)
        .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(index));
}

fn declared_kind(object: &Map<String, Value>) -> Result<Option<AttributeKind>> {
    let Some(declared) = object.get("@type") else {
        return Ok(None);
    };
    let names: Vec<&str> = match declared {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => return Err(Error::InvalidSchema("@type is not a string".into())),
    };
    Ok(names.iter().find_map(|name| AttributeKind::parse(name)))
}

fn infer_kind(object: &Map<String, Value>) -> Option<AttributeKind> {
    if object.contains_key("attributes") {
        Some(AttributeKind::Object)
    } else if object.contains_key("items") {
        Some(AttributeKind::Array)
    } else if object.contains_key("allOf") {
        Some(AttributeKind::Composite)
    } else if object.contains_key("oneOf") {
        Some(AttributeKind::Polymorphic)
    } else if object.contains_key("ref") {
        Some(AttributeKind::Reference)
    } else {
        None
    }
}

/// Renders a layer back into the native JSON form.
pub fn layer_to_json(layer: &Layer) -> Result<Value> {
    let mut out = Map::new();
    out.insert("@id".into(), Value::String(layer.id().to_string()));
    out.insert("@type".into(), Value::String(layer.layer_type()?.to_string()));
    for (key, value) in layer.graph().node(layer.info()).properties() {
        if key.as_ref() == vocab::NODE_ID || key.as_ref() == vocab::LAYER_TYPE {
            continue;
        }
        out.insert(shorthand(key), value.to_json());
    }
    if let Some(root) = layer.schema_root() {
        let mut seen = AHashSet::new();
        out.insert("layer".into(), write_attribute(layer.graph(), root, &mut seen)?);
    }
    Ok(Value::Object(out))
}

fn write_attribute(graph: &Graph, node: NodeId, seen: &mut AHashSet<NodeId>) -> Result<Value> {
    let id = node_id(graph.node(node)).unwrap_or("").to_string();
    if !seen.insert(node) {
        // Shared subtree: emit a stub pointing at the first expansion.
        return Ok(json!({ "@id": id }));
    }
    let mut out = Map::new();
    out.insert("@id".into(), Value::String(id));
    if let Ok(kind) = attribute_kind(graph.node(node)) {
        out.insert("@type".into(), Value::String(short_kind(kind).to_string()));
    }
    for (key, value) in graph.node(node).properties() {
        if key.as_ref() == vocab::NODE_ID {
            continue;
        }
        if key.as_ref() == vocab::REF {
            out.insert("ref".into(), value.to_json());
            continue;
        }
        out.insert(shorthand(key), value.to_json());
    }

    let mut attributes = Map::new();
    let mut items = Vec::new();
    let mut all_of = Vec::new();
    let mut one_of = Vec::new();
    for edge_id in graph.ordered_out_edges(node) {
        let edge = graph.edge(edge_id);
        if !vocab::is_attribute_tree_edge(edge.label()) {
            continue;
        }
        let child = write_attribute(graph, edge.to(), seen)?;
        match edge.label() {
            l if l == vocab::OBJECT_ATTRIBUTES => {
                let name = child_name(graph, edge.to());
                attributes.insert(name, child);
            }
            l if l == vocab::ARRAY_ITEMS => items.push(child),
            l if l == vocab::ALL_OF => all_of.push(child),
            _ => one_of.push(child),
        }
    }
    if !attributes.is_empty() {
        out.insert("attributes".into(), Value::Object(attributes));
    }
    if let Some(item) = items.into_iter().next() {
        out.insert("items".into(), item);
    }
    if !all_of.is_empty() {
        out.insert("allOf".into(), Value::Array(all_of));
    }
    if !one_of.is_empty() {
        out.insert("oneOf".into(), Value::Array(one_of));
    }
    Ok(Value::Object(out))
}

fn child_name(graph: &Graph, node: NodeId) -> String {
    graph
        .node(node)
        .property(vocab::ATTRIBUTE_NAME)
        .and_then(PropertyValue::as_str)
        .map(str::to_string)
        .or_else(|| node_id(graph.node(node)).map(str::to_string))
        .unwrap_or_default()
}

fn short_kind(kind: AttributeKind) -> &'static str {
    kind.label().rsplit('/').next().unwrap_or(kind.label())
}

fn shorthand(term: &str) -> String {
    term.strip_prefix("https://strataschema.org/")
        .map_or_else(|| term.to_string(), str::to_string)
}

/// Serialises a graph for downstream renderers: flat node and edge
/// lists with stable integer IDs local to this emission.
pub fn graph_to_json(graph: &Graph) -> Value {
    let mut ids = AHashMap::new();
    let mut nodes = Vec::new();
    for (index, (node_key, node)) in graph.nodes().enumerate() {
        ids.insert(node_key, index);
        let mut properties = Map::new();
        for key in node.property_keys() {
            if let Some(value) = node.property(&key) {
                properties.insert(key.to_string(), value.to_json());
            }
        }
        nodes.push(json!({
            "n": index,
            "labels": node.labels().collect::<Vec<_>>(),
            "properties": properties,
        }));
    }
    let mut edges = Vec::new();
    for (node_key, _) in graph.nodes() {
        for edge_id in graph.out_edges(node_key) {
            let edge = graph.edge(edge_id);
            let mut properties = Map::new();
            let mut keys: Vec<_> = edge.properties().map(|(k, _)| k.clone()).collect();
            keys.sort();
            for key in keys {
                if let Some(value) = edge.property(&key) {
                    properties.insert(key.to_string(), value.to_json());
                }
            }
            edges.push(json!({
                "from": ids[&edge.from()],
                "to": ids[&edge.to()],
                "label": edge.label(),
                "properties": properties,
            }));
        }
    }
    json!({ "nodes": nodes, "edges": edges })
}
