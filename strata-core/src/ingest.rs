//! Schema-directed ingestion of document trees.
//!
//! The engine walks an input tree in lockstep with a compiled schema's
//! attribute tree, using the [`GraphBuilder`] strategies to emit
//! document nodes, edges, and deferred properties. Polymorphic
//! attributes are resolved by trying options in declared order and
//! taking the first whose subtree matches without validator failures.
//!
//! Deferred properties travel upward as an explicit vector beside the
//! returned subtree and attach when the targeted enclosing object
//! closes; any survivor after the root closes is an error.

use std::sync::Arc;

use log::debug;

use crate::builder::GraphBuilder;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::layer::{attribute_kind, node_id, AttributeKind};
use crate::property::PropertyValue;
use crate::term::vocab;

/// The scalar type of an input value, used by polymorphic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
}

/// A parsed input document tree. Front-ends (JSON, XML) reduce their
/// input to this shape; object entries keep document order.
#[derive(Debug, Clone)]
pub enum DocValue {
    Null,
    Scalar { value: String, kind: ScalarKind },
    Object(Vec<(String, DocValue)>),
    Array(Vec<DocValue>),
}

impl DocValue {
    pub fn string(value: impl Into<String>) -> Self {
        DocValue::Scalar {
            value: value.into(),
            kind: ScalarKind::String,
        }
    }

    pub fn integer(value: i64) -> Self {
        DocValue::Scalar {
            value: value.to_string(),
            kind: ScalarKind::Integer,
        }
    }

    pub fn boolean(value: bool) -> Self {
        DocValue::Scalar {
            value: value.to_string(),
            kind: ScalarKind::Boolean,
        }
    }
}

/// How a schema attribute asks to be ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum IngestAs {
    #[default]
    #[strum(serialize = "node")]
    Node,
    #[strum(serialize = "edge")]
    Edge,
    #[strum(serialize = "property")]
    Property,
}

/// The `ingestAs` strategy of a schema node, defaulting to node.
pub fn ingest_as(builder: &GraphBuilder<'_>, schema_node: NodeId) -> IngestAs {
    builder
        .schema_graph()
        .node(schema_node)
        .property(vocab::INGEST_AS)
        .and_then(PropertyValue::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// A value waiting for its target ancestor to close.
#[derive(Debug, Clone)]
struct Deferred {
    target: Option<Arc<str>>,
    name: Arc<str>,
    value: String,
}

/// Ingests `doc` under the compiled schema attribute `schema_root`,
/// returning the document root node. `base_id` seeds the error paths.
///
/// Returns `Ok(None)` only when the whole input is dropped by the
/// `only_schema_attributes` option.
pub fn ingest(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    base_id: &str,
    schema_root: Option<NodeId>,
    doc: &DocValue,
) -> Result<Option<NodeId>> {
    let mut deferred = Vec::new();
    let root = ingest_node(ctx, builder, base_id, schema_root, None, doc, &mut deferred, None, None)?;
    if let Some(unresolved) = deferred.first() {
        return Err(Error::NoParentNode(unresolved.name.to_string()));
    }
    Ok(root)
}

#[allow(clippy::too_many_arguments)]
fn ingest_node(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    key: &str,
    schema: Option<NodeId>,
    parent: Option<NodeId>,
    value: &DocValue,
    deferred: &mut Vec<Deferred>,
    attr_name: Option<&str>,
    attr_index: Option<i64>,
) -> Result<Option<NodeId>> {
    ctx.check_cancelled()?;

    // Resolve polymorphic slots to the first matching option before
    // anything else.
    let schema = match schema {
        Some(s) if kind_of(builder, s)? == Some(AttributeKind::Polymorphic) => {
            Some(resolve_option(ctx, builder, s, value)?)
        }
        other => other,
    };

    let created = match value {
        DocValue::Null => ingest_null(builder, schema, parent)?,
        DocValue::Scalar { value: raw, kind } => {
            ingest_scalar(ctx, builder, key, schema, parent, raw, *kind, deferred)?
        }
        DocValue::Object(entries) => {
            ingest_object(ctx, builder, key, schema, parent, entries, deferred)?
        }
        DocValue::Array(items) => {
            ingest_array(ctx, builder, key, schema, parent, items, deferred)?
        }
    };
    if let Some(node) = created {
        if let Some(name) = attr_name {
            builder
                .graph_mut()
                .node_mut(node)
                .set_property(vocab::ATTRIBUTE_NAME, PropertyValue::string(name));
        }
        if let Some(index) = attr_index {
            builder
                .graph_mut()
                .node_mut(node)
                .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(index));
        }
    }
    Ok(created)
}

fn kind_of(builder: &GraphBuilder<'_>, schema: NodeId) -> Result<Option<AttributeKind>> {
    let node = builder.schema_graph().node(schema);
    if !node.has_label(vocab::ATTRIBUTE) {
        return Ok(None);
    }
    attribute_kind(node).map(Some)
}

fn schema_id(builder: &GraphBuilder<'_>, schema: NodeId) -> String {
    node_id(builder.schema_graph().node(schema)).unwrap_or("").to_string()
}

fn ingest_null(
    builder: &mut GraphBuilder<'_>,
    schema: Option<NodeId>,
    parent: Option<NodeId>,
) -> Result<Option<NodeId>> {
    if schema.is_none() && builder.options().only_schema_attributes {
        return Ok(None);
    }
    let node = builder.new_node(schema);
    builder.graph_mut().node_mut(node).add_label(vocab::VALUE);
    if let Some(parent) = parent {
        builder.graph_mut().new_edge(parent, node, vocab::HAS);
    }
    Ok(Some(node))
}

#[allow(clippy::too_many_arguments)]
fn ingest_scalar(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    key: &str,
    schema: Option<NodeId>,
    parent: Option<NodeId>,
    raw: &str,
    _kind: ScalarKind,
    deferred: &mut Vec<Deferred>,
) -> Result<Option<NodeId>> {
    if let Some(schema) = schema {
        match kind_of(builder, schema)? {
            Some(AttributeKind::Value) | None => {}
            Some(other) => {
                return Err(Error::InvalidSchema(format!(
                    "schema expects {other:?}, document has a value"
                ))
                .with_key(key))
            }
        }
        validate_scalar(ctx, builder, schema, raw).map_err(|e| e.with_key(key))?;

        match ingest_as(builder, schema) {
            IngestAs::Property => {
                let node = builder.schema_graph().node(schema);
                let target = node
                    .property(vocab::AS_PROPERTY_OF)
                    .and_then(PropertyValue::as_str)
                    .map(Arc::from);
                let name: Arc<str> = node
                    .property(vocab::PROPERTY_NAME)
                    .or_else(|| node.property(vocab::ATTRIBUTE_NAME))
                    .and_then(PropertyValue::as_str)
                    .map(Arc::from)
                    .ok_or_else(|| {
                        Error::CannotDeterminePropertyName(schema_id(builder, schema))
                    })?;
                // The value may still feed the entity ID even though no
                // node is materialised.
                if let Some(parent) = parent {
                    builder.set_entity_id(raw, parent, schema);
                }
                deferred.push(Deferred {
                    target,
                    name,
                    value: raw.to_string(),
                });
                return Ok(None);
            }
            IngestAs::Edge => {
                let parent = parent.ok_or_else(|| {
                    Error::InvalidSchema("document root cannot be ingested as an edge".into())
                })?;
                let created = builder
                    .value_as_edge(Some(schema), parent, raw)
                    .map_err(|e| e.with_key(key))?;
                return Ok(created.map(|(_, node)| node));
            }
            IngestAs::Node => {}
        }
    }
    let created = builder
        .value_as_node(schema, parent, raw)
        .map_err(|e| e.with_key(key))?;
    Ok(created.map(|(_, node)| node))
}

fn validate_scalar(
    ctx: &Context,
    builder: &GraphBuilder<'_>,
    schema: NodeId,
    raw: &str,
) -> Result<()> {
    let node = builder.schema_graph().node(schema);
    for key in node.property_keys() {
        if let Some(validator) = ctx.registry().validator(&key) {
            validator.validate_value(Some(raw), node)?;
        }
    }
    Ok(())
}

fn ingest_object(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    key: &str,
    schema: Option<NodeId>,
    parent: Option<NodeId>,
    entries: &[(String, DocValue)],
    deferred: &mut Vec<Deferred>,
) -> Result<Option<NodeId>> {
    let mut children = Vec::new();
    let mut self_id = None;
    if let Some(schema) = schema {
        match kind_of(builder, schema)? {
            Some(AttributeKind::Object) => {}
            Some(other) => {
                return Err(Error::InvalidSchema(format!(
                    "schema expects {other:?}, document has an object"
                ))
                .with_key(key))
            }
            None => {}
        }
        children = object_children(builder, schema).map_err(|e| e.with_key(key))?;
        self_id = Some(schema_id(builder, schema));
    }

    let created = match (schema.map(|s| ingest_as(builder, s)), parent) {
        (Some(IngestAs::Edge), Some(parent)) => builder
            .object_as_edge(schema, Some(parent))
            .map_err(|e| e.with_key(key))?
            .map(|(_, node)| node),
        (Some(IngestAs::Property), _) => {
            return Err(
                Error::InvalidSchema("an object cannot be ingested as a property".into())
                    .with_key(key),
            )
        }
        _ => builder
            .object_as_node(schema, parent)
            .map_err(|e| e.with_key(key))?
            .map(|(_, node)| node),
    };
    let Some(node) = created else {
        return Ok(None);
    };

    let first_deferred = deferred.len();
    for (name, value) in entries {
        let child_key = format!("{key}.{name}");
        let child_schema = children
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, schema)| schema);
        ingest_node(
            ctx,
            builder,
            &child_key,
            child_schema,
            Some(node),
            value,
            deferred,
            Some(name),
            None,
        )?;
    }

    // Required schema attributes must appear in the document.
    for (name, child) in &children {
        let required = builder
            .schema_graph()
            .node(*child)
            .property(vocab::REQUIRED)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false);
        if required && !entries.iter().any(|(n, _)| n == name) {
            return Err(Error::Validation {
                validator: "required",
                msg: format!("missing required attribute {name}"),
                value: None,
            }
            .with_key(key));
        }
    }

    // This object is closing: attach the deferred properties that
    // target it (or that have no target), keep the rest moving up.
    let mut keep = Vec::new();
    for d in deferred.drain(first_deferred..) {
        let matches = match (&d.target, &self_id) {
            (None, _) => true,
            (Some(target), Some(id)) => target.as_ref() == id,
            (Some(_), None) => false,
        };
        if matches {
            builder
                .graph_mut()
                .node_mut(node)
                .set_property(d.name.clone(), PropertyValue::string(&d.value));
        } else {
            keep.push(d);
        }
    }
    deferred.extend(keep);
    Ok(Some(node))
}

/// The name → attribute table of a schema object, by `attributeName`
/// with the attribute IRI as fallback. Duplicates are invalid.
fn object_children(builder: &GraphBuilder<'_>, schema: NodeId) -> Result<Vec<(String, NodeId)>> {
    let graph = builder.schema_graph();
    let mut out: Vec<(String, NodeId)> = Vec::new();
    for edge in graph.ordered_out_edges(schema) {
        let edge = graph.edge(edge);
        if edge.label() != vocab::OBJECT_ATTRIBUTES {
            continue;
        }
        let child = edge.to();
        let name = graph
            .node(child)
            .property(vocab::ATTRIBUTE_NAME)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .or_else(|| node_id(graph.node(child)).map(str::to_string))
            .unwrap_or_default();
        if out.iter().any(|(n, _)| *n == name) {
            return Err(Error::InvalidSchema(format!("duplicate attribute name {name}")));
        }
        out.push((name, child));
    }
    Ok(out)
}

fn ingest_array(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    key: &str,
    schema: Option<NodeId>,
    parent: Option<NodeId>,
    items: &[DocValue],
    deferred: &mut Vec<Deferred>,
) -> Result<Option<NodeId>> {
    let mut element = None;
    if let Some(schema) = schema {
        match kind_of(builder, schema)? {
            Some(AttributeKind::Array) => {}
            Some(other) => {
                return Err(Error::InvalidSchema(format!(
                    "schema expects {other:?}, document has an array"
                ))
                .with_key(key))
            }
            None => {}
        }
        element = array_element(builder, schema).map_err(|e| e.with_key(key))?;
    }
    let created = match (schema.map(|s| ingest_as(builder, s)), parent) {
        (Some(IngestAs::Edge), Some(parent)) => builder
            .array_as_edge(schema, Some(parent))
            .map_err(|e| e.with_key(key))?
            .map(|(_, node)| node),
        (Some(IngestAs::Property), _) => {
            return Err(
                Error::InvalidSchema("an array cannot be ingested as a property".into())
                    .with_key(key),
            )
        }
        _ => builder
            .array_as_node(schema, parent)
            .map_err(|e| e.with_key(key))?
            .map(|(_, node)| node),
    };
    let Some(node) = created else {
        return Ok(None);
    };
    for (i, item) in items.iter().enumerate() {
        let child_key = format!("{key}.{i}");
        ingest_node(
            ctx,
            builder,
            &child_key,
            element,
            Some(node),
            item,
            deferred,
            None,
            Some(i as i64),
        )?;
    }
    Ok(Some(node))
}

/// The single element attribute of an array schema.
fn array_element(builder: &GraphBuilder<'_>, schema: NodeId) -> Result<Option<NodeId>> {
    let graph = builder.schema_graph();
    let elements: Vec<NodeId> = graph
        .out_edges_with_label(schema, vocab::ARRAY_ITEMS)
        .map(|e| graph.edge(e).to())
        .collect();
    match elements.as_slice() {
        [] => Ok(None),
        [element] => Ok(Some(*element)),
        _ => Err(Error::InvalidSchema("array with more than one element attribute".into())),
    }
}

/// Picks the first polymorphic option that matches `value`, in
/// declared order.
fn resolve_option(
    ctx: &Context,
    builder: &GraphBuilder<'_>,
    schema: NodeId,
    value: &DocValue,
) -> Result<NodeId> {
    let graph = builder.schema_graph();
    for edge in graph.ordered_out_edges(schema) {
        let edge = graph.edge(edge);
        if edge.label() != vocab::ONE_OF {
            continue;
        }
        let option = edge.to();
        if option_matches(ctx, builder, option, value)? {
            debug!("polymorphic {} -> {}", schema_id(builder, schema), schema_id(builder, option));
            return Ok(option);
        }
    }
    Err(Error::NoOptionsMatch(schema_id(builder, schema)))
}

/// Dry-run structural and validator match of a schema subtree against
/// an input subtree. Strict: any nested validator failure disqualifies
/// the option.
fn option_matches(
    ctx: &Context,
    builder: &GraphBuilder<'_>,
    schema: NodeId,
    value: &DocValue,
) -> Result<bool> {
    ctx.check_cancelled()?;
    let graph = builder.schema_graph();
    let Some(kind) = kind_of(builder, schema)? else {
        return Ok(true);
    };
    match kind {
        AttributeKind::Value => match value {
            DocValue::Null => Ok(true),
            DocValue::Scalar { value: raw, kind } => {
                let declared = graph.node(schema).property(vocab::VALUE_TYPE);
                if !scalar_type_matches(declared, *kind) {
                    return Ok(false);
                }
                Ok(validate_scalar(ctx, builder, schema, raw).is_ok())
            }
            _ => Ok(false),
        },
        AttributeKind::Object => {
            let DocValue::Object(entries) = value else {
                return Ok(false);
            };
            let children = object_children(builder, schema)?;
            for (name, child) in &children {
                let required = graph
                    .node(*child)
                    .property(vocab::REQUIRED)
                    .and_then(PropertyValue::as_bool)
                    .unwrap_or(false);
                match entries.iter().find(|(n, _)| n == name) {
                    Some((_, child_value)) => {
                        if !option_matches(ctx, builder, *child, child_value)? {
                            return Ok(false);
                        }
                    }
                    None if required => return Ok(false),
                    None => {}
                }
            }
            Ok(true)
        }
        AttributeKind::Array => {
            let DocValue::Array(items) = value else {
                return Ok(false);
            };
            match array_element(builder, schema)? {
                None => Ok(true),
                Some(element) => {
                    for item in items {
                        if !option_matches(ctx, builder, element, item)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
            }
        }
        AttributeKind::Polymorphic => {
            for edge in graph.ordered_out_edges(schema) {
                let edge = graph.edge(edge);
                if edge.label() == vocab::ONE_OF && option_matches(ctx, builder, edge.to(), value)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        AttributeKind::Reference | AttributeKind::Composite => Ok(false),
    }
}

/// Matches a declared value type (single or list) against the scalar
/// kind of the input. Unknown declarations match anything.
fn scalar_type_matches(declared: Option<&PropertyValue>, kind: ScalarKind) -> bool {
    let Some(declared) = declared else {
        return true;
    };
    let names = declared.must_string_slice();
    if names.is_empty() {
        return true;
    }
    names.iter().any(|name| match name.as_ref() {
        "string" => kind == ScalarKind::String,
        "integer" => kind == ScalarKind::Integer,
        "number" => kind == ScalarKind::Integer || kind == ScalarKind::Number,
        "boolean" => kind == ScalarKind::Boolean,
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilderOptions;
    use crate::graph::Graph;
    use crate::layer::set_node_id;

    fn attr(g: &mut Graph, kind: &str, id: &str) -> NodeId {
        let node = g.new_node([vocab::ATTRIBUTE, kind]);
        set_node_id(g.node_mut(node), id);
        node
    }

    fn child_edge(g: &mut Graph, parent: NodeId, child: NodeId, label: &str, index: i64) {
        let edge = g.new_edge(parent, child, label);
        g.edge_mut(edge)
            .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(index));
    }

    fn named(g: &mut Graph, node: NodeId, name: &str) {
        g.node_mut(node)
            .set_property(vocab::ATTRIBUTE_NAME, PropertyValue::string(name));
    }

    #[test]
    fn polymorphic_first_match_wins() {
        let mut g = Graph::new();
        let root = attr(&mut g, vocab::POLYMORPHIC, "p");
        let int_opt = attr(&mut g, vocab::VALUE, "p.int");
        g.node_mut(int_opt)
            .set_property(vocab::VALUE_TYPE, PropertyValue::string("integer"));
        let str_opt = attr(&mut g, vocab::VALUE, "p.str");
        g.node_mut(str_opt)
            .set_property(vocab::VALUE_TYPE, PropertyValue::string("string"));
        child_edge(&mut g, root, int_opt, vocab::ONE_OF, 0);
        child_edge(&mut g, root, str_opt, vocab::ONE_OF, 1);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &g,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let node = ingest(&ctx, &mut builder, "doc", Some(root), &DocValue::string("hello"))
            .unwrap()
            .unwrap();
        assert_eq!(
            builder.graph().node(node).property(vocab::SCHEMA_NODE_ID),
            Some(&PropertyValue::string("p.str"))
        );

        let node = ingest(&ctx, &mut builder, "doc", Some(root), &DocValue::integer(42))
            .unwrap()
            .unwrap();
        assert_eq!(
            builder.graph().node(node).property(vocab::SCHEMA_NODE_ID),
            Some(&PropertyValue::string("p.int"))
        );

        let err = ingest(&ctx, &mut builder, "doc", Some(root), &DocValue::boolean(true))
            .unwrap_err();
        assert!(matches!(err, Error::NoOptionsMatch(_)));
    }

    #[test]
    fn property_ingestion_defers_to_ancestor() {
        let mut g = Graph::new();
        let root = attr(&mut g, vocab::OBJECT, "root");
        let v = attr(&mut g, vocab::VALUE, "root.v");
        named(&mut g, v, "v");
        g.node_mut(v)
            .set_property(vocab::INGEST_AS, PropertyValue::string("property"));
        g.node_mut(v)
            .set_property(vocab::AS_PROPERTY_OF, PropertyValue::string("root"));
        g.node_mut(v)
            .set_property(vocab::PROPERTY_NAME, PropertyValue::string("tag"));
        child_edge(&mut g, root, v, vocab::OBJECT_ATTRIBUTES, 0);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &g,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let doc = DocValue::Object(vec![("v".into(), DocValue::string("hi"))]);
        let node = ingest(&ctx, &mut builder, "doc", Some(root), &doc)
            .unwrap()
            .unwrap();
        assert_eq!(
            builder.graph().node(node).property("tag"),
            Some(&PropertyValue::string("hi"))
        );
        // The value produced a property, not a child node.
        assert_eq!(builder.graph().out_edges(node).count(), 0);
    }

    #[test]
    fn unresolved_deferred_fails() {
        let mut g = Graph::new();
        let root = attr(&mut g, vocab::OBJECT, "root");
        let v = attr(&mut g, vocab::VALUE, "root.v");
        named(&mut g, v, "v");
        g.node_mut(v)
            .set_property(vocab::INGEST_AS, PropertyValue::string("property"));
        g.node_mut(v)
            .set_property(vocab::AS_PROPERTY_OF, PropertyValue::string("nowhere"));
        child_edge(&mut g, root, v, vocab::OBJECT_ATTRIBUTES, 0);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &g,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let doc = DocValue::Object(vec![("v".into(), DocValue::string("hi"))]);
        let err = ingest(&ctx, &mut builder, "doc", Some(root), &doc).unwrap_err();
        assert!(matches!(err, Error::NoParentNode(_)));
    }

    #[test]
    fn arrays_index_their_children() {
        let mut g = Graph::new();
        let root = attr(&mut g, vocab::ARRAY, "arr");
        let element = attr(&mut g, vocab::VALUE, "arr.*");
        child_edge(&mut g, root, element, vocab::ARRAY_ITEMS, 0);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &g,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let doc = DocValue::Array(vec![DocValue::string("a"), DocValue::string("b")]);
        let node = ingest(&ctx, &mut builder, "doc", Some(root), &doc)
            .unwrap()
            .unwrap();
        let indexes: Vec<i64> = builder
            .graph()
            .out_edges(node)
            .map(|e| {
                let child = builder.graph().edge(e).to();
                builder
                    .graph()
                    .node(child)
                    .property(vocab::ATTRIBUTE_INDEX)
                    .and_then(PropertyValue::as_int)
                    .unwrap()
            })
            .collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn required_attributes_are_enforced() {
        let mut g = Graph::new();
        let root = attr(&mut g, vocab::OBJECT, "root");
        let v = attr(&mut g, vocab::VALUE, "root.v");
        named(&mut g, v, "v");
        g.node_mut(v)
            .set_property(vocab::REQUIRED, PropertyValue::Bool(true));
        child_edge(&mut g, root, v, vocab::OBJECT_ATTRIBUTES, 0);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &g,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let err = ingest(&ctx, &mut builder, "doc", Some(root), &DocValue::Object(vec![]))
            .unwrap_err();
        assert!(matches!(err, Error::DataIngestion { .. }));
    }
}
