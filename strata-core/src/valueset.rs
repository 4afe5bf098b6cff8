//! Value-set lookups.
//!
//! A schema attribute can declare that its ingested value (or the
//! values of its children) should be looked up in an external value
//! set, with the results ingested as new value nodes under a context
//! ancestor. The lookup itself is a caller-supplied function; the
//! processor only drives the requests and materialises responses.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::builder::GraphBuilder;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::layer::{is_attribute_node, node_id};
use crate::property::PropertyValue;
use crate::term::vocab;

#[derive(Debug, Clone, Default)]
pub struct ValuesetLookupRequest {
    /// Key-value pairs to look up. The basic (single-value) form uses
    /// the empty key.
    pub key_values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct ValuesetLookupResponse {
    /// Looked-up values keyed like the request's result keys. Empty
    /// means no match.
    pub key_values: BTreeMap<String, String>,
}

/// The value-set annotation of a schema attribute.
#[derive(Debug, Clone)]
pub struct ValuesetInfo {
    pub attr: NodeId,
    /// Schema node ID of the ancestor under which results land;
    /// absent means the attribute's own document node.
    pub context_id: Option<Arc<str>>,
    pub request_keys: Vec<Arc<str>>,
    /// Schema attribute IRIs whose document values feed the request.
    pub request_values: Vec<Arc<str>>,
    pub result_keys: Vec<Arc<str>>,
    /// Schema attribute IRIs the response values instantiate.
    pub result_values: Vec<Arc<str>>,
}

/// Reads the value-set annotation off an attribute, if it carries one.
pub fn valueset_info(schema_graph: &Graph, attr: NodeId) -> Result<Option<ValuesetInfo>> {
    let node = schema_graph.node(attr);
    let Some(result_values) = node.property(vocab::VS_RESULT_VALUES) else {
        return Ok(None);
    };
    let list = |term: &str| -> Vec<Arc<str>> {
        node.property(term).map(PropertyValue::must_string_slice).unwrap_or_default()
    };
    let info = ValuesetInfo {
        attr,
        context_id: node
            .property(vocab::VS_CONTEXT)
            .and_then(PropertyValue::as_str)
            .map(Arc::from),
        request_keys: list(vocab::VS_REQUEST_KEYS),
        request_values: list(vocab::VS_REQUEST_VALUES),
        result_keys: list(vocab::VS_RESULT_KEYS),
        result_values: result_values.must_string_slice(),
    };
    if !info.result_keys.is_empty() && info.result_keys.len() != info.result_values.len() {
        return Err(Error::InvalidSchema(format!(
            "valueset on {} has mismatched result keys and values",
            node_id(node).unwrap_or("")
        )));
    }
    if info.request_keys.len() != info.request_values.len() {
        return Err(Error::InvalidSchema(format!(
            "valueset on {} has mismatched request keys and values",
            node_id(node).unwrap_or("")
        )));
    }
    Ok(Some(info))
}

/// Drives value-set lookups over an ingested document graph.
pub struct ValuesetProcessor<F> {
    lookup: F,
}

impl<F> ValuesetProcessor<F>
where
    F: Fn(&Context, &ValuesetLookupRequest) -> Result<ValuesetLookupResponse>,
{
    pub fn new(lookup: F) -> Self {
        ValuesetProcessor { lookup }
    }

    /// Processes every document node instantiating an attribute with a
    /// value-set annotation.
    pub fn process_graph(&self, ctx: &Context, builder: &mut GraphBuilder<'_>) -> Result<()> {
        let attrs: Vec<NodeId> = builder
            .schema_graph()
            .nodes()
            .filter(|(_, node)| is_attribute_node(node))
            .map(|(id, _)| id)
            .collect();
        for attr in attrs {
            ctx.check_cancelled()?;
            let Some(info) = valueset_info(builder.schema_graph(), attr)? else {
                continue;
            };
            let attr_id = node_id(builder.schema_graph().node(attr)).unwrap_or("").to_string();
            for doc in builder.instance_nodes(&attr_id) {
                self.process_node(ctx, builder, &info, doc)?;
            }
        }
        Ok(())
    }

    fn process_node(
        &self,
        ctx: &Context,
        builder: &mut GraphBuilder<'_>,
        info: &ValuesetInfo,
        doc: NodeId,
    ) -> Result<()> {
        let mut request = ValuesetLookupRequest::default();
        if info.request_values.is_empty() {
            let Some(raw) = builder
                .graph()
                .node(doc)
                .property(vocab::RAW_VALUE)
                .and_then(PropertyValue::as_str)
            else {
                return Ok(());
            };
            request.key_values.insert(String::new(), raw.to_string());
        } else {
            for (i, source_attr) in info.request_values.iter().enumerate() {
                let key = info.request_keys[i].to_string();
                if let Some(value) = child_value(builder, doc, source_attr) {
                    request.key_values.insert(key, value);
                }
            }
        }
        if request.key_values.is_empty() {
            return Ok(());
        }
        let response = (self.lookup)(ctx, &request)?;
        if response.key_values.is_empty() {
            return Ok(());
        }
        debug!("valueset lookup on {:?} produced {} values", doc, response.key_values.len());

        let context_node = match &info.context_id {
            None => doc,
            Some(context_id) => ancestor_with_schema_id(builder, doc, context_id)
                .ok_or_else(|| Error::CannotFindAncestor(context_id.to_string()))?,
        };
        for (i, target_attr) in info.result_values.iter().enumerate() {
            let key = info
                .result_keys
                .get(i)
                .map(|k| k.to_string())
                .unwrap_or_default();
            let Some(value) = response.key_values.get(&key).cloned() else {
                continue;
            };
            let Some(schema_attr) = attribute_in_graph(builder.schema_graph(), target_attr) else {
                return Err(Error::InvalidSchema(format!(
                    "valueset result attribute {target_attr} not in schema"
                )));
            };
            builder.value_as_node(Some(schema_attr), Some(context_node), &value)?;
        }
        Ok(())
    }
}

fn attribute_in_graph(graph: &Graph, id: &str) -> Option<NodeId> {
    graph
        .nodes()
        .find(|(_, node)| is_attribute_node(node) && node_id(node) == Some(id))
        .map(|(n, _)| n)
}

/// The document value of the child of `doc` instantiating
/// `source_attr`.
fn child_value(builder: &GraphBuilder<'_>, doc: NodeId, source_attr: &str) -> Option<String> {
    let graph = builder.graph();
    let wanted = PropertyValue::string(source_attr);
    if graph.node(doc).property(vocab::SCHEMA_NODE_ID) == Some(&wanted) {
        return graph
            .node(doc)
            .property(vocab::RAW_VALUE)
            .and_then(PropertyValue::as_str)
            .map(str::to_string);
    }
    graph.out_edges(doc).find_map(|e| {
        let child = graph.edge(e).to();
        (graph.node(child).property(vocab::SCHEMA_NODE_ID) == Some(&wanted))
            .then(|| {
                graph
                    .node(child)
                    .property(vocab::RAW_VALUE)
                    .and_then(PropertyValue::as_str)
                    .map(str::to_string)
            })
            .flatten()
    })
}

/// The nearest ancestor of `doc` (including itself) instantiating the
/// schema node `context_id`.
fn ancestor_with_schema_id(
    builder: &GraphBuilder<'_>,
    doc: NodeId,
    context_id: &str,
) -> Option<NodeId> {
    let graph = builder.graph();
    let wanted = PropertyValue::string(context_id);
    let mut current = doc;
    loop {
        if graph.node(current).property(vocab::SCHEMA_NODE_ID) == Some(&wanted) {
            return Some(current);
        }
        current = graph.in_edges(current).find_map(|e| {
            let edge = graph.edge(e);
            (edge.label() != vocab::INSTANCE_OF
                && graph.node(edge.from()).has_label(vocab::DOCUMENT_NODE))
            .then(|| edge.from())
        })?;
    }
}
