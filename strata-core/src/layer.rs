//! The layer model: a schema layer represented in the graph.
//!
//! A layer is a graph holding one layer info node (labelled `Layer`,
//! carrying the layer ID and layer type) and an attribute subtree
//! reachable from it through a `layerRoot` edge. Every attribute node
//! carries the `Attribute` label plus exactly one kind label.

use std::str::FromStr;
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, NodeId};
use crate::property::PropertyValue;
use crate::term::vocab;

/// Schema base or overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum LayerType {
    #[strum(serialize = "Schema")]
    Schema,
    #[strum(serialize = "Overlay")]
    Overlay,
}

/// The kind of a schema attribute. Exactly one per attribute node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Value,
    Object,
    Array,
    Reference,
    Polymorphic,
    Composite,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 6] = [
        AttributeKind::Value,
        AttributeKind::Object,
        AttributeKind::Array,
        AttributeKind::Reference,
        AttributeKind::Polymorphic,
        AttributeKind::Composite,
    ];

    /// The full label IRI for this kind.
    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::Value => vocab::VALUE,
            AttributeKind::Object => vocab::OBJECT,
            AttributeKind::Array => vocab::ARRAY,
            AttributeKind::Reference => vocab::REFERENCE,
            AttributeKind::Polymorphic => vocab::POLYMORPHIC,
            AttributeKind::Composite => vocab::COMPOSITE,
        }
    }

    /// Parses either the short form (`"Object"`) or the full IRI.
    pub fn parse(s: &str) -> Option<AttributeKind> {
        Self::ALL
            .into_iter()
            .find(|k| k.label() == s || k.label().ends_with(&format!("/{s}")))
    }
}

/// The blank-node prefix; attribute IDs starting with it are renamed
/// by the compiler before a layer enters the shared compiled graph.
pub const BLANK_NODE_PREFIX: &str = "_b:";

/// The stable node ID (the attribute IRI for attribute nodes).
pub fn node_id(node: &Node) -> Option<&str> {
    node.property(vocab::NODE_ID).and_then(PropertyValue::as_str)
}

pub fn set_node_id(node: &mut Node, id: &str) {
    node.set_property(vocab::NODE_ID, PropertyValue::string(id));
}

pub fn is_attribute_node(node: &Node) -> bool {
    node.has_label(vocab::ATTRIBUTE)
}

/// The kind of an attribute node, enforcing kind uniqueness.
pub fn attribute_kind(node: &Node) -> Result<AttributeKind> {
    let mut found = None;
    for kind in AttributeKind::ALL {
        if node.has_label(kind.label()) {
            if found.is_some() {
                return Err(Error::InvalidSchema(format!(
                    "attribute {} has more than one kind",
                    node_id(node).unwrap_or("")
                )));
            }
            found = Some(kind);
        }
    }
    found.ok_or_else(|| {
        Error::InvalidSchema(format!(
            "attribute {} has no kind",
            node_id(node).unwrap_or("")
        ))
    })
}

/// Walks the attribute tree from `root` in index order, returning every
/// attribute node once. The traversal tolerates shared subtrees (nodes
/// with several incoming attribute-tree edges) and cycles.
pub fn attribute_nodes(graph: &Graph, root: NodeId) -> Vec<NodeId> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(current) = stack.pop() {
        if !seen.insert(current) {
            continue;
        }
        if is_attribute_node(graph.node(current)) {
            out.push(current);
        }
        // Depth-first in reverse so index order pops first.
        let edges = graph.ordered_out_edges(current);
        for edge in edges.into_iter().rev() {
            let edge = graph.edge(edge);
            if vocab::is_attribute_tree_edge(edge.label()) {
                stack.push(edge.to());
            }
        }
    }
    out
}

/// The parent attribute of `node` through an incoming attribute-tree
/// edge, if any.
pub fn parent_attribute(graph: &Graph, node: NodeId) -> Option<NodeId> {
    graph.in_edges(node).find_map(|e| {
        let edge = graph.edge(e);
        (vocab::is_attribute_tree_edge(edge.label()) && is_attribute_node(graph.node(edge.from())))
            .then(|| edge.from())
    })
}

/// A schema layer: a graph plus its layer info node.
#[derive(Debug)]
pub struct Layer {
    graph: Graph,
    info: NodeId,
}

impl Layer {
    /// An empty layer of the given type with no attribute tree.
    pub fn new(layer_type: LayerType, id: &str) -> Layer {
        let mut graph = Graph::new();
        let info = graph.new_node([vocab::LAYER]);
        let node = graph.node_mut(info);
        set_node_id(node, id);
        node.set_property(vocab::LAYER_TYPE, PropertyValue::string(layer_type.to_string()));
        Layer { graph, info }
    }

    /// Wraps an existing graph and info node. The info node must carry
    /// the `Layer` label.
    pub fn from_graph(graph: Graph, info: NodeId) -> Result<Layer> {
        if !graph.node(info).has_label(vocab::LAYER) {
            return Err(Error::InvalidSchema("not a layer info node".into()));
        }
        Ok(Layer { graph, info })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn info(&self) -> NodeId {
        self.info
    }

    pub fn id(&self) -> Arc<str> {
        match self.graph.node(self.info).property(vocab::NODE_ID) {
            Some(PropertyValue::Str(s)) => s.clone(),
            _ => Arc::from(""),
        }
    }

    pub fn set_id(&mut self, id: &str) {
        set_node_id(self.graph.node_mut(self.info), id);
    }

    pub fn layer_type(&self) -> Result<LayerType> {
        let raw = self
            .graph
            .node(self.info)
            .property(vocab::LAYER_TYPE)
            .and_then(PropertyValue::as_str)
            .unwrap_or("");
        LayerType::from_str(raw)
            .map_err(|_| Error::InvalidSchema(format!("invalid layer type: {raw}")))
    }

    pub fn set_layer_type(&mut self, layer_type: LayerType) {
        self.graph
            .node_mut(self.info)
            .set_property(vocab::LAYER_TYPE, PropertyValue::string(layer_type.to_string()));
    }

    pub fn value_type(&self) -> Option<PropertyValue> {
        self.graph.node(self.info).property(vocab::VALUE_TYPE).cloned()
    }

    /// The declared character set of source documents; absent means
    /// UTF-8.
    pub fn encoding(&self) -> Option<Arc<str>> {
        match self.graph.node(self.info).property(vocab::CHARACTER_ENCODING) {
            Some(PropertyValue::Str(s)) => Some(s.clone()),
            _ => None,
        }
    }

    /// The attribute reachable from the info node through `layerRoot`.
    pub fn schema_root(&self) -> Option<NodeId> {
        self.graph
            .out_edges_with_label(self.info, vocab::LAYER_ROOT)
            .next()
            .map(|e| self.graph.edge(e).to())
    }

    /// Connects `root` as the schema root, replacing any existing one.
    pub fn set_schema_root(&mut self, root: NodeId) {
        let old: Vec<_> = self
            .graph
            .out_edges_with_label(self.info, vocab::LAYER_ROOT)
            .collect();
        for edge in old {
            self.graph.remove_edge(edge);
        }
        self.graph.new_edge(self.info, root, vocab::LAYER_ROOT);
    }

    /// Every attribute node of the layer, in tree order.
    pub fn attributes(&self) -> Vec<NodeId> {
        match self.schema_root() {
            Some(root) => attribute_nodes(&self.graph, root),
            None => Vec::new(),
        }
    }

    pub fn find_attribute_by_id(&self, id: &str) -> Option<NodeId> {
        self.attributes()
            .into_iter()
            .find(|&a| node_id(self.graph.node(a)) == Some(id))
    }

    /// Rewrites every attribute whose ID carries the blank-node prefix
    /// to a name produced by `namer`.
    pub fn rename_blank_nodes(&mut self, namer: &mut dyn FnMut() -> String) {
        for attr in self.attributes() {
            let is_blank = node_id(self.graph.node(attr))
                .map(|id| id.starts_with(BLANK_NODE_PREFIX))
                .unwrap_or(true);
            if is_blank {
                let fresh = namer();
                set_node_id(self.graph.node_mut(attr), &fresh);
            }
        }
    }

    /// Copies the layer into `target`, returning the copied info node
    /// and the node map.
    pub fn clone_into(&self, target: &mut Graph) -> (NodeId, AHashMap<NodeId, NodeId>) {
        let mut map = AHashMap::new();
        let info = self.graph.copy_subgraph_into(self.info, target, &mut map);
        (info, map)
    }

    /// An independent copy in a fresh graph, plus the node map.
    pub fn clone_layer(&self) -> (Layer, AHashMap<NodeId, NodeId>) {
        let mut graph = Graph::new();
        let (info, map) = self.clone_into(&mut graph);
        (Layer { graph, info }, map)
    }
}
