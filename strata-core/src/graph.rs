//! Labelled property graph substrate.
//!
//! Nodes carry a set of string labels and a property map; edges carry a
//! single label and a property map. Both live in slotmap arenas, so
//! node and edge identity is a stable key that survives unrelated
//! insertions and removals. Subgraph copies return a node map from
//! source keys to target keys.
//!
//! Out-edge iteration preserves insertion order. Traversals that need
//! the schema ordering sort by the integer `attributeIndex` property
//! carried on attribute-tree edges; see [`Graph::ordered_out_edges`].

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use slotmap::{new_key_type, SlotMap};

use crate::property::PropertyValue;
use crate::term::vocab;

new_key_type! {
    /// A unique identifier for a node within its graph.
    pub struct NodeId;
}

new_key_type! {
    /// A unique identifier for an edge within its graph.
    pub struct EdgeId;
}

/// Property maps are keyed by interned term IRIs.
pub type PropertyMap = AHashMap<Arc<str>, PropertyValue>;

/// Node labels, kept sorted for deterministic iteration.
pub type LabelSet = BTreeSet<Arc<str>>;

/// An artifact produced by a per-term compiler, stored beside the
/// source property. Typed property values cannot carry these, so each
/// node and edge keeps a side bag keyed by the term IRI.
#[derive(Debug, Clone)]
pub enum CompiledValue {
    /// A compiled regular expression.
    Regex(regex::Regex),
    /// An opaque compiled string (validated format names and the like).
    Str(Arc<str>),
}

impl CompiledValue {
    pub fn as_regex(&self) -> Option<&regex::Regex> {
        match self {
            CompiledValue::Regex(r) => Some(r),
            CompiledValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CompiledValue::Str(s) => Some(s),
            CompiledValue::Regex(_) => None,
        }
    }
}

type CompiledMap = AHashMap<Arc<str>, CompiledValue>;

/*
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
╔═══════════════════════════════════════════════════════════════════════╗
║                                                                       ║
║                                 Node                                  ║
║                                 ¯¯¯¯                                  ║
╚═══════════════════════════════════════════════════════════════════════╝
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
*/

/// A node: labels, properties, compiled-artifact bag, adjacency.
#[derive(Debug, Default, Clone)]
pub struct Node {
    labels: LabelSet,
    properties: PropertyMap,
    compiled: CompiledMap,
    out: Vec<EdgeId>,
    inc: Vec<EdgeId>,
}

impl Node {
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(AsRef::as_ref)
    }

    pub fn label_set(&self) -> &LabelSet {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn add_label(&mut self, label: impl AsRef<str>) {
        self.labels.insert(Arc::from(label.as_ref()));
    }

    pub fn remove_label(&mut self, label: &str) {
        self.labels.remove(label);
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl AsRef<str>, value: PropertyValue) {
        self.properties.insert(Arc::from(key.as_ref()), value);
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&Arc<str>, &PropertyValue)> {
        self.properties.iter()
    }

    /// Property keys in sorted order, for deterministic walks.
    pub fn property_keys(&self) -> Vec<Arc<str>> {
        let mut keys: Vec<Arc<str>> = self.properties.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn compiled(&self, key: &str) -> Option<&CompiledValue> {
        self.compiled.get(key)
    }

    pub fn set_compiled(&mut self, key: impl AsRef<str>, value: CompiledValue) {
        self.compiled.insert(Arc::from(key.as_ref()), value);
    }

    pub fn compiled_entries(&self) -> impl Iterator<Item = (&Arc<str>, &CompiledValue)> {
        self.compiled.iter()
    }
}

/*
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
╔═══════════════════════════════════════════════════════════════════════╗
║                                                                       ║
║                                 Edge                                  ║
║                                 ¯¯¯¯                                  ║
╚═══════════════════════════════════════════════════════════════════════╝
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
*/

/// A directed edge with a single label and a property map.
#[derive(Debug, Clone)]
pub struct Edge {
    from: NodeId,
    to: NodeId,
    label: Arc<str>,
    properties: PropertyMap,
    compiled: CompiledMap,
}

impl Edge {
    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl AsRef<str>, value: PropertyValue) {
        self.properties.insert(Arc::from(key.as_ref()), value);
    }

    pub fn properties(&self) -> impl Iterator<Item = (&Arc<str>, &PropertyValue)> {
        self.properties.iter()
    }

    pub fn property_map(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn set_compiled(&mut self, key: impl AsRef<str>, value: CompiledValue) {
        self.compiled.insert(Arc::from(key.as_ref()), value);
    }

    pub fn compiled(&self, key: &str) -> Option<&CompiledValue> {
        self.compiled.get(key)
    }
}

/*
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
╔═══════════════════════════════════════════════════════════════════════╗
║                                                                       ║
║                                 Graph                                 ║
║                                 ¯¯¯¯¯                                 ║
╚═══════════════════════════════════════════════════════════════════════╝
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
*/

/// A directed labelled property graph backed by slotmap arenas.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    edges: SlotMap<EdgeId, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a node with the given labels.
    pub fn new_node<I, S>(&mut self, labels: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut node = Node::default();
        for label in labels {
            node.add_label(label);
        }
        self.nodes.insert(node)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// # Panics
    /// Panics if `id` does not belong to this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// # Panics
    /// Panics if `id` does not belong to this graph.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// All node ids, collected. Useful when mutation during iteration
    /// is needed.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().collect()
    }

    /// Creates an edge between two existing nodes.
    ///
    /// # Panics
    /// Panics if either endpoint does not belong to this graph.
    pub fn new_edge(&mut self, from: NodeId, to: NodeId, label: impl AsRef<str>) -> EdgeId {
        assert!(self.nodes.contains_key(from) && self.nodes.contains_key(to));
        let edge = Edge {
            from,
            to,
            label: Arc::from(label.as_ref()),
            properties: PropertyMap::default(),
            compiled: CompiledMap::default(),
        };
        let id = self.edges.insert(edge);
        self.nodes[from].out.push(id);
        self.nodes[to].inc.push(id);
        id
    }

    /// # Panics
    /// Panics if `id` does not belong to this graph.
    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id]
    }

    /// # Panics
    /// Panics if `id` does not belong to this graph.
    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id]
    }

    pub fn remove_edge(&mut self, id: EdgeId) {
        if let Some(edge) = self.edges.remove(id) {
            self.nodes[edge.from].out.retain(|&e| e != id);
            self.nodes[edge.to].inc.retain(|&e| e != id);
        }
    }

    /// Removes a node along with all of its edges.
    pub fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        let mut touching: Vec<EdgeId> = node.out.clone();
        touching.extend(node.inc.iter().copied());
        for edge in touching {
            self.remove_edge(edge);
        }
        self.nodes.remove(id);
    }

    /// Outgoing edges in insertion order.
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes[node].out.iter().copied()
    }

    /// Outgoing edges with the given label, in insertion order.
    pub fn out_edges_with_label<'g>(
        &'g self,
        node: NodeId,
        label: &'g str,
    ) -> impl Iterator<Item = EdgeId> + 'g {
        self.nodes[node]
            .out
            .iter()
            .copied()
            .filter(move |&e| self.edges[e].label() == label)
    }

    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes[node].inc.iter().copied()
    }

    /// Outgoing edges sorted by the integer `attributeIndex` edge
    /// property; edges without an index sort last, insertion order
    /// breaking ties.
    pub fn ordered_out_edges(&self, node: NodeId) -> Vec<EdgeId> {
        let mut out = self.nodes[node].out.clone();
        out.sort_by_key(|&e| {
            self.edges[e]
                .property(vocab::ATTRIBUTE_INDEX)
                .and_then(PropertyValue::as_int)
                .unwrap_or(i64::MAX)
        });
        out
    }

    /// Looks up nodes whose label set contains `labels` and whose
    /// property map contains every `(key, value)` pair. Misses return
    /// an empty result.
    pub fn find_nodes(&self, labels: &[&str], properties: &[(&str, &PropertyValue)]) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| {
                labels.iter().all(|l| node.has_label(l))
                    && properties
                        .iter()
                        .all(|(k, v)| node.property(k) == Some(*v))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Shallow-copies a single node into `target`; edges are not
    /// copied. The copy gets a fresh identity and cloned property
    /// values.
    pub fn copy_node_into(&self, node: NodeId, target: &mut Graph) -> NodeId {
        let src = &self.nodes[node];
        let copy = Node {
            labels: src.labels.clone(),
            properties: src.properties.clone(),
            compiled: src.compiled.clone(),
            out: Vec::new(),
            inc: Vec::new(),
        };
        target.nodes.insert(copy)
    }

    /// Deep-copies the subgraph reachable from `root` through outgoing
    /// edges into `target`, extending `node_map` with every copied
    /// node. Nodes already present in `node_map` are reused, so
    /// repeated calls can stitch overlapping subgraphs together.
    pub fn copy_subgraph_into(
        &self,
        root: NodeId,
        target: &mut Graph,
        node_map: &mut AHashMap<NodeId, NodeId>,
    ) -> NodeId {
        let mut fresh = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if node_map.contains_key(&current) {
                continue;
            }
            let copy = self.copy_node_into(current, target);
            node_map.insert(current, copy);
            fresh.push(current);
            for &edge in &self.nodes[current].out {
                stack.push(self.edges[edge].to);
            }
        }
        // Edges are drawn once per freshly copied source node; both
        // endpoints are guaranteed to be in the map by now.
        for source in fresh {
            for &edge_id in &self.nodes[source].out {
                let edge = &self.edges[edge_id];
                let new_edge = target.new_edge(node_map[&source], node_map[&edge.to], edge.label());
                target.edges[new_edge].properties = edge.properties.clone();
                target.edges[new_edge].compiled = edge.compiled.clone();
            }
        }
        node_map[&root]
    }

    /// Clones an edge's label and properties onto a new `(from, to)`
    /// pair in this graph.
    pub fn clone_edge(&mut self, from: NodeId, to: NodeId, source_edge: EdgeId) -> EdgeId {
        let (label, properties, compiled) = {
            let edge = &self.edges[source_edge];
            (edge.label.clone(), edge.properties.clone(), edge.compiled.clone())
        };
        let id = self.new_edge(from, to, label);
        self.edges[id].properties = properties;
        self.edges[id].compiled = compiled;
        id
    }
}
