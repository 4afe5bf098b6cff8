//! Bottom-up construction of document graphs.
//!
//! The builder allocates document nodes as instances of schema
//! attributes, applying one of the ingestion strategies: as a node, as
//! a labelled edge, or as a property of an ancestor. It also slots
//! ingested values into the enclosing entity root's `entityId`.
//!
//! The schema graph and the document graph are distinct; with
//! `embed_schema_nodes` the schema attribute's property map is copied
//! onto each document node, otherwise document nodes stay lean and
//! point at a shared schema copy through an `instanceOf` edge.

use ahash::{AHashMap, AHashSet};

use crate::error::{Error, Result};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::layer::node_id;
use crate::property::PropertyValue;
use crate::term::vocab;

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilderOptions {
    /// Copy schema node properties into document nodes instead of
    /// linking them with `instanceOf` edges.
    pub embed_schema_nodes: bool,
    /// Drop document subtrees that have no matching schema attribute.
    pub only_schema_attributes: bool,
}

/// Returns the document edge label for a schema node: the explicit
/// `edgeLabel` override, else the attribute name.
pub fn determine_edge_label(schema_graph: &Graph, schema_node: NodeId) -> Option<String> {
    for term in [vocab::EDGE_LABEL, vocab::ATTRIBUTE_NAME] {
        if let Some(label) = schema_graph
            .node(schema_node)
            .property(term)
            .and_then(PropertyValue::as_str)
        {
            if !label.is_empty() {
                return Some(label.to_string());
            }
        }
    }
    None
}

/// Builds a document graph guided by a compiled schema graph.
pub struct GraphBuilder<'s> {
    options: GraphBuilderOptions,
    schema_graph: &'s Graph,
    graph: Graph,
    schema_node_map: AHashMap<NodeId, NodeId>,
}

impl<'s> GraphBuilder<'s> {
    pub fn new(schema_graph: &'s Graph, options: GraphBuilderOptions) -> Self {
        Self::with_graph(schema_graph, Graph::new(), options)
    }

    /// Continues building into an existing document graph.
    pub fn with_graph(schema_graph: &'s Graph, graph: Graph, options: GraphBuilderOptions) -> Self {
        GraphBuilder {
            options,
            schema_graph,
            graph,
            schema_node_map: AHashMap::new(),
        }
    }

    pub fn options(&self) -> GraphBuilderOptions {
        self.options
    }

    pub fn schema_graph(&self) -> &Graph {
        self.schema_graph
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Document nodes instantiating the schema attribute with the given
    /// IRI.
    pub fn instance_nodes(&self, schema_id: &str) -> Vec<NodeId> {
        let wanted = PropertyValue::string(schema_id);
        self.graph
            .find_nodes(&[vocab::DOCUMENT_NODE], &[(vocab::SCHEMA_NODE_ID, &wanted)])
    }

    /// Reads a schema-derived property off a document node: its own
    /// property map first, then the shared schema copy behind its
    /// `instanceOf` edge.
    pub fn schema_property(&self, node: NodeId, key: &str) -> Option<PropertyValue> {
        if let Some(value) = self.graph.node(node).property(key) {
            return Some(value.clone());
        }
        for edge in self.graph.out_edges_with_label(node, vocab::INSTANCE_OF) {
            let schema_copy = self.graph.edge(edge).to();
            if let Some(value) = self.graph.node(schema_copy).property(key) {
                return Some(value.clone());
            }
        }
        None
    }

    /// Allocates a document node as an instance of `schema_node`.
    pub fn new_node(&mut self, schema_node: Option<NodeId>) -> NodeId {
        let new_node = self.graph.new_node([vocab::DOCUMENT_NODE]);
        let Some(schema_node) = schema_node else {
            return new_node;
        };
        let labels: Vec<String> = self
            .schema_graph
            .node(schema_node)
            .labels()
            .filter(|&l| l != vocab::ATTRIBUTE)
            .map(str::to_string)
            .collect();
        for label in labels {
            self.graph.node_mut(new_node).add_label(label);
        }
        if let Some(id) = node_id(self.schema_graph.node(schema_node)) {
            let id = PropertyValue::string(id);
            self.graph
                .node_mut(new_node)
                .set_property(vocab::SCHEMA_NODE_ID, id);
        }
        if let Some(entity_schema) = self
            .schema_graph
            .node(schema_node)
            .property(vocab::ENTITY_SCHEMA)
            .cloned()
        {
            self.graph
                .node_mut(new_node)
                .set_property(vocab::ENTITY_SCHEMA, entity_schema);
        }

        if self.options.embed_schema_nodes {
            let properties: Vec<_> = self
                .schema_graph
                .node(schema_node)
                .properties()
                .filter(|(k, _)| k.as_ref() != vocab::NODE_ID)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in properties {
                if self.graph.node(new_node).property(&key).is_none() {
                    self.graph.node_mut(new_node).set_property(key, value);
                }
            }
            self.copy_schema_attachments(schema_node, new_node);
            return new_node;
        }

        let schema_copy = match self.schema_node_map.get(&schema_node) {
            Some(&copy) => copy,
            None => {
                let copy = self.schema_graph.copy_node_into(schema_node, &mut self.graph);
                self.schema_node_map.insert(schema_node, copy);
                self.copy_schema_attachments(schema_node, copy);
                copy
            }
        };
        self.graph.new_edge(new_node, schema_copy, vocab::INSTANCE_OF);
        new_node
    }

    /// Copies annotation nodes hanging off the schema attribute into
    /// the document graph, attached to `target`.
    fn copy_schema_attachments(&mut self, schema_node: NodeId, target: NodeId) {
        let edges: Vec<EdgeId> = self.schema_graph.out_edges(schema_node).collect();
        for edge_id in edges {
            let edge = self.schema_graph.edge(edge_id);
            if vocab::is_attribute_tree_edge(edge.label()) {
                continue;
            }
            let to = edge.to();
            let label = edge.label().to_string();
            let copy =
                self.schema_graph
                    .copy_subgraph_into(to, &mut self.graph, &mut self.schema_node_map);
            self.graph.new_edge(target, copy, label);
        }
    }

    /// Walks up the document tree to the nearest node marked as an
    /// entity root.
    pub fn entity_root_of(&self, node: NodeId) -> Option<NodeId> {
        let mut seen = AHashSet::new();
        let mut current = node;
        loop {
            if !seen.insert(current) {
                return None;
            }
            if self.schema_property(current, vocab::ENTITY_SCHEMA).is_some() {
                return Some(current);
            }
            let parent = self.graph.in_edges(current).find_map(|e| {
                let edge = self.graph.edge(e);
                let from = edge.from();
                (edge.label() != vocab::INSTANCE_OF
                    && self.graph.node(from).has_label(vocab::DOCUMENT_NODE))
                .then_some(from)
            })?;
            current = parent;
        }
    }

    /// Slots `value` into the enclosing entity's ID if the schema node
    /// is one of its `entityIdFields`.
    pub fn set_entity_id(&mut self, value: &str, parent: NodeId, schema_node: NodeId) {
        let Some(entity_root) = self.entity_root_of(parent) else {
            return;
        };
        let Some(id_fields) = self.schema_property(entity_root, vocab::ENTITY_ID_FIELDS) else {
            return;
        };
        let fields = id_fields.must_string_slice();
        let Some(schema_id) = node_id(self.schema_graph.node(schema_node)) else {
            return;
        };
        let Some(index) = fields.iter().position(|f| f.as_ref() == schema_id) else {
            return;
        };

        if id_fields.is_string() {
            self.graph
                .node_mut(entity_root)
                .set_property(vocab::ENTITY_ID, PropertyValue::string(value));
            return;
        }
        let mut id = self
            .graph
            .node(entity_root)
            .property(vocab::ENTITY_ID)
            .map(PropertyValue::must_string_slice)
            .unwrap_or_default();
        while id.len() <= index {
            id.push("".into());
        }
        id[index] = value.into();
        self.graph
            .node_mut(entity_root)
            .set_property(vocab::ENTITY_ID, PropertyValue::List(id));
    }

    /// Ingests a scalar as a new document node with a `has` edge from
    /// the parent. Returns `None` when the value is dropped because it
    /// has no schema and `only_schema_attributes` is set.
    pub fn value_as_node(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
        value: &str,
    ) -> Result<Option<(Option<EdgeId>, NodeId)>> {
        if let Some(schema) = schema_node {
            if let Some(parent) = parent {
                self.set_entity_id(value, parent, schema);
            }
            if !self.schema_graph.node(schema).has_label(vocab::VALUE) {
                return Err(Error::InvalidSchema("a value is expected here".into()));
            }
        } else if self.options.only_schema_attributes {
            return Ok(None);
        }
        let new_node = self.new_node(schema_node);
        let node = self.graph.node_mut(new_node);
        node.set_property(vocab::RAW_VALUE, PropertyValue::string(value));
        node.add_label(vocab::VALUE);
        let edge = parent.map(|p| self.graph.new_edge(p, new_node, vocab::HAS));
        Ok(Some((edge, new_node)))
    }

    /// Ingests a scalar as an edge carrying the value in a terminal
    /// node. The edge label comes from the schema's `edgeLabel`
    /// override or attribute name.
    pub fn value_as_edge(
        &mut self,
        schema_node: Option<NodeId>,
        parent: NodeId,
        value: &str,
    ) -> Result<Option<(EdgeId, NodeId)>> {
        let label = match schema_node {
            Some(schema) => {
                self.set_entity_id(value, parent, schema);
                if !self.schema_graph.node(schema).has_label(vocab::VALUE) {
                    return Err(Error::InvalidSchema("a value is expected here".into()));
                }
                determine_edge_label(self.schema_graph, schema).ok_or_else(|| {
                    Error::CannotDetermineEdgeLabel(
                        node_id(self.schema_graph.node(schema)).unwrap_or("").to_string(),
                    )
                })?
            }
            None if self.options.only_schema_attributes => return Ok(None),
            None => vocab::HAS.to_string(),
        };
        let new_node = self.new_node(schema_node);
        let node = self.graph.node_mut(new_node);
        node.set_property(vocab::RAW_VALUE, PropertyValue::string(value));
        node.add_label(vocab::VALUE);
        let edge = self.graph.new_edge(parent, new_node, label);
        Ok(Some((edge, new_node)))
    }

    /// Stores a scalar as a property on an ancestor in `graph_path`.
    /// With `asPropertyOf`, the nearest ancestor instantiating that
    /// attribute is used; otherwise the immediate parent.
    pub fn value_as_property(
        &mut self,
        schema_node: NodeId,
        graph_path: &[NodeId],
        value: &str,
    ) -> Result<()> {
        let schema = self.schema_graph.node(schema_node);
        let schema_id = node_id(schema).unwrap_or("").to_string();
        let as_property_of = schema
            .property(vocab::AS_PROPERTY_OF)
            .and_then(PropertyValue::as_str)
            .map(str::to_string);
        let property_name = schema
            .property(vocab::PROPERTY_NAME)
            .or_else(|| schema.property(vocab::ATTRIBUTE_NAME))
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .ok_or(Error::CannotDeterminePropertyName(schema_id.clone()))?;

        let target = match as_property_of {
            None => graph_path.last().copied(),
            Some(ancestor_id) => {
                let wanted = PropertyValue::string(&ancestor_id);
                graph_path
                    .iter()
                    .rev()
                    .copied()
                    .find(|&n| self.graph.node(n).property(vocab::SCHEMA_NODE_ID) == Some(&wanted))
            }
        };
        let target = target.ok_or(Error::CannotFindAncestor(schema_id))?;
        self.graph
            .node_mut(target)
            .set_property(property_name, PropertyValue::string(value));
        Ok(())
    }

    fn collection_as_node(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
        kind_label: &str,
    ) -> Result<Option<(Option<EdgeId>, NodeId)>> {
        if let Some(schema) = schema_node {
            if !self.schema_graph.node(schema).has_label(kind_label) {
                return Err(Error::InvalidSchema(format!(
                    "a {kind_label} is expected here"
                )));
            }
        } else if self.options.only_schema_attributes {
            return Ok(None);
        }
        let new_node = self.new_node(schema_node);
        self.graph.node_mut(new_node).add_label(kind_label);
        let edge = parent.map(|p| self.graph.new_edge(p, new_node, vocab::HAS));
        Ok(Some((edge, new_node)))
    }

    fn collection_as_edge(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
        kind_label: &str,
    ) -> Result<Option<(EdgeId, NodeId)>> {
        if let Some(schema) = schema_node {
            if !self.schema_graph.node(schema).has_label(kind_label) {
                return Err(Error::InvalidSchema(format!(
                    "a {kind_label} is expected here"
                )));
            }
        } else if self.options.only_schema_attributes {
            return Ok(None);
        }
        let parent = parent.ok_or_else(|| {
            Error::InvalidSchema("document root cannot be ingested as an edge".into())
        })?;
        let label = match schema_node {
            Some(schema) => determine_edge_label(self.schema_graph, schema).ok_or_else(|| {
                Error::CannotDetermineEdgeLabel(
                    node_id(self.schema_graph.node(schema)).unwrap_or("").to_string(),
                )
            })?,
            None => vocab::HAS.to_string(),
        };
        let new_node = self.new_node(schema_node);
        self.graph.node_mut(new_node).add_label(kind_label);
        let edge = self.graph.new_edge(parent, new_node, label);
        Ok(Some((edge, new_node)))
    }

    pub fn object_as_node(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<Option<(Option<EdgeId>, NodeId)>> {
        self.collection_as_node(schema_node, parent, vocab::OBJECT)
    }

    pub fn array_as_node(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<Option<(Option<EdgeId>, NodeId)>> {
        self.collection_as_node(schema_node, parent, vocab::ARRAY)
    }

    pub fn object_as_edge(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<Option<(EdgeId, NodeId)>> {
        self.collection_as_edge(schema_node, parent, vocab::OBJECT)
    }

    pub fn array_as_edge(
        &mut self,
        schema_node: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<Option<(EdgeId, NodeId)>> {
        self.collection_as_edge(schema_node, parent, vocab::ARRAY)
    }
}
