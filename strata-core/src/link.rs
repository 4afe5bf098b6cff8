//! Cross-entity link resolution.
//!
//! A link spec on a schema attribute describes how a foreign-key-style
//! reference resolves into an edge between entity roots after the
//! document tree has been ingested. The pass collects the foreign-key
//! document nodes component-wise under each entity root, builds the
//! composite keys, and materialises edges toward the matching entity
//! roots supplied by the caller.

use std::sync::Arc;

use ahash::AHashSet;
use log::debug;

use crate::builder::GraphBuilder;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::ingest::IngestAs;
use crate::layer::{is_attribute_node, node_id, parent_attribute};
use crate::property::PropertyValue;
use crate::term::vocab;

/// A parsed link spec.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    /// The schema attribute carrying the spec.
    pub attr: NodeId,
    /// Attribute IRIs whose document values form the composite key.
    pub fk: Vec<Arc<str>>,
    /// Label of the materialised edge.
    pub label: Arc<str>,
    /// Edge direction: from this entity toward the target when true.
    pub forward: bool,
    /// Whether several keys (and so several links) are allowed.
    pub multi: bool,
    /// Edge replaces the placeholder node when `Edge`.
    pub ingest_as: IngestAs,
    /// Restrict targets to roots of this layer, when present.
    pub target_type: Option<Arc<str>>,
}

impl LinkSpec {
    fn id(&self, schema_graph: &Graph) -> String {
        node_id(schema_graph.node(self.attr)).unwrap_or("").to_string()
    }
}

/// Reads the link spec off a schema attribute, if it carries one.
pub fn link_spec(schema_graph: &Graph, attr: NodeId) -> Result<Option<LinkSpec>> {
    let node = schema_graph.node(attr);
    let Some(fk_value) = node.property(vocab::LINK_FK) else {
        return Ok(None);
    };
    let fk = fk_value.must_string_slice();
    if fk.is_empty() {
        return Err(Error::InvalidForeignKeys {
            spec: node_id(node).unwrap_or("").to_string(),
            msg: "empty foreign key".into(),
        });
    }
    let label = node
        .property(vocab::LINK_LABEL)
        .and_then(PropertyValue::as_str)
        .filter(|s| !s.is_empty())
        .map_or_else(|| Arc::from(vocab::HAS), Arc::from);
    let forward = node
        .property(vocab::LINK_FORWARD)
        .and_then(PropertyValue::as_bool)
        .unwrap_or(true);
    let multi = node
        .property(vocab::LINK_MULTI)
        .and_then(PropertyValue::as_bool)
        .unwrap_or(false);
    let ingest_as = node
        .property(vocab::INGEST_AS)
        .and_then(PropertyValue::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let target_type = node
        .property(vocab::LINK_TARGET)
        .and_then(PropertyValue::as_str)
        .map(Arc::from);
    Ok(Some(LinkSpec {
        attr,
        fk,
        label,
        forward,
        multi,
        ingest_as,
        target_type,
    }))
}

/// An entity root in a document graph together with its identity.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub root: NodeId,
    /// The layer ID of the entity's schema.
    pub schema: Arc<str>,
    /// Components of the entity ID, possibly still empty.
    pub id: Vec<Arc<str>>,
}

/// Collects every entity root of a document graph with its ID.
pub fn document_entity_info(graph: &Graph) -> Vec<EntityInfo> {
    let mut out = Vec::new();
    for (node_key, node) in graph.nodes() {
        if !node.has_label(vocab::DOCUMENT_NODE) {
            continue;
        }
        let Some(schema) = node.property(vocab::ENTITY_SCHEMA).and_then(PropertyValue::as_str)
        else {
            continue;
        };
        let id = node
            .property(vocab::ENTITY_ID)
            .map(PropertyValue::must_string_slice)
            .unwrap_or_default();
        out.push(EntityInfo {
            root: node_key,
            schema: Arc::from(schema),
            id,
        });
    }
    out
}

impl GraphBuilder<'_> {
    /// Runs the link pass: resolves every link spec in the schema graph
    /// against the ingested document graph.
    pub fn link_nodes(&mut self, ctx: &Context, entity_info: &[EntityInfo]) -> Result<()> {
        let attrs: Vec<NodeId> = self
            .schema_graph()
            .nodes()
            .filter(|(_, node)| is_attribute_node(node))
            .map(|(id, _)| id)
            .collect();
        for attr in attrs {
            ctx.check_cancelled()?;
            let Some(spec) = link_spec(self.schema_graph(), attr)? else {
                continue;
            };
            let Some(parent_schema) = parent_attribute(self.schema_graph(), attr) else {
                continue;
            };
            let Some(parent_id) = node_id(self.schema_graph().node(parent_schema)).map(str::to_string)
            else {
                continue;
            };
            let attr_id = spec.id(self.schema_graph());
            debug!("linking instances of {attr_id}");
            for parent in self.instance_nodes(&parent_id) {
                let wanted = PropertyValue::string(&attr_id);
                let children: Vec<NodeId> = self
                    .graph()
                    .out_edges(parent)
                    .map(|e| self.graph().edge(e).to())
                    .filter(|&child| {
                        let node = self.graph().node(child);
                        node.has_label(vocab::DOCUMENT_NODE)
                            && node.property(vocab::SCHEMA_NODE_ID) == Some(&wanted)
                    })
                    .collect();
                if children.is_empty() {
                    self.link_node(&spec, None, parent, entity_info)?;
                } else {
                    for child in children {
                        self.link_node(&spec, Some(child), parent, entity_info)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolves one link spec instance. `doc_node` is the ingested
    /// placeholder for the link attribute under `parent`, if any.
    pub fn link_node(
        &mut self,
        spec: &LinkSpec,
        doc_node: Option<NodeId>,
        parent: NodeId,
        entity_info: &[EntityInfo],
    ) -> Result<()> {
        let spec_id = spec.id(self.schema_graph());
        let entity_root = self
            .entity_root_of(parent)
            .ok_or_else(|| Error::CannotResolveLink(spec_id.clone()))?;

        // Foreign key document nodes, component-wise.
        let mut fk_nodes: Vec<Vec<NodeId>> = vec![Vec::new(); spec.fk.len()];
        let mut seen = AHashSet::new();
        let mut stack = vec![entity_root];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(id) = self
                .graph()
                .node(current)
                .property(vocab::SCHEMA_NODE_ID)
                .and_then(PropertyValue::as_str)
            {
                for (i, fk) in spec.fk.iter().enumerate() {
                    if fk.as_ref() == id {
                        fk_nodes[i].push(current);
                    }
                }
            }
            for edge in self.graph().out_edges(current) {
                let edge = self.graph().edge(edge);
                if edge.label() != vocab::INSTANCE_OF
                    && self.graph().node(edge.to()).has_label(vocab::DOCUMENT_NODE)
                {
                    stack.push(edge.to());
                }
            }
        }

        // Components must line up index-wise.
        let count = fk_nodes.first().map(Vec::len).unwrap_or(0);
        if fk_nodes.iter().any(|column| column.len() != count) {
            return Err(Error::InvalidForeignKeys {
                spec: spec_id,
                msg: "inconsistent foreign keys".into(),
            });
        }
        if count == 0 {
            return Ok(());
        }
        if count > 1 && !spec.multi {
            return Err(Error::InvalidForeignKeys {
                spec: spec_id,
                msg: "multiple foreign key values not allowed".into(),
            });
        }

        // Keys are read before the placeholder is removed; it may well
        // be one of the foreign-key nodes.
        let keys: Vec<Vec<String>> = (0..count)
            .map(|i| {
                fk_nodes
                    .iter()
                    .map(|column| {
                        self.graph()
                            .node(column[i])
                            .property(vocab::RAW_VALUE)
                            .and_then(PropertyValue::as_str)
                            .unwrap_or("")
                            .to_string()
                    })
                    .collect()
            })
            .collect();

        let mut doc_node = doc_node;
        let mut placeholder_properties = None;
        if spec.ingest_as == IngestAs::Edge {
            if let Some(node) = doc_node.take() {
                placeholder_properties = Some(
                    self.graph()
                        .node(node)
                        .properties()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect::<Vec<_>>(),
                );
                self.graph_mut().remove_node(node);
            }
        }

        for key in &keys {
            let targets: Vec<NodeId> = entity_info
                .iter()
                .filter(|info| {
                    if let Some(target_type) = &spec.target_type {
                        if info.schema != *target_type {
                            return false;
                        }
                    }
                    info.root != entity_root
                        && info.id.len() == key.len()
                        && info.id.iter().zip(key).all(|(a, b)| a.as_ref() == b)
                })
                .map(|info| info.root)
                .collect();

            for target in targets {
                if spec.ingest_as == IngestAs::Edge {
                    let (from, to) = if spec.forward {
                        (parent, target)
                    } else {
                        (target, parent)
                    };
                    let edge = self.graph_mut().new_edge(from, to, spec.label.clone());
                    if let Some(properties) = &placeholder_properties {
                        for (k, v) in properties {
                            self.graph_mut().edge_mut(edge).set_property(k.clone(), v.clone());
                        }
                    }
                } else {
                    let node = match doc_node {
                        Some(node) => node,
                        None => {
                            let node = self.new_node(Some(spec.attr));
                            self.graph_mut().new_edge(parent, node, vocab::HAS);
                            doc_node = Some(node);
                            node
                        }
                    };
                    let (from, to) = if spec.forward { (node, target) } else { (target, node) };
                    self.graph_mut().new_edge(from, to, spec.label.clone());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilderOptions;
    use crate::layer::set_node_id;

    /// Person(id) and Order(personId) with a forward edge link spec on
    /// Order.personId.
    fn schema() -> (Graph, NodeId, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let person = g.new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
        set_node_id(g.node_mut(person), "person");
        g.node_mut(person)
            .set_property(vocab::ENTITY_SCHEMA, PropertyValue::string("http://person"));
        g.node_mut(person)
            .set_property(vocab::ENTITY_ID_FIELDS, PropertyValue::string("person.id"));
        let person_id = g.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(g.node_mut(person_id), "person.id");
        g.new_edge(person, person_id, vocab::OBJECT_ATTRIBUTES);

        let order = g.new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
        set_node_id(g.node_mut(order), "order");
        g.node_mut(order)
            .set_property(vocab::ENTITY_SCHEMA, PropertyValue::string("http://order"));
        let order_person = g.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(g.node_mut(order_person), "order.personId");
        g.node_mut(order_person)
            .set_property(vocab::LINK_FK, PropertyValue::string("order.personId"));
        g.node_mut(order_person)
            .set_property(vocab::LINK_LABEL, PropertyValue::string("orderedBy"));
        g.node_mut(order_person)
            .set_property(vocab::LINK_TARGET, PropertyValue::string("http://person"));
        g.node_mut(order_person)
            .set_property(vocab::INGEST_AS, PropertyValue::string("edge"));
        g.new_edge(order, order_person, vocab::OBJECT_ATTRIBUTES);

        (g, person, person_id, order, order_person)
    }

    #[test]
    fn links_entities_by_foreign_key() {
        let (schema, person, person_id, order, order_person) = schema();
        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &schema,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let person_root = builder.object_as_node(Some(person), None).unwrap().unwrap().1;
        builder
            .value_as_node(Some(person_id), Some(person_root), "1")
            .unwrap();
        let order_root = builder.object_as_node(Some(order), None).unwrap().unwrap().1;
        builder
            .value_as_node(Some(order_person), Some(order_root), "1")
            .unwrap();

        let info = document_entity_info(builder.graph());
        assert_eq!(info.len(), 2);
        builder.link_nodes(&ctx, &info).unwrap();

        let links: Vec<_> = builder
            .graph()
            .out_edges_with_label(order_root, "orderedBy")
            .map(|e| builder.graph().edge(e).to())
            .collect();
        assert_eq!(links, vec![person_root]);
    }

    #[test]
    fn inconsistent_keys_fail() {
        let (schema_graph, _, _, order, order_person) = schema();
        let mut schema_graph = schema_graph;
        // Two-component composite key, but the document will only carry
        // values for one of them.
        let other = schema_graph.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(schema_graph.node_mut(other), "order.other");
        schema_graph.new_edge(order, other, vocab::OBJECT_ATTRIBUTES);
        schema_graph.node_mut(order_person).set_property(
            vocab::LINK_FK,
            PropertyValue::list(["order.personId", "order.other"]),
        );

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &schema_graph,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let order_root = builder.object_as_node(Some(order), None).unwrap().unwrap().1;
        builder
            .value_as_node(Some(order_person), Some(order_root), "1")
            .unwrap();
        let info = document_entity_info(builder.graph());
        let err = builder.link_nodes(&ctx, &info).unwrap_err();
        assert!(matches!(err, Error::InvalidForeignKeys { .. }));
    }
}
