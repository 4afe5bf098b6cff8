//! Schema compilation.
//!
//! Compilation resolves references and compositions against a pool of
//! loadable layers and runs the per-term compile hooks, producing a
//! canonical layer inside a shared compiled graph. Referenced subtrees
//! are shared between call sites rather than duplicated, so a compiled
//! graph is generally not a tree; traversals carry a visited set.
//!
//! The pass structure follows the data flow of the pipeline: load →
//! rename blank nodes → copy into the shared graph → resolve references
//! (depth-first, memoised) → fold compositions → compile terms.

use ahash::{AHashMap, AHashSet};
use log::debug;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::layer::{
    attribute_kind, attribute_nodes, is_attribute_node, node_id, AttributeKind, Layer,
};
use crate::property::PropertyValue;
use crate::term::vocab;

/// Supplies layers to the compiler by IRI.
pub trait LayerLoader {
    fn load_layer(&self, iri: &str) -> Result<Layer>;
}

impl<F> LayerLoader for F
where
    F: Fn(&str) -> Result<Layer>,
{
    fn load_layer(&self, iri: &str) -> Result<Layer> {
        self(iri)
    }
}

/// Handle to a compiled layer inside a [`CompiledGraph`].
#[derive(Debug, Clone, Copy)]
pub struct CompiledSchema {
    /// The layer info node.
    pub info: NodeId,
    /// The schema root attribute.
    pub root: NodeId,
}

/// The shared graph of compiled, interlinked schemas keyed by IRI.
#[derive(Debug, Default)]
pub struct CompiledGraph {
    graph: Graph,
    schemas: AHashMap<String, CompiledSchema>,
    layer_nodes: AHashMap<String, Vec<NodeId>>,
}

impl CompiledGraph {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// The compiled schema for the IRI, if already compiled.
    pub fn schema(&self, iri: &str) -> Option<CompiledSchema> {
        self.schemas.get(iri).copied()
    }

    /// The nodes that entered the graph with the given layer.
    pub fn layer_nodes(&self, iri: &str) -> &[NodeId] {
        self.layer_nodes.get(iri).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Finds an attribute anywhere in the compiled graph by its IRI.
    pub fn attribute_by_id(&self, id: &str) -> Option<NodeId> {
        self.graph
            .nodes()
            .find(|(_, node)| is_attribute_node(node) && node_id(node) == Some(id))
            .map(|(id, _)| id)
    }

    /// Copies a layer into the shared graph and records it.
    fn put(&mut self, iri: &str, layer: &Layer) -> Result<CompiledSchema> {
        let (info, map) = layer.clone_into(&mut self.graph);
        let root = layer
            .schema_root()
            .map(|r| map[&r])
            .ok_or_else(|| Error::NotFound(iri.to_string()))?;
        let compiled = CompiledSchema { info, root };
        self.schemas.insert(iri.to_string(), compiled);
        // Sorted so downstream passes run in a stable order.
        let mut nodes: Vec<NodeId> = map.values().copied().collect();
        nodes.sort();
        self.layer_nodes.insert(iri.to_string(), nodes);
        Ok(compiled)
    }
}

/// Compiles schemas into a shared [`CompiledGraph`].
pub struct Compiler<L> {
    loader: L,
    compiled: CompiledGraph,
    blank_seq: u64,
}

impl<L: LayerLoader> Compiler<L> {
    pub fn new(loader: L) -> Self {
        Compiler {
            loader,
            compiled: CompiledGraph::default(),
            blank_seq: 0,
        }
    }

    pub fn compiled(&self) -> &CompiledGraph {
        &self.compiled
    }

    pub fn into_compiled(self) -> CompiledGraph {
        self.compiled
    }

    /// Compiles the schema the IRI names, loading referenced layers
    /// transitively.
    pub fn compile(&mut self, ctx: &Context, iri: &str) -> Result<CompiledSchema> {
        let mut loaded = AHashMap::new();
        self.compile_with(ctx, iri, &mut loaded)
    }

    /// Compiles an already-loaded layer.
    pub fn compile_layer(&mut self, ctx: &Context, layer: Layer) -> Result<CompiledSchema> {
        let iri = layer.id().to_string();
        let mut loaded = AHashMap::new();
        loaded.insert(iri.clone(), layer);
        self.compile_with(ctx, &iri, &mut loaded)
    }

    fn compile_with(
        &mut self,
        ctx: &Context,
        iri: &str,
        loaded: &mut AHashMap<String, Layer>,
    ) -> Result<CompiledSchema> {
        debug!("compiling {iri}");
        let compiled = self.compile_refs(ctx, loaded, iri)?;
        self.resolve_compositions(ctx, compiled.root)?;
        self.compile_terms(ctx, compiled.root)?;
        Ok(compiled)
    }

    fn load(&mut self, loaded: &mut AHashMap<String, Layer>, iri: &str) -> Result<Layer> {
        match loaded.remove(iri) {
            Some(layer) => Ok(layer),
            None => self.loader.load_layer(iri),
        }
    }

    /// Loads a layer into the shared graph and resolves all of its
    /// references, depth-first and memoised.
    fn compile_refs(
        &mut self,
        ctx: &Context,
        loaded: &mut AHashMap<String, Layer>,
        iri: &str,
    ) -> Result<CompiledSchema> {
        ctx.check_cancelled()?;
        if let Some(compiled) = self.compiled.schema(iri) {
            return Ok(compiled);
        }
        let mut layer = self.load(loaded, iri)?;

        let mut seq = self.blank_seq;
        layer.rename_blank_nodes(&mut || {
            seq += 1;
            format!("_b:{seq}")
        });
        self.blank_seq = seq;

        check_duplicate_ids(&layer)?;

        let root = layer
            .schema_root()
            .ok_or_else(|| Error::NotFound(iri.to_string()))?;
        let layer_id = layer.id();
        layer
            .graph_mut()
            .node_mut(root)
            .set_property(vocab::ENTITY_SCHEMA, PropertyValue::Str(layer_id));

        // Memoise before resolving references so cycles terminate.
        let compiled = self.compiled.put(iri, &layer)?;

        let references: Vec<NodeId> = self
            .compiled
            .layer_nodes(iri)
            .iter()
            .copied()
            .filter(|&n| self.compiled.graph.node(n).has_label(vocab::REFERENCE))
            .collect();
        for node in references {
            self.resolve_reference(ctx, loaded, node)?;
        }
        Ok(compiled)
    }

    /// Rewrites one reference node in the shared graph.
    fn resolve_reference(
        &mut self,
        ctx: &Context,
        loaded: &mut AHashMap<String, Layer>,
        node: NodeId,
    ) -> Result<()> {
        ctx.check_cancelled()?;
        if !self.compiled.graph.node(node).has_label(vocab::REFERENCE) {
            return Ok(());
        }
        let attr_id = node_id(self.compiled.graph.node(node)).unwrap_or("").to_string();
        let ref_iri = self
            .compiled
            .graph
            .node(node)
            .property(vocab::REF)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidSchema(format!("reference {attr_id} without a ref")))?;

        // A reference carrying a link spec stays a value slot; the
        // target only needs to be compiled so the link pass can find
        // its entity roots.
        if self.compiled.graph.node(node).property(vocab::LINK_FK).is_some() {
            self.compile_refs(ctx, loaded, &ref_iri)?;
            let n = self.compiled.graph.node_mut(node);
            n.remove_label(vocab::REFERENCE);
            n.add_label(vocab::VALUE);
            n.remove_property(vocab::REF);
            n.set_property(vocab::LINK_TARGET, PropertyValue::string(&ref_iri));
            return Ok(());
        }

        let target = self.compile_refs(ctx, loaded, &ref_iri)?;
        debug!("resolving reference {attr_id} -> {ref_iri}");

        let target_labels: Vec<String> = self
            .compiled
            .graph
            .node(target.root)
            .labels()
            .map(str::to_string)
            .collect();
        {
            let n = self.compiled.graph.node_mut(node);
            n.remove_label(vocab::REFERENCE);
            n.remove_property(vocab::REF);
            for label in target_labels {
                n.add_label(label);
            }
        }
        for key in self.compiled.graph.node(target.root).property_keys() {
            if key.as_ref() == vocab::NODE_ID {
                continue;
            }
            let overlay = self.compiled.graph.node(target.root).property(&key).cloned();
            let base = self.compiled.graph.node(node).property(&key).cloned();
            let rule = ctx.registry().composition(&key);
            if let Some(value) = rule.compose(&attr_id, base.as_ref(), overlay.as_ref())? {
                self.compiled.graph.node_mut(node).set_property(key, value);
            }
        }
        // Relink the reference node to the target root's children. The
        // subtree is shared, not copied.
        let out: Vec<EdgeId> = self.compiled.graph.out_edges(target.root).collect();
        for edge in out {
            let to = self.compiled.graph.edge(edge).to();
            self.compiled.graph.clone_edge(node, to, edge);
        }
        Ok(())
    }

    /// Folds every composite reachable from `root` into an object.
    fn resolve_compositions(&mut self, ctx: &Context, root: NodeId) -> Result<()> {
        let mut completed = AHashSet::new();
        for node in attribute_nodes(&self.compiled.graph, root) {
            ctx.check_cancelled()?;
            if self.compiled.graph.node(node).has_label(vocab::COMPOSITE)
                && !completed.contains(&node)
            {
                self.resolve_composition(ctx, node, &mut completed)?;
            }
        }
        Ok(())
    }

    fn resolve_composition(
        &mut self,
        ctx: &Context,
        composite: NodeId,
        completed: &mut AHashSet<NodeId>,
    ) -> Result<()> {
        completed.insert(composite);
        let all_of: Vec<EdgeId> = self
            .compiled
            .graph
            .ordered_out_edges(composite)
            .into_iter()
            .filter(|&e| self.compiled.graph.edge(e).label() == vocab::ALL_OF)
            .collect();
        for edge_id in all_of {
            loop {
                let component = self.compiled.graph.edge(edge_id).to();
                match attribute_kind(self.compiled.graph.node(component))? {
                    AttributeKind::Object => {
                        self.absorb_component(ctx, composite, component)?;
                        self.compiled.graph.remove_edge(edge_id);
                        if self.compiled.graph.in_edges(component).next().is_none() {
                            self.compiled.graph.remove_node(component);
                        }
                        break;
                    }
                    AttributeKind::Value | AttributeKind::Array | AttributeKind::Polymorphic => {
                        // The component becomes an attribute of the
                        // composite.
                        let properties = self.compiled.graph.edge(edge_id).property_map().clone();
                        self.compiled.graph.remove_edge(edge_id);
                        let new_edge = self
                            .compiled
                            .graph
                            .new_edge(composite, component, vocab::OBJECT_ATTRIBUTES);
                        for (k, v) in properties {
                            self.compiled.graph.edge_mut(new_edge).set_property(k, v);
                        }
                        break;
                    }
                    AttributeKind::Composite => {
                        if completed.contains(&component) {
                            return Err(Error::InvalidComposition);
                        }
                        self.resolve_composition(ctx, component, completed)?;
                    }
                    AttributeKind::Reference => return Err(Error::InvalidComposition),
                }
            }
        }
        let node = self.compiled.graph.node_mut(composite);
        node.remove_label(vocab::COMPOSITE);
        node.add_label(vocab::OBJECT);
        Ok(())
    }

    /// Absorbs an object component: its children, properties, labels
    /// and compiled artifacts move onto the composite.
    fn absorb_component(&mut self, ctx: &Context, composite: NodeId, component: NodeId) -> Result<()> {
        let id = node_id(self.compiled.graph.node(composite)).unwrap_or("").to_string();
        let out: Vec<EdgeId> = self.compiled.graph.out_edges(component).collect();
        for edge in out {
            let to = self.compiled.graph.edge(edge).to();
            self.compiled.graph.clone_edge(composite, to, edge);
        }
        for key in self.compiled.graph.node(component).property_keys() {
            if key.as_ref() == vocab::NODE_ID {
                continue;
            }
            let overlay = self.compiled.graph.node(component).property(&key).cloned();
            let base = self.compiled.graph.node(composite).property(&key).cloned();
            let rule = ctx.registry().composition(&key);
            if let Some(value) = rule.compose(&id, base.as_ref(), overlay.as_ref())? {
                self.compiled.graph.node_mut(composite).set_property(key, value);
            }
        }
        let labels: Vec<String> = self
            .compiled
            .graph
            .node(component)
            .labels()
            .map(str::to_string)
            .collect();
        let artifacts: Vec<_> = self
            .compiled
            .graph
            .node(component)
            .compiled_entries()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let node = self.compiled.graph.node_mut(composite);
        for label in labels {
            node.add_label(label);
        }
        for (k, v) in artifacts {
            node.set_compiled(k, v);
        }
        Ok(())
    }

    /// Runs per-term compilers over every node and edge reachable from
    /// `root`, and node compilers over non-attribute nodes.
    fn compile_terms(&mut self, ctx: &Context, root: NodeId) -> Result<()> {
        let mut seen = AHashSet::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            ctx.check_cancelled()?;
            if !is_attribute_node(self.compiled.graph.node(current)) {
                let id = node_id(self.compiled.graph.node(current)).unwrap_or("").to_string();
                if let Some(compiler) = ctx.registry().node_compiler(&id).cloned() {
                    compiler.compile_node(&mut self.compiled.graph, current)?;
                }
            }
            for key in self.compiled.graph.node(current).property_keys() {
                if let Some(compiler) = ctx.registry().term_compiler(&key) {
                    let value = self.compiled.graph.node(current).property(&key).cloned();
                    if let Some(value) = value {
                        if let Some(artifact) = compiler.compile_term(&key, &value)? {
                            self.compiled.graph.node_mut(current).set_compiled(key, artifact);
                        }
                    }
                }
            }
            let edges: Vec<EdgeId> = self.compiled.graph.out_edges(current).collect();
            for edge_id in edges {
                let keys: Vec<_> = self
                    .compiled
                    .graph
                    .edge(edge_id)
                    .properties()
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in keys {
                    if let Some(compiler) = ctx.registry().term_compiler(&key) {
                        let value = self.compiled.graph.edge(edge_id).property(&key).cloned();
                        if let Some(value) = value {
                            if let Some(artifact) = compiler.compile_term(&key, &value)? {
                                self.compiled.graph.edge_mut(edge_id).set_compiled(key, artifact);
                            }
                        }
                    }
                }
                stack.push(self.compiled.graph.edge(edge_id).to());
            }
        }
        Ok(())
    }
}

fn check_duplicate_ids(layer: &Layer) -> Result<()> {
    let mut seen = AHashSet::new();
    for attr in layer.attributes() {
        if let Some(id) = node_id(layer.graph().node(attr)) {
            if !seen.insert(id.to_string()) {
                return Err(Error::DuplicateAttribute(id.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{set_node_id, LayerType};

    fn object_layer(id: &str) -> (Layer, NodeId) {
        let mut layer = Layer::new(LayerType::Schema, id);
        let root = layer.graph_mut().new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
        set_node_id(layer.graph_mut().node_mut(root), &format!("{id}#root"));
        layer.set_schema_root(root);
        (layer, root)
    }

    fn add_child(layer: &mut Layer, parent: NodeId, kind: &str, id: &str, index: i64) -> NodeId {
        let child = layer.graph_mut().new_node([vocab::ATTRIBUTE, kind]);
        set_node_id(layer.graph_mut().node_mut(child), id);
        let edge = layer.graph_mut().new_edge(parent, child, vocab::OBJECT_ATTRIBUTES);
        layer
            .graph_mut()
            .edge_mut(edge)
            .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(index));
        child
    }

    fn referencing_layer(id: &str, target: &str) -> Layer {
        let (mut layer, root) = object_layer(id);
        let reference = add_child(&mut layer, root, vocab::REFERENCE, &format!("{id}#ref"), 0);
        layer
            .graph_mut()
            .node_mut(reference)
            .set_property(vocab::REF, PropertyValue::string(target));
        layer
    }

    #[test]
    fn resolves_references_and_shares_subtrees() {
        let ctx = Context::new();
        let mut compiler = Compiler::new(|iri: &str| match iri {
            "http://a" => Ok(referencing_layer("http://a", "http://b")),
            "http://b" => {
                let (mut layer, root) = object_layer("http://b");
                add_child(&mut layer, root, vocab::VALUE, "http://b#x", 0);
                Ok(layer)
            }
            other => Err(Error::NotFound(other.to_string())),
        });
        let compiled = compiler.compile(&ctx, "http://a").unwrap();
        let graph = compiler.compiled().graph();
        for node in attribute_nodes(graph, compiled.root) {
            assert!(!graph.node(node).has_label(vocab::REFERENCE));
        }
        // The former reference node now has b's child attached.
        let reference = compiler.compiled().attribute_by_id("http://a#ref").unwrap();
        assert!(graph.node(reference).has_label(vocab::OBJECT));
        let children: Vec<_> = graph
            .out_edges_with_label(reference, vocab::OBJECT_ATTRIBUTES)
            .map(|e| graph.edge(e).to())
            .collect();
        assert_eq!(children.len(), 1);
        assert_eq!(node_id(graph.node(children[0])), Some("http://b#x"));
        // Shared, not copied: the child is the same node b's root sees.
        let b = compiler.compiled().schema("http://b").unwrap();
        let b_children: Vec<_> = graph
            .out_edges_with_label(b.root, vocab::OBJECT_ATTRIBUTES)
            .map(|e| graph.edge(e).to())
            .collect();
        assert_eq!(children, b_children);
    }

    #[test]
    fn reference_cycle_terminates() {
        let ctx = Context::new();
        let mut compiler = Compiler::new(|iri: &str| match iri {
            "http://a" => Ok(referencing_layer("http://a", "http://b")),
            "http://b" => Ok(referencing_layer("http://b", "http://a")),
            other => Err(Error::NotFound(other.to_string())),
        });
        let compiled = compiler.compile(&ctx, "http://a").unwrap();
        let graph = compiler.compiled().graph();
        for node in attribute_nodes(graph, compiled.root) {
            assert!(!graph.node(node).has_label(vocab::REFERENCE));
        }
        assert!(compiler.compiled().schema("http://b").is_some());
    }

    #[test]
    fn flattens_compositions() {
        let ctx = Context::new();
        let mut compiler = Compiler::new(|iri: &str| {
            if iri != "http://c" {
                return Err(Error::NotFound(iri.to_string()));
            }
            let mut layer = Layer::new(LayerType::Schema, "http://c");
            let root = layer.graph_mut().new_node([vocab::ATTRIBUTE, vocab::COMPOSITE]);
            set_node_id(layer.graph_mut().node_mut(root), "http://c#root");
            layer.set_schema_root(root);
            for (i, part) in ["http://c#o1", "http://c#o2"].iter().enumerate() {
                let object = layer.graph_mut().new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
                set_node_id(layer.graph_mut().node_mut(object), part);
                let edge = layer.graph_mut().new_edge(root, object, vocab::ALL_OF);
                layer
                    .graph_mut()
                    .edge_mut(edge)
                    .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(i as i64));
                add_child(&mut layer, object, vocab::VALUE, &format!("{part}.v"), 0);
            }
            Ok(layer)
        });
        let compiled = compiler.compile(&ctx, "http://c").unwrap();
        let graph = compiler.compiled().graph();
        let root = graph.node(compiled.root);
        assert!(root.has_label(vocab::OBJECT));
        assert!(!root.has_label(vocab::COMPOSITE));
        assert_eq!(graph.out_edges_with_label(compiled.root, vocab::ALL_OF).count(), 0);
        let children: Vec<_> = graph
            .out_edges_with_label(compiled.root, vocab::OBJECT_ATTRIBUTES)
            .map(|e| node_id(graph.node(graph.edge(e).to())).unwrap().to_string())
            .collect();
        assert_eq!(children, vec!["http://c#o1.v", "http://c#o2.v"]);
    }

    #[test]
    fn compiles_pattern_terms() {
        let ctx = Context::new();
        let mut compiler = Compiler::new(|iri: &str| {
            if iri != "http://p" {
                return Err(Error::NotFound(iri.to_string()));
            }
            let (mut layer, root) = object_layer("http://p");
            let value = add_child(&mut layer, root, vocab::VALUE, "http://p#v", 0);
            layer
                .graph_mut()
                .node_mut(value)
                .set_property(vocab::PATTERN, PropertyValue::string("^[0-9]+$"));
            Ok(layer)
        });
        compiler.compile(&ctx, "http://p").unwrap();
        let value = compiler.compiled().attribute_by_id("http://p#v").unwrap();
        let artifact = compiler.compiled().graph().node(value).compiled(vocab::PATTERN);
        assert!(matches!(artifact, Some(crate::graph::CompiledValue::Regex(_))));
    }

    #[test]
    fn missing_layer_is_not_found() {
        let ctx = Context::new();
        let mut compiler = Compiler::new(|iri: &str| Err::<Layer, _>(Error::NotFound(iri.to_string())));
        assert!(matches!(
            compiler.compile(&ctx, "http://nope"),
            Err(Error::NotFound(_))
        ));
    }
}
