//! Layer composition: merging an overlay into a schema base.
//!
//! Attributes are matched by ID, not by position. Matched attributes
//! merge label sets and compose property maps using each term's
//! registered composition rule. Overlay attributes with no match are
//! grafted under their parent's match when one exists. The overlay is
//! never mutated, so composition can be replayed and is associative on
//! compatible inputs.

use ahash::{AHashMap, AHashSet};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId};
use crate::layer::{attribute_kind, is_attribute_node, node_id, Layer};
use crate::term::vocab;

/// Merges `overlay` into `base` in place.
pub fn compose(ctx: &Context, base: &mut Layer, overlay: &Layer) -> Result<()> {
    let Some(overlay_root) = overlay.schema_root() else {
        return Ok(());
    };
    let mut index = AHashMap::new();
    for attr in base.attributes() {
        if let Some(id) = node_id(base.graph().node(attr)) {
            index.insert(id.to_string(), attr);
        }
    }
    let mut seen = AHashSet::new();
    merge_attribute(ctx, base, &index, overlay, overlay_root, None, None, &mut seen)
}

#[allow(clippy::too_many_arguments)]
fn merge_attribute(
    ctx: &Context,
    base: &mut Layer,
    index: &AHashMap<String, NodeId>,
    overlay: &Layer,
    overlay_node: NodeId,
    matched_parent: Option<NodeId>,
    incoming_edge: Option<crate::graph::EdgeId>,
    seen: &mut AHashSet<NodeId>,
) -> Result<()> {
    ctx.check_cancelled()?;
    if !seen.insert(overlay_node) {
        return Ok(());
    }
    let id = node_id(overlay.graph().node(overlay_node)).map(str::to_string);
    let matched = id.as_deref().and_then(|id| index.get(id).copied());

    match (matched, matched_parent, incoming_edge) {
        (Some(base_node), _, _) => {
            merge_node(ctx, base.graph_mut(), base_node, overlay.graph(), overlay_node)?;
            copy_annotations(base.graph_mut(), base_node, overlay.graph(), overlay_node);
            for edge in overlay.graph().ordered_out_edges(overlay_node) {
                if vocab::is_attribute_tree_edge(overlay.graph().edge(edge).label()) {
                    let child = overlay.graph().edge(edge).to();
                    merge_attribute(ctx, base, index, overlay, child, Some(base_node), Some(edge), seen)?;
                }
            }
            Ok(())
        }
        (None, Some(parent), Some(edge)) => {
            // Graft: the whole overlay subtree moves under the parent's
            // match, keeping the edge label and index.
            let mut map = AHashMap::new();
            let copy = overlay
                .graph()
                .copy_subgraph_into(overlay_node, base.graph_mut(), &mut map);
            let label = overlay.graph().edge(edge).label().to_string();
            let properties = overlay.graph().edge(edge).property_map().clone();
            let new_edge = base.graph_mut().new_edge(parent, copy, label);
            for (k, v) in properties {
                base.graph_mut().edge_mut(new_edge).set_property(k, v);
            }
            Ok(())
        }
        _ => {
            // Unanchored overlay node (a wrapper root, typically): skip
            // it and keep looking for matches below.
            for edge in overlay.graph().ordered_out_edges(overlay_node) {
                if vocab::is_attribute_tree_edge(overlay.graph().edge(edge).label()) {
                    let child = overlay.graph().edge(edge).to();
                    merge_attribute(ctx, base, index, overlay, child, None, None, seen)?;
                }
            }
            Ok(())
        }
    }
}

/// Merges labels and properties of one overlay attribute into its base
/// match.
fn merge_node(
    ctx: &Context,
    base_graph: &mut Graph,
    base_node: NodeId,
    overlay_graph: &Graph,
    overlay_node: NodeId,
) -> Result<()> {
    let overlay = overlay_graph.node(overlay_node);
    let id = node_id(overlay).unwrap_or("").to_string();

    // A kind label in the overlay may not conflict with a differing
    // kind in the base.
    if is_attribute_node(overlay) && is_attribute_node(base_graph.node(base_node)) {
        if let (Ok(overlay_kind), Ok(base_kind)) =
            (attribute_kind(overlay), attribute_kind(base_graph.node(base_node)))
        {
            if overlay_kind != base_kind {
                return Err(Error::IncompatibleComposition {
                    id,
                    msg: format!("kind {base_kind:?} conflicts with overlay kind {overlay_kind:?}"),
                });
            }
        }
    }
    let labels: Vec<String> = overlay.labels().map(str::to_string).collect();
    for label in labels {
        base_graph.node_mut(base_node).add_label(label);
    }

    for key in overlay_graph.node(overlay_node).property_keys() {
        if key.as_ref() == vocab::NODE_ID {
            continue;
        }
        let overlay_value = overlay_graph.node(overlay_node).property(&key).cloned();
        let base_value = base_graph.node(base_node).property(&key).cloned();
        let rule = ctx.registry().composition(&key);
        if let Some(composed) = rule.compose(&id, base_value.as_ref(), overlay_value.as_ref())? {
            base_graph.node_mut(base_node).set_property(key, composed);
        }
    }
    Ok(())
}

/// Copies annotation subtrees (non-attribute-tree out-edges) from the
/// overlay attribute onto its base match.
fn copy_annotations(
    base_graph: &mut Graph,
    base_node: NodeId,
    overlay_graph: &Graph,
    overlay_node: NodeId,
) {
    let edges: Vec<_> = overlay_graph.out_edges(overlay_node).collect();
    for edge_id in edges {
        let edge = overlay_graph.edge(edge_id);
        if vocab::is_attribute_tree_edge(edge.label()) || edge.label() == vocab::LAYER_ROOT {
            continue;
        }
        let mut map = AHashMap::new();
        let copy = overlay_graph.copy_subgraph_into(edge.to(), base_graph, &mut map);
        let label = edge.label().to_string();
        let properties = edge.property_map().clone();
        let new_edge = base_graph.new_edge(base_node, copy, label);
        for (k, v) in properties {
            base_graph.edge_mut(new_edge).set_property(k, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{set_node_id, LayerType};
    use crate::property::PropertyValue;

    fn layer_with_value(layer_type: LayerType, id: &str, attr_id: &str) -> Layer {
        let mut layer = Layer::new(layer_type, id);
        let root = layer.graph_mut().new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
        set_node_id(layer.graph_mut().node_mut(root), &format!("{id}#root"));
        layer.set_schema_root(root);
        let attr = layer.graph_mut().new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(layer.graph_mut().node_mut(attr), attr_id);
        let edge = layer.graph_mut().new_edge(root, attr, vocab::OBJECT_ATTRIBUTES);
        layer
            .graph_mut()
            .edge_mut(edge)
            .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(0));
        layer
    }

    #[test]
    fn override_property() {
        let ctx = Context::new();
        let mut base = layer_with_value(LayerType::Schema, "http://b", "a");
        let attr = base.find_attribute_by_id("a").unwrap();
        base.graph_mut()
            .node_mut(attr)
            .set_property(vocab::DESCRIPTION, PropertyValue::string("x"));

        let mut overlay = layer_with_value(LayerType::Overlay, "http://o", "a");
        let oattr = overlay.find_attribute_by_id("a").unwrap();
        overlay
            .graph_mut()
            .node_mut(oattr)
            .set_property(vocab::DESCRIPTION, PropertyValue::string("y"));

        compose(&ctx, &mut base, &overlay).unwrap();
        let attr = base.find_attribute_by_id("a").unwrap();
        assert_eq!(
            base.graph().node(attr).property(vocab::DESCRIPTION),
            Some(&PropertyValue::string("y"))
        );
    }

    #[test]
    fn graft_under_matched_parent() {
        let ctx = Context::new();
        let mut base = layer_with_value(LayerType::Schema, "http://b", "a");
        let mut overlay = layer_with_value(LayerType::Overlay, "http://o", "a");
        // Give the overlay root the same ID as the base root so the new
        // sibling has a matchable parent.
        let oroot = overlay.schema_root().unwrap();
        set_node_id(overlay.graph_mut().node_mut(oroot), "http://b#root");
        let extra = overlay.graph_mut().new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(overlay.graph_mut().node_mut(extra), "b");
        let edge = overlay
            .graph_mut()
            .new_edge(oroot, extra, vocab::OBJECT_ATTRIBUTES);
        overlay
            .graph_mut()
            .edge_mut(edge)
            .set_property(vocab::ATTRIBUTE_INDEX, PropertyValue::Int(1));

        compose(&ctx, &mut base, &overlay).unwrap();
        assert!(base.find_attribute_by_id("b").is_some());
        assert_eq!(base.attributes().len(), 3);
    }

    #[test]
    fn kind_conflict_is_incompatible() {
        let ctx = Context::new();
        let mut base = layer_with_value(LayerType::Schema, "http://b", "a");
        let mut overlay = layer_with_value(LayerType::Overlay, "http://o", "a");
        let oattr = overlay.find_attribute_by_id("a").unwrap();
        overlay.graph_mut().node_mut(oattr).remove_label(vocab::VALUE);
        overlay.graph_mut().node_mut(oattr).add_label(vocab::OBJECT);

        let err = compose(&ctx, &mut base, &overlay).unwrap_err();
        assert!(matches!(err, Error::IncompatibleComposition { .. }));
    }

    #[test]
    fn overlay_is_not_mutated() {
        let ctx = Context::new();
        let mut base = layer_with_value(LayerType::Schema, "http://b", "a");
        let overlay = layer_with_value(LayerType::Overlay, "http://o", "a");
        let before = overlay.graph().node_count();
        compose(&ctx, &mut base, &overlay).unwrap();
        assert_eq!(overlay.graph().node_count(), before);
    }
}
