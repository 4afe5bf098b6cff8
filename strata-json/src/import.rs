//! JSON-Schema to layer translation.
//!
//! Each entity names a location in a compiled [`SchemaSet`] and the IRI
//! of the layer to produce. The translation is recursive over the
//! schema structure: `$ref` to another entity becomes a `Reference`
//! attribute, `allOf`/`anyOf` become composites, `oneOf` becomes a
//! polymorphic attribute, `properties` an object, `items` an array,
//! and leaves carry their `type`, `format`, `enum`, `const`, `pattern`,
//! `description` and `default` as term annotations. An `x-ls` block
//! contributes arbitrary layer annotations.
//!
//! `anyOf` is deliberately conflated with `allOf`: the layer model has
//! no any-of kind, and composition folds both the same way.
//!
//! Cycles that stay inside one entity raise
//! [`Error::CyclicSchema`]; cycles crossing entity boundaries are
//! broken by the `$ref` → `Reference` rule and are fine.

use jsonptr::Token;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strata_core::bundle::ImportSpec;
use strata_core::context::Context;
use strata_core::error::{Error, Result};
use strata_core::graph::NodeId;
use strata_core::layer::{set_node_id, Layer, LayerType};
use strata_core::property::PropertyValue;
use strata_core::term::vocab;

use crate::set::{BlobLoader, SchemaHandle, SchemaSet};

/// Names a JSON-Schema location and the layer it becomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Entity name; the layer ID stands in when empty.
    #[serde(default)]
    pub name: String,
    /// The JSON-Schema reference to import.
    #[serde(rename = "ref")]
    pub reference: String,
    /// IRI of the produced layer.
    pub layer_id: String,
    /// Variant type recorded on the layer.
    #[serde(default)]
    pub value_type: Option<String>,
    /// Base for synthesised attribute IRIs; the layer ID stands in
    /// when absent.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl Entity {
    pub fn entity_name(&self) -> &str {
        if self.name.is_empty() {
            &self.layer_id
        } else {
            &self.name
        }
    }

    pub fn from_spec(spec: &ImportSpec) -> Entity {
        Entity {
            name: spec.value_type.clone(),
            reference: spec.reference.clone(),
            layer_id: spec.layer_id.clone(),
            value_type: Some(spec.value_type.clone()),
            namespace: spec.namespace.clone(),
        }
    }
}

/// The intermediate shape of one schema node.
#[derive(Debug, Default)]
struct SchemaProperty {
    key: Option<String>,
    reference: Option<String>,
    object: Option<ObjectSchema>,
    array: Option<Box<ArraySchema>>,
    one_of: Vec<SchemaProperty>,
    all_of: Vec<SchemaProperty>,
    types: Vec<String>,
    format: Option<String>,
    enumeration: Vec<String>,
    required: bool,
    pattern: Option<String>,
    description: Option<String>,
    default_value: Option<String>,
    annotations: Vec<(String, PropertyValue)>,
}

#[derive(Debug, Default)]
struct ObjectSchema {
    properties: Vec<(String, SchemaProperty)>,
}

#[derive(Debug)]
struct ArraySchema {
    items: SchemaProperty,
}

struct ImportContext<'a> {
    set: &'a SchemaSet,
    entities: &'a [Entity],
    entity_handles: &'a [SchemaHandle],
    stack: Vec<SchemaHandle>,
}

impl ImportContext<'_> {
    fn find_entity(&self, handle: &SchemaHandle) -> Option<&Entity> {
        self.entity_handles
            .iter()
            .position(|h| h == handle)
            .map(|i| &self.entities[i])
    }

    fn import_schema(&mut self, handle: &SchemaHandle) -> Result<SchemaProperty> {
        if self.stack.contains(handle) {
            let mut path: Vec<String> = self.stack.iter().map(SchemaHandle::location).collect();
            path.push(handle.location());
            return Err(Error::CyclicSchema { path });
        }
        self.stack.push(handle.clone());
        let result = self.import_inner(handle);
        self.stack.pop();
        result
    }

    fn import_inner(&mut self, handle: &SchemaHandle) -> Result<SchemaProperty> {
        let value = self.set.value(handle)?;
        let Some(object) = value.as_object() else {
            // Boolean and other degenerate schemas carry no structure.
            return Ok(SchemaProperty::default());
        };
        let mut target = SchemaProperty::default();

        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            let referent = self.set.handle(&handle.url, reference)?;
            if let Some(entity) = self.find_entity(&referent) {
                target.reference = Some(entity.layer_id.clone());
                read_extensions(object, &mut target)?;
                return Ok(target);
            }
            // Not an entity boundary: inline the referent, keeping any
            // annotations spelled on the referring node.
            let mut inlined = self.import_schema(&referent)?;
            read_extensions(object, &mut inlined)?;
            return Ok(inlined);
        }

        if let Some(parts) = object.get("allOf").and_then(Value::as_array) {
            for i in 0..parts.len() {
                let part =
                    self.import_schema(&child_handle(handle, &["allOf".into(), i.to_string()]))?;
                target.all_of.push(part);
            }
        } else if let Some(parts) = object.get("anyOf").and_then(Value::as_array) {
            for i in 0..parts.len() {
                let part =
                    self.import_schema(&child_handle(handle, &["anyOf".into(), i.to_string()]))?;
                target.all_of.push(part);
            }
        } else if let Some(parts) = object.get("oneOf").and_then(Value::as_array) {
            for i in 0..parts.len() {
                let part =
                    self.import_schema(&child_handle(handle, &["oneOf".into(), i.to_string()]))?;
                target.one_of.push(part);
            }
        } else if let Some(properties) = object.get("properties").and_then(Value::as_object) {
            let required: Vec<&str> = object
                .get("required")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            let mut out = ObjectSchema::default();
            for name in properties.keys() {
                let mut child = self
                    .import_schema(&child_handle(handle, &["properties".into(), name.clone()]))?;
                child.key = Some(name.clone());
                child.required = required.contains(&name.as_str());
                out.properties.push((name.clone(), child));
            }
            target.object = Some(out);
        } else if let Some(items) = object.get("items") {
            if items.is_array() {
                return Err(Error::InvalidSchema(format!(
                    "tuple validation is not supported at {}",
                    handle.location()
                )));
            }
            let items = self.import_schema(&child_handle(handle, &["items".into()]))?;
            target.array = Some(Box::new(ArraySchema { items }));
        } else {
            import_leaf(object, &mut target)?;
        }
        read_extensions(object, &mut target)?;
        Ok(target)
    }
}

/// Reads the `x-ls` extension block, valid on any schema shape.
fn read_extensions(
    object: &serde_json::Map<String, Value>,
    target: &mut SchemaProperty,
) -> Result<()> {
    let Some(extension) = object.get("x-ls") else {
        return Ok(());
    };
    let extension = extension
        .as_object()
        .ok_or_else(|| Error::InvalidSchema("x-ls is not an object".into()))?;
    for (key, value) in extension {
        let property = PropertyValue::from_json(value)
            .ok_or_else(|| Error::InvalidSchema(format!("invalid x-ls value: {key}")))?;
        target
            .annotations
            .push((vocab::annotation_term(key), property));
    }
    Ok(())
}

fn child_handle(handle: &SchemaHandle, segments: &[String]) -> SchemaHandle {
    let mut pointer = handle.pointer.clone();
    for segment in segments {
        pointer.push_back(Token::new(segment.clone()));
    }
    SchemaHandle {
        url: handle.url.clone(),
        pointer,
    }
}

fn import_leaf(object: &serde_json::Map<String, Value>, target: &mut SchemaProperty) -> Result<()> {
    match object.get("type") {
        Some(Value::String(t)) => target.types.push(t.clone()),
        Some(Value::Array(items)) => {
            target
                .types
                .extend(items.iter().filter_map(Value::as_str).map(str::to_string));
        }
        _ => {}
    }
    if let Some(format) = object.get("format").and_then(Value::as_str) {
        target.format = Some(format.to_string());
    }
    if let Some(options) = object.get("enum").and_then(Value::as_array) {
        target.enumeration = options.iter().map(scalar_string).collect();
    }
    if let Some(constant) = object.get("const") {
        // const is a single-valued enum.
        target.enumeration = vec![scalar_string(constant)];
    }
    if let Some(pattern) = object.get("pattern").and_then(Value::as_str) {
        target.pattern = Some(pattern.to_string());
    }
    if let Some(description) = object.get("description").and_then(Value::as_str) {
        target.description = Some(description.to_string());
    }
    if let Some(default) = object.get("default") {
        target.default_value = Some(scalar_string(default));
    }
    Ok(())
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Imports the entities of a compiled schema set, producing one layer
/// per entity. `layer_type` selects whether schemas or overlays come
/// out.
pub fn import_entities(
    ctx: &Context,
    set: &SchemaSet,
    entities: &[Entity],
    layer_type: LayerType,
) -> Result<Vec<Layer>> {
    let mut handles = Vec::with_capacity(entities.len());
    for entity in entities {
        handles.push(set.root_handle(&entity.reference)?);
    }
    let mut out = Vec::with_capacity(entities.len());
    for (i, entity) in entities.iter().enumerate() {
        ctx.check_cancelled()?;
        debug!("importing {} as {}", entity.entity_name(), entity.layer_id);
        let mut import_ctx = ImportContext {
            set,
            entities,
            entity_handles: &handles,
            stack: Vec::new(),
        };
        let property = import_ctx.import_schema(&handles[i])?;
        out.push(build_layer(entity, property, layer_type)?);
    }
    Ok(out)
}

/// Compiles the schema documents behind `specs` and imports them. This
/// is the importer callback shape [`strata_core::Bundle::get_layers`]
/// expects.
pub fn import_specs<L: BlobLoader>(
    ctx: &Context,
    loader: &L,
    specs: &[ImportSpec],
    layer_type: LayerType,
) -> Result<Vec<Layer>> {
    let entities: Vec<Entity> = specs.iter().map(Entity::from_spec).collect();
    let set = SchemaSet::compile(loader, specs.iter().map(|s| s.reference.as_str()))?;
    import_entities(ctx, &set, &entities, layer_type)
}

fn build_layer(entity: &Entity, property: SchemaProperty, layer_type: LayerType) -> Result<Layer> {
    let mut layer = Layer::new(layer_type, &entity.layer_id);
    if let Some(value_type) = &entity.value_type {
        let info = layer.info();
        layer
            .graph_mut()
            .node_mut(info)
            .set_property(vocab::VALUE_TYPE, PropertyValue::string(value_type));
    }
    let base = entity.namespace.clone().unwrap_or_else(|| entity.layer_id.clone());
    let root = build_attribute(&mut layer, entity.layer_id.clone(), &base, &[], property)?;
    layer.set_schema_root(root);
    Ok(layer)
}

fn attribute_id(base: &str, path: &[String]) -> String {
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, path.join("."))
    }
}

fn build_attribute(
    layer: &mut Layer,
    id: String,
    base: &str,
    path: &[String],
    property: SchemaProperty,
) -> Result<NodeId> {
    let kind = if property.reference.is_some() {
        vocab::REFERENCE
    } else if property.object.is_some() {
        vocab::OBJECT
    } else if property.array.is_some() {
        vocab::ARRAY
    } else if !property.one_of.is_empty() {
        vocab::POLYMORPHIC
    } else if !property.all_of.is_empty() {
        vocab::COMPOSITE
    } else {
        vocab::VALUE
    };
    let node = layer.graph_mut().new_node([vocab::ATTRIBUTE, kind]);
    set_node_id(layer.graph_mut().node_mut(node), &id);
    apply_annotations(layer, node, &property);

    if let Some(reference) = &property.reference {
        layer
            .graph_mut()
            .node_mut(node)
            .set_property(vocab::REF, PropertyValue::string(reference));
        return Ok(node);
    }
    if let Some(object) = property.object {
        for (index, (name, child)) in object.properties.into_iter().enumerate() {
            let mut child_path = path.to_vec();
            child_path.push(name);
            let child_id = attribute_id(base, &child_path);
            let child_node = build_attribute(layer, child_id, base, &child_path, child)?;
            attach(layer, node, child_node, vocab::OBJECT_ATTRIBUTES, index as i64);
        }
        return Ok(node);
    }
    if let Some(array) = property.array {
        let mut child_path = path.to_vec();
        child_path.push("*".to_string());
        let child_id = attribute_id(base, &child_path);
        let child_node = build_attribute(layer, child_id, base, &child_path, array.items)?;
        attach(layer, node, child_node, vocab::ARRAY_ITEMS, 0);
        return Ok(node);
    }
    let (branches, label) = if !property.one_of.is_empty() {
        (property.one_of, vocab::ONE_OF)
    } else if !property.all_of.is_empty() {
        (property.all_of, vocab::ALL_OF)
    } else {
        return Ok(node);
    };
    for (index, branch) in branches.into_iter().enumerate() {
        let mut child_path = path.to_vec();
        child_path.push(index.to_string());
        let child_id = attribute_id(base, &child_path);
        let child_node = build_attribute(layer, child_id, base, &child_path, branch)?;
        attach(layer, node, child_node, label, index as i64);
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

fn apply_annotations(layer: &mut Layer, node: NodeId, property: &SchemaProperty) {
    let graph = layer.graph_mut();
    let node = graph.node_mut(node);
    if let Some(key) = &property.key {
        node.set_property(vocab::ATTRIBUTE_NAME, PropertyValue::string(key));
    }
    match property.types.as_slice() {
        [] => {}
        [single] => node.set_property(vocab::VALUE_TYPE, PropertyValue::string(single)),
        many => node.set_property(vocab::VALUE_TYPE, PropertyValue::list(many.iter())),
    }
    if let Some(format) = &property.format {
        node.set_property(vocab::FORMAT, PropertyValue::string(format));
    }
    if !property.enumeration.is_empty() {
        node.set_property(vocab::ENUM, PropertyValue::list(property.enumeration.iter()));
    }
    if let Some(pattern) = &property.pattern {
        node.set_property(vocab::PATTERN, PropertyValue::string(pattern));
    }
    if let Some(description) = &property.description {
        node.set_property(vocab::DESCRIPTION, PropertyValue::string(description));
    }
    if let Some(default) = &property.default_value {
        node.set_property(vocab::DEFAULT, PropertyValue::string(default));
    }
    if property.required {
        node.set_property(vocab::REQUIRED, PropertyValue::Bool(true));
    }
    for (term, value) in &property.annotations {
        node.set_property(term.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::layer::{attribute_kind, AttributeKind};

    fn loader(docs: Vec<(&'static str, Value)>) -> impl Fn(&str) -> Result<Vec<u8>> {
        move |key: &str| {
            docs.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, v)| serde_json::to_vec(v).unwrap())
                .ok_or_else(|| Error::NotFound(key.to_string()))
        }
    }

    fn person_and_order() -> (SchemaSet, Vec<Entity>) {
        let loader = loader(vec![
            (
                "person.json",
                json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "x-ls": { "entityIdFields": "http://person.id" } },
                        "name": { "type": "string", "pattern": "^[A-Z]" }
                    },
                    "required": ["id"]
                }),
            ),
            (
                "order.json",
                json!({
                    "properties": {
                        "buyer": { "$ref": "person.json" },
                        "lines": { "items": { "type": "string" } },
                        "payment": {
                            "oneOf": [
                                { "type": "string" },
                                { "type": "integer" }
                            ]
                        },
                        "audit": {
                            "allOf": [
                                { "properties": { "by": { "type": "string" } } },
                                { "properties": { "at": { "type": "string", "format": "date-time" } } }
                            ]
                        }
                    }
                }),
            ),
        ]);
        let set = SchemaSet::compile(&loader, ["person.json", "order.json"]).unwrap();
        let entities = vec![
            Entity {
                name: "Person".into(),
                reference: "person.json".into(),
                layer_id: "http://person".into(),
                value_type: Some("Person".into()),
                namespace: None,
            },
            Entity {
                name: "Order".into(),
                reference: "order.json".into(),
                layer_id: "http://order".into(),
                value_type: Some("Order".into()),
                namespace: None,
            },
        ];
        (set, entities)
    }

    #[test]
    fn translates_the_structural_kinds() {
        let ctx = Context::new();
        let (set, entities) = person_and_order();
        let layers = import_entities(&ctx, &set, &entities, LayerType::Schema).unwrap();
        assert_eq!(layers.len(), 2);

        let order = &layers[1];
        let buyer = order.find_attribute_by_id("http://order.buyer").unwrap();
        assert_eq!(
            attribute_kind(order.graph().node(buyer)).unwrap(),
            AttributeKind::Reference
        );
        assert_eq!(
            order.graph().node(buyer).property(vocab::REF),
            Some(&PropertyValue::string("http://person"))
        );
        let lines = order.find_attribute_by_id("http://order.lines").unwrap();
        assert_eq!(
            attribute_kind(order.graph().node(lines)).unwrap(),
            AttributeKind::Array
        );
        assert!(order.find_attribute_by_id("http://order.lines.*").is_some());
        let payment = order.find_attribute_by_id("http://order.payment").unwrap();
        assert_eq!(
            attribute_kind(order.graph().node(payment)).unwrap(),
            AttributeKind::Polymorphic
        );
        let audit = order.find_attribute_by_id("http://order.audit").unwrap();
        assert_eq!(
            attribute_kind(order.graph().node(audit)).unwrap(),
            AttributeKind::Composite
        );

        let person = &layers[0];
        let id = person.find_attribute_by_id("http://person.id").unwrap();
        assert_eq!(
            person.graph().node(id).property(vocab::REQUIRED),
            Some(&PropertyValue::Bool(true))
        );
        // x-ls keys become layer annotations.
        assert_eq!(
            person.graph().node(id).property(vocab::ENTITY_ID_FIELDS),
            Some(&PropertyValue::string("http://person.id"))
        );
        let name = person.find_attribute_by_id("http://person.name").unwrap();
        assert_eq!(
            person.graph().node(name).property(vocab::PATTERN),
            Some(&PropertyValue::string("^[A-Z]"))
        );
    }

    #[test]
    fn intra_entity_cycles_are_detected() {
        let loader = loader(vec![(
            "loop.json",
            json!({
                "properties": {
                    "next": { "$ref": "loop.json#/properties/next" }
                }
            }),
        )]);
        let set = SchemaSet::compile(&loader, ["loop.json"]).unwrap();
        let entities = vec![Entity {
            name: String::new(),
            reference: "loop.json".into(),
            layer_id: "http://loop".into(),
            value_type: None,
            namespace: None,
        }];
        let ctx = Context::new();
        let err = import_entities(&ctx, &set, &entities, LayerType::Schema).unwrap_err();
        assert!(matches!(err, Error::CyclicSchema { .. }));
    }

    #[test]
    fn entity_boundaries_break_cycles() {
        let loader = loader(vec![
            ("a.json", json!({ "properties": { "b": { "$ref": "b.json" } } })),
            ("b.json", json!({ "properties": { "a": { "$ref": "a.json" } } })),
        ]);
        let set = SchemaSet::compile(&loader, ["a.json", "b.json"]).unwrap();
        let entities = vec![
            Entity {
                name: String::new(),
                reference: "a.json".into(),
                layer_id: "http://a".into(),
                value_type: None,
                namespace: None,
            },
            Entity {
                name: String::new(),
                reference: "b.json".into(),
                layer_id: "http://b".into(),
                value_type: None,
                namespace: None,
            },
        ];
        let ctx = Context::new();
        let layers = import_entities(&ctx, &set, &entities, LayerType::Schema).unwrap();
        let a = &layers[0];
        let b_ref = a.find_attribute_by_id("http://a.b").unwrap();
        assert_eq!(
            a.graph().node(b_ref).property(vocab::REF),
            Some(&PropertyValue::string("http://b"))
        );
    }

    #[test]
    fn tuple_items_are_unsupported() {
        let loader = loader(vec![(
            "t.json",
            json!({ "items": [ { "type": "string" }, { "type": "integer" } ] }),
        )]);
        let set = SchemaSet::compile(&loader, ["t.json"]).unwrap();
        let entities = vec![Entity {
            name: String::new(),
            reference: "t.json".into(),
            layer_id: "http://t".into(),
            value_type: None,
            namespace: None,
        }];
        let ctx = Context::new();
        assert!(matches!(
            import_entities(&ctx, &set, &entities, LayerType::Schema),
            Err(Error::InvalidSchema(_))
        ));
    }
}
