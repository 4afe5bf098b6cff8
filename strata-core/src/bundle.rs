//! Bundles: declarative variant catalogues.
//!
//! A bundle maps variant-type names to a schema reference and overlay
//! references, each either a native-layer file or a JSON-Schema import
//! reference. Bundles can inherit from a base bundle; merging unions
//! the variant table, overriding the schema reference and appending
//! overlays. Resolution loads native layers once, hands JSON-Schema
//! references to the importer in one batch per role, and composes each
//! variant's overlays into a clone of its schema.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compose::compose;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::layer::{Layer, LayerType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Bundle {
    /// Path to a parent bundle to inherit from, relative to this
    /// bundle's file.
    pub base: Option<String>,
    pub type_names: BTreeMap<String, BundleVariant>,
}

/// A schema plus its overlays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleVariant {
    #[serde(flatten)]
    pub schema: BundleSchemaRef,
    pub overlays: Vec<BundleSchemaRef>,
}

/// Reference to a layer: a native-layer file or a JSON-Schema import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundleSchemaRef {
    pub schema: Option<String>,
    pub json_schema: Option<JsonSchemaRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JsonSchemaRef {
    pub layer_id: String,
    pub r#ref: String,
    pub namespace: Option<String>,
}

/// A JSON-Schema reference collected for one importer batch.
#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub layer_id: String,
    pub value_type: String,
    pub reference: String,
    pub namespace: Option<String>,
}

impl BundleSchemaRef {
    pub fn is_empty(&self) -> bool {
        self.schema.as_deref().map_or(true, str::is_empty) && self.json_schema.is_none()
    }

    /// The layer ID this reference resolves under.
    pub fn layer_id(&self) -> Option<&str> {
        if let Some(json_schema) = &self.json_schema {
            return Some(&json_schema.layer_id);
        }
        self.schema.as_deref().filter(|s| !s.is_empty())
    }

    fn resolve_filenames(&mut self, dir: &Path) {
        if let Some(schema) = &mut self.schema {
            *schema = relative_to(dir, schema);
        }
        if let Some(json_schema) = &mut self.json_schema {
            json_schema.r#ref = relative_to(dir, &json_schema.r#ref);
        }
    }

    /// Replaces this reference when `other` is non-empty.
    fn merge(&mut self, other: &BundleSchemaRef) {
        if !other.is_empty() {
            *self = other.clone();
        }
    }
}

fn relative_to(dir: &Path, name: &str) -> String {
    let path = Path::new(name);
    if path.is_absolute() {
        return name.to_string();
    }
    dir.join(path).to_string_lossy().into_owned()
}

impl Bundle {
    pub fn from_json_str(text: &str) -> Result<Bundle> {
        serde_json::from_str(text).map_err(|e| Error::InvalidSchema(format!("bad bundle: {e}")))
    }

    pub fn from_yaml_str(text: &str) -> Result<Bundle> {
        serde_yaml::from_str(text).map_err(|e| Error::InvalidSchema(format!("bad bundle: {e}")))
    }

    /// Rewrites relative file references against the bundle file's
    /// directory.
    pub fn resolve_filenames(&mut self, dir: &Path) {
        for variant in self.type_names.values_mut() {
            variant.schema.resolve_filenames(dir);
            for overlay in &mut variant.overlays {
                overlay.resolve_filenames(dir);
            }
        }
        if let Some(base) = &mut self.base {
            *base = relative_to(dir, base);
        }
    }

    /// Merges `other` into this bundle: variant union, schema reference
    /// override when non-empty, overlay concatenation.
    pub fn merge(&mut self, other: &Bundle) {
        for (type_name, variant) in &other.type_names {
            match self.type_names.get_mut(type_name) {
                None => {
                    self.type_names.insert(type_name.clone(), variant.clone());
                }
                Some(existing) => {
                    existing.schema.merge(&variant.schema);
                    existing.overlays.extend(variant.overlays.iter().cloned());
                }
            }
        }
    }

    /// Resolves the bundle into composed layers keyed by variant type.
    ///
    /// `load_layer` reads a native-layer file; `import` turns one batch
    /// of JSON-Schema references into layers of the given type.
    pub fn get_layers<L, I>(
        &self,
        ctx: &Context,
        mut load_layer: L,
        mut import: I,
    ) -> Result<BTreeMap<String, Layer>>
    where
        L: FnMut(&str) -> Result<Layer>,
        I: FnMut(&[ImportSpec], LayerType) -> Result<Vec<Layer>>,
    {
        // Layers keyed by layer ID, and the filename/layerId → loaded
        // layer ID map.
        let mut layers: BTreeMap<String, Layer> = BTreeMap::new();
        let mut layer_id_map: BTreeMap<String, String> = BTreeMap::new();
        let mut schema_specs: BTreeMap<String, ImportSpec> = BTreeMap::new();
        let mut overlay_specs: BTreeMap<String, ImportSpec> = BTreeMap::new();

        for (variant_type, variant) in &self.type_names {
            let mut process = |reference: &BundleSchemaRef,
                               specs: &mut BTreeMap<String, ImportSpec>|
             -> Result<()> {
                if let Some(file) = reference.schema.as_deref().filter(|s| !s.is_empty()) {
                    if layer_id_map.contains_key(file) {
                        return Ok(());
                    }
                    let layer = load_layer(file)?;
                    let layer_id = layer.id().to_string();
                    if layers.contains_key(&layer_id) {
                        return Err(Error::InvalidSchema(format!(
                            "duplicate layer id {layer_id} in {file}"
                        )));
                    }
                    layer_id_map.insert(file.to_string(), layer_id.clone());
                    layers.insert(layer_id, layer);
                } else if let Some(json_schema) = &reference.json_schema {
                    if !specs.contains_key(&json_schema.layer_id) {
                        specs.insert(
                            json_schema.layer_id.clone(),
                            ImportSpec {
                                layer_id: json_schema.layer_id.clone(),
                                value_type: variant_type.clone(),
                                reference: json_schema.r#ref.clone(),
                                namespace: json_schema.namespace.clone(),
                            },
                        );
                        layer_id_map
                            .insert(json_schema.layer_id.clone(), json_schema.layer_id.clone());
                    }
                }
                Ok(())
            };
            process(&variant.schema, &mut schema_specs)?;
            for overlay in &variant.overlays {
                process(overlay, &mut overlay_specs)?;
            }
        }

        // Import schemas first, then overlays, one batch each.
        for (specs, layer_type) in [
            (schema_specs, LayerType::Schema),
            (overlay_specs, LayerType::Overlay),
        ] {
            if specs.is_empty() {
                continue;
            }
            let batch: Vec<ImportSpec> = specs.into_values().collect();
            for layer in import(&batch, layer_type)? {
                let layer_id = layer.id().to_string();
                if layers.contains_key(&layer_id) {
                    return Err(Error::InvalidSchema(format!(
                        "multiple definitions for layer {layer_id}"
                    )));
                }
                layers.insert(layer_id, layer);
            }
        }

        let mut out = BTreeMap::new();
        for (variant_type, variant) in &self.type_names {
            let schema = self.lookup(&layers, &layer_id_map, &variant.schema, variant_type)?;
            let (mut composed, _) = schema.clone_layer();
            for overlay_ref in &variant.overlays {
                let overlay = self.lookup(&layers, &layer_id_map, overlay_ref, variant_type)?;
                compose(ctx, &mut composed, overlay)?;
            }
            out.insert(variant_type.clone(), composed);
        }
        Ok(out)
    }

    fn lookup<'a>(
        &self,
        layers: &'a BTreeMap<String, Layer>,
        layer_id_map: &BTreeMap<String, String>,
        reference: &BundleSchemaRef,
        variant_type: &str,
    ) -> Result<&'a Layer> {
        let key = reference
            .layer_id()
            .ok_or_else(|| Error::InvalidSchema(format!("variant {variant_type} without a schema")))?;
        layer_id_map
            .get(key)
            .and_then(|id| layers.get(id))
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::layer_from_json_str;
    use crate::term::vocab;
    use crate::property::PropertyValue;

    const BUNDLE: &str = r#"{
        "typeNames": {
            "Person": {
                "schema": "person.json",
                "overlays": [ { "schema": "person-ovl.json" } ]
            }
        }
    }"#;

    fn person_schema() -> &'static str {
        r#"{
            "@id": "http://person",
            "@type": "Schema",
            "layer": {
                "@id": "http://person#root",
                "@type": "Object",
                "attributes": { "name": { "@type": "Value" } }
            }
        }"#
    }

    fn person_overlay() -> &'static str {
        r#"{
            "@id": "http://person-ovl",
            "@type": "Overlay",
            "layer": {
                "@id": "http://person#root",
                "@type": "Object",
                "attributes": { "name": { "@type": "Value", "description": "from overlay" } }
            }
        }"#
    }

    #[test]
    fn parses_and_merges() {
        let mut bundle = Bundle::from_json_str(BUNDLE).unwrap();
        let other = Bundle::from_yaml_str(
            "typeNames:\n  Order:\n    schema: order.json\n  Person:\n    overlays:\n      - schema: extra.json\n",
        )
        .unwrap();
        bundle.merge(&other);
        assert_eq!(bundle.type_names.len(), 2);
        let person = &bundle.type_names["Person"];
        // Empty incoming schema ref does not clobber the existing one.
        assert_eq!(person.schema.layer_id(), Some("person.json"));
        assert_eq!(person.overlays.len(), 2);
    }

    #[test]
    fn resolves_variants_with_overlays() {
        let ctx = Context::new();
        let bundle = Bundle::from_json_str(BUNDLE).unwrap();
        let layers = bundle
            .get_layers(
                &ctx,
                |file| match file {
                    "person.json" => layer_from_json_str(person_schema()),
                    "person-ovl.json" => layer_from_json_str(person_overlay()),
                    other => Err(Error::NotFound(other.to_string())),
                },
                |_, _| Ok(Vec::new()),
            )
            .unwrap();
        let person = &layers["Person"];
        let name = person.find_attribute_by_id("name").unwrap();
        assert_eq!(
            person.graph().node(name).property(vocab::DESCRIPTION),
            Some(&PropertyValue::string("from overlay"))
        );
    }
}
