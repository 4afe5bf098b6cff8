//! Terms: IRI-keyed property names with registered semantics.
//!
//! A term couples an IRI with a composition rule, an optional per-term
//! compiler, an optional node compiler, and an optional validator. The
//! registry is built once during initialisation, shared through the
//! [`Context`](crate::context::Context), and read-only afterwards.

use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Error, Result};
use crate::graph::{CompiledValue, Graph, Node, NodeId};
use crate::interner::Interner;
use crate::property::PropertyValue;

/// The vocabulary: every term IRI the core understands.
///
/// Kind labels, attribute-tree edge labels, and annotation terms all
/// live in a single namespace so schemas can spell any of them out in
/// full.
pub mod vocab {
    macro_rules! term {
        ($(#[$doc:meta])* $name:ident => $suffix:literal) => {
            $(#[$doc])*
            pub const $name: &str = concat!("https://strataschema.org/", $suffix);
        };
    }

    term!(
        /// Label carried by every schema attribute node.
        ATTRIBUTE => "Attribute"
    );
    term!(VALUE => "Value");
    term!(OBJECT => "Object");
    term!(ARRAY => "Array");
    term!(REFERENCE => "Reference");
    term!(POLYMORPHIC => "Polymorphic");
    term!(COMPOSITE => "Composite");
    term!(
        /// Label of the layer info node.
        LAYER => "Layer"
    );
    term!(SCHEMA => "Schema");
    term!(OVERLAY => "Overlay");
    term!(
        /// Label carried by every ingested document node.
        DOCUMENT_NODE => "DocumentNode"
    );

    term!(
        /// Edge from the layer info node to the schema root attribute.
        LAYER_ROOT => "layerRoot"
    );
    term!(OBJECT_ATTRIBUTES => "objectAttributes");
    term!(ARRAY_ITEMS => "arrayItems");
    term!(ALL_OF => "allOf");
    term!(ONE_OF => "oneOf");
    term!(
        /// Default document edge label.
        HAS => "has"
    );
    term!(INSTANCE_OF => "instanceOf");

    term!(
        /// Stable node ID; for attributes, the attribute IRI.
        NODE_ID => "nodeId"
    );
    term!(LAYER_TYPE => "layerType");
    term!(ATTRIBUTE_NAME => "attributeName");
    term!(ATTRIBUTE_INDEX => "attributeIndex");
    term!(DESCRIPTION => "description");
    term!(VALUE_TYPE => "valueType");
    term!(CHARACTER_ENCODING => "characterEncoding");
    term!(
        /// Marks an attribute as an entity root; holds the layer ID
        /// after compilation.
        ENTITY_SCHEMA => "entitySchema"
    );
    term!(ENTITY_ID_FIELDS => "entityIdFields");
    term!(ENTITY_ID => "entityId");
    term!(INGEST_AS => "ingestAs");
    term!(EDGE_LABEL => "edgeLabel");
    term!(PROPERTY_NAME => "propertyName");
    term!(AS_PROPERTY_OF => "asPropertyOf");
    term!(
        /// The IRI a `Reference` attribute points at.
        REF => "ref"
    );
    term!(SCHEMA_NODE_ID => "schemaNodeId");
    term!(
        /// Raw value carried by a document value node.
        RAW_VALUE => "value"
    );
    term!(DEFAULT => "defaultValue");

    term!(REQUIRED => "validation/required");
    term!(ENUM => "validation/enumeration");
    term!(CONST => "validation/const");
    term!(PATTERN => "validation/pattern");
    term!(FORMAT => "validation/format");

    term!(LINK_FK => "link/foreignKey");
    term!(LINK_LABEL => "link/label");
    term!(LINK_FORWARD => "link/forward");
    term!(LINK_MULTI => "link/multi");
    term!(
        /// Layer IRI a link resolves into; written by the compiler.
        LINK_TARGET => "link/target"
    );

    term!(VS_CONTEXT => "vs/context");
    term!(VS_REQUEST_KEYS => "vs/requestKeys");
    term!(VS_REQUEST_VALUES => "vs/requestValues");
    term!(VS_RESULT_KEYS => "vs/resultKeys");
    term!(VS_RESULT_VALUES => "vs/resultValues");

    /// True for the four edge labels that form the attribute tree.
    pub fn is_attribute_tree_edge(label: &str) -> bool {
        label == OBJECT_ATTRIBUTES || label == ARRAY_ITEMS || label == ALL_OF || label == ONE_OF
    }

    /// Maps an annotation key from a layer or schema file to a term
    /// IRI. Full IRIs pass through; known shorthands expand; unknown
    /// bare names land in the default namespace.
    pub fn annotation_term(key: &str) -> String {
        match key {
            "attributeName" => ATTRIBUTE_NAME.to_string(),
            "attributeIndex" => ATTRIBUTE_INDEX.to_string(),
            "description" => DESCRIPTION.to_string(),
            "valueType" | "type" => VALUE_TYPE.to_string(),
            "characterEncoding" => CHARACTER_ENCODING.to_string(),
            "entitySchema" => ENTITY_SCHEMA.to_string(),
            "entityIdFields" => ENTITY_ID_FIELDS.to_string(),
            "ingestAs" => INGEST_AS.to_string(),
            "edgeLabel" => EDGE_LABEL.to_string(),
            "propertyName" => PROPERTY_NAME.to_string(),
            "asPropertyOf" => AS_PROPERTY_OF.to_string(),
            "default" | "defaultValue" => DEFAULT.to_string(),
            "required" => REQUIRED.to_string(),
            "enum" | "enumeration" => ENUM.to_string(),
            "const" => CONST.to_string(),
            "pattern" => PATTERN.to_string(),
            "format" => FORMAT.to_string(),
            "fk" | "foreignKey" => LINK_FK.to_string(),
            "linkLabel" => LINK_LABEL.to_string(),
            "forward" => LINK_FORWARD.to_string(),
            "multi" => LINK_MULTI.to_string(),
            _ if key.contains("://") || key.starts_with("urn:") => key.to_string(),
            _ => format!("https://strataschema.org/{key}"),
        }
    }
}

/*
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
╔═══════════════════════════════════════════════════════════════════════╗
║                                                                       ║
║                              Composition                              ║
║                              ¯¯¯¯¯¯¯¯¯¯¯                              ║
╚═══════════════════════════════════════════════════════════════════════╝
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
*/

/// How two values of a term merge when an overlay composes into a
/// base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum Composition {
    /// The overlay value replaces the base value if present.
    #[default]
    #[strum(serialize = "override")]
    Override,
    /// Both sides are unordered string sets; the result is the union.
    #[strum(serialize = "set-union")]
    SetUnion,
    /// Both sides are ordered lists; the overlay appends.
    #[strum(serialize = "list-concat")]
    ListConcat,
    /// Present on both sides with differing values is an error.
    #[strum(serialize = "no-composition")]
    NoComposition,
}

impl Composition {
    /// Composes `overlay` into `base` for the term `id` names.
    pub fn compose(
        &self,
        id: &str,
        base: Option<&PropertyValue>,
        overlay: Option<&PropertyValue>,
    ) -> Result<Option<PropertyValue>> {
        match self {
            Composition::Override => Ok(overlay.or(base).cloned()),
            Composition::SetUnion => {
                let mut out: Vec<Arc<str>> =
                    base.map(PropertyValue::must_string_slice).unwrap_or_default();
                for item in overlay.map(PropertyValue::must_string_slice).unwrap_or_default() {
                    if !out.contains(&item) {
                        out.push(item);
                    }
                }
                if out.is_empty() {
                    Ok(overlay.or(base).cloned())
                } else {
                    Ok(Some(PropertyValue::List(out)))
                }
            }
            Composition::ListConcat => {
                let mut out: Vec<Arc<str>> =
                    base.map(PropertyValue::must_string_slice).unwrap_or_default();
                out.extend(overlay.map(PropertyValue::must_string_slice).unwrap_or_default());
                if out.is_empty() {
                    Ok(overlay.or(base).cloned())
                } else {
                    Ok(Some(PropertyValue::List(out)))
                }
            }
            Composition::NoComposition => match (base, overlay) {
                (Some(a), Some(b)) if a != b => Err(Error::IncompatibleComposition {
                    id: id.to_string(),
                    msg: format!("{a} conflicts with {b}"),
                }),
                (a, b) => Ok(b.or(a).cloned()),
            },
        }
    }
}

/// A value validator attached to a term.
///
/// `validate_node` with no document node succeeds by default;
/// implementations read the raw value off the document node.
pub trait Validator: Send + Sync {
    /// Short validator name used in error messages.
    fn name(&self) -> &'static str;

    /// Validates a raw value against the schema node carrying the
    /// term.
    fn validate_value(&self, value: Option<&str>, schema_node: &Node) -> Result<()>;

    /// Validates an ingested document node.
    fn validate_node(&self, doc_node: Option<&Node>, schema_node: &Node) -> Result<()> {
        match doc_node {
            None => Ok(()),
            Some(doc) => {
                let raw = doc.property(vocab::RAW_VALUE).and_then(PropertyValue::as_str);
                self.validate_value(raw, schema_node)
            }
        }
    }
}

/// Compiles a term's property into a derived artifact during the
/// per-term compile pass.
pub trait TermCompiler: Send + Sync {
    /// Returns the artifact to store beside the property, or `None` if
    /// there is nothing to derive.
    fn compile_term(&self, term: &str, value: &PropertyValue) -> Result<Option<CompiledValue>>;
}

/// Compiles a non-attribute node whose ID names this compiler.
pub trait NodeCompiler: Send + Sync {
    fn compile_node(&self, graph: &mut Graph, node: NodeId) -> Result<()>;
}

/// Metadata registered for a term IRI.
#[derive(Default, Clone)]
pub struct TermMeta {
    pub composition: Composition,
    pub term_compiler: Option<Arc<dyn TermCompiler>>,
    pub node_compiler: Option<Arc<dyn NodeCompiler>>,
    pub validator: Option<Arc<dyn Validator>>,
}

impl TermMeta {
    pub fn with_composition(composition: Composition) -> Self {
        TermMeta {
            composition,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for TermMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermMeta")
            .field("composition", &self.composition)
            .field("term_compiler", &self.term_compiler.is_some())
            .field("node_compiler", &self.node_compiler.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/*
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
╔═══════════════════════════════════════════════════════════════════════╗
║                                                                       ║
║                             TermRegistry                              ║
║                             ¯¯¯¯¯¯¯¯¯¯¯¯                              ║
╚═══════════════════════════════════════════════════════════════════════╝
░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░░
*/

/// The term table: IRI → metadata, plus the shared interner.
///
/// Built once at startup; the public [`register`](TermRegistry::register)
/// refuses to overwrite, making the table append-only.
#[derive(Debug, Default)]
pub struct TermRegistry {
    interner: Interner,
    terms: AHashMap<Arc<str>, TermMeta>,
}

impl TermRegistry {
    /// An empty registry with no vocabulary. Most callers want
    /// [`with_builtins`](TermRegistry::with_builtins).
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the vocabulary's composition rules
    /// and the built-in validators.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.install_builtins();
        registry
    }

    fn insert(&mut self, iri: &str, meta: TermMeta) {
        let key = self.interner.intern(iri);
        self.terms.insert(key, meta);
    }

    fn install_builtins(&mut self) {
        use crate::validators::{EnumValidator, FormatValidator, PatternValidator};
        use Composition::*;

        for iri in [
            vocab::ATTRIBUTE_NAME,
            vocab::INGEST_AS,
            vocab::EDGE_LABEL,
            vocab::PROPERTY_NAME,
            vocab::AS_PROPERTY_OF,
            vocab::ENTITY_ID_FIELDS,
            vocab::DESCRIPTION,
            vocab::DEFAULT,
            vocab::REQUIRED,
            vocab::CHARACTER_ENCODING,
            vocab::LINK_FK,
            vocab::LINK_LABEL,
            vocab::LINK_FORWARD,
            vocab::LINK_MULTI,
            vocab::LINK_TARGET,
            vocab::VS_CONTEXT,
            vocab::VS_REQUEST_KEYS,
            vocab::VS_REQUEST_VALUES,
            vocab::VS_RESULT_KEYS,
            vocab::VS_RESULT_VALUES,
        ] {
            self.insert(iri, TermMeta::with_composition(Override));
        }
        self.insert(vocab::VALUE_TYPE, TermMeta::with_composition(SetUnion));
        self.insert(vocab::ENTITY_SCHEMA, TermMeta::with_composition(NoComposition));

        let enum_validator = Arc::new(EnumValidator::new("enum", vocab::ENUM));
        self.insert(
            vocab::ENUM,
            TermMeta {
                composition: Override,
                validator: Some(enum_validator),
                ..Default::default()
            },
        );
        let const_validator = Arc::new(EnumValidator::new("const", vocab::CONST));
        self.insert(
            vocab::CONST,
            TermMeta {
                composition: Override,
                validator: Some(const_validator),
                ..Default::default()
            },
        );
        let pattern = Arc::new(PatternValidator);
        self.insert(
            vocab::PATTERN,
            TermMeta {
                composition: Override,
                term_compiler: Some(pattern.clone()),
                validator: Some(pattern),
                ..Default::default()
            },
        );
        let format = Arc::new(FormatValidator);
        self.insert(
            vocab::FORMAT,
            TermMeta {
                composition: Override,
                term_compiler: Some(format.clone()),
                validator: Some(format),
                ..Default::default()
            },
        );
    }

    /// Registers a new term. Available during initialisation only, in
    /// the sense that re-registering an existing IRI is refused.
    pub fn register(&mut self, iri: &str, meta: TermMeta) -> Result<()> {
        if self.terms.contains_key(iri) {
            return Err(Error::InvalidSchema(format!("term already registered: {iri}")));
        }
        self.insert(iri, meta);
        Ok(())
    }

    pub fn meta(&self, iri: &str) -> Option<&TermMeta> {
        self.terms.get(iri)
    }

    /// The composition rule for a term; unregistered terms default to
    /// override.
    pub fn composition(&self, iri: &str) -> Composition {
        self.terms.get(iri).map_or_else(Composition::default, |m| m.composition)
    }

    pub fn validator(&self, iri: &str) -> Option<&Arc<dyn Validator>> {
        self.terms.get(iri).and_then(|m| m.validator.as_ref())
    }

    pub fn term_compiler(&self, iri: &str) -> Option<&Arc<dyn TermCompiler>> {
        self.terms.get(iri).and_then(|m| m.term_compiler.as_ref())
    }

    pub fn node_compiler(&self, iri: &str) -> Option<&Arc<dyn NodeCompiler>> {
        self.terms.get(iri).and_then(|m| m.node_compiler.as_ref())
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }
}
