//! Core logic and types for strata: layered schemas as labelled
//! property graphs, layer composition and compilation, and
//! schema-directed ingestion of document trees into annotated property
//! graphs.
//!
//! The pipeline shape is: load layers → [`compose`](compose::compose)
//! overlays into a base → [`Compiler`](compile::Compiler) resolves
//! references and compositions into a shared
//! [`CompiledGraph`](compile::CompiledGraph) → the
//! [`ingest`](ingest::ingest) engine walks an input tree beside the
//! compiled schema, emitting a document graph through the
//! [`GraphBuilder`](builder::GraphBuilder) → the link pass resolves
//! cross-entity references.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::result_large_err)]

pub mod builder;
pub mod bundle;
pub mod compile;
pub mod compose;
pub mod context;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod interner;
pub mod layer;
pub mod link;
pub mod property;
pub mod ser;
pub mod term;
pub mod validators;
pub mod valueset;

pub use builder::{GraphBuilder, GraphBuilderOptions};
pub use bundle::{Bundle, BundleSchemaRef, BundleVariant, ImportSpec, JsonSchemaRef};
pub use compile::{CompiledGraph, CompiledSchema, Compiler, LayerLoader};
pub use compose::compose;
pub use context::Context;
pub use error::{Error, Result};
pub use graph::{CompiledValue, Edge, EdgeId, Graph, Node, NodeId};
pub use ingest::{ingest, DocValue, IngestAs, ScalarKind};
pub use interner::Interner;
pub use layer::{AttributeKind, Layer, LayerType};
pub use link::{document_entity_info, EntityInfo, LinkSpec};
pub use property::PropertyValue;
pub use term::{vocab, Composition, TermMeta, TermRegistry, Validator};
pub use valueset::{ValuesetLookupRequest, ValuesetLookupResponse, ValuesetProcessor};
