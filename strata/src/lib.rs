//! Layered schemas: compose, compile, ingest.
//!
//! A schema is a labelled property graph: a schema base defines the
//! structural skeleton and overlays decorate it. The
//! [`Compiler`] resolves references and compositions against a pool of
//! loadable layers into a shared [`CompiledGraph`], and the ingestion
//! engine walks input documents beside the compiled schema to produce
//! annotated document graphs, followed by a cross-entity link pass.
//!
//! This crate re-exports the core ([`strata_core`]) and the JSON
//! support crate ([`strata_json`], also available as [`json`]).

pub use strata_core::*;

pub use strata_json as json;
