//! JSON support for strata: the JSON-Schema document-set compiler and
//! entity importer, and the JSON front-end for the ingestion engine.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::result_large_err)]

pub mod import;
pub mod ingest;
pub mod set;

pub use import::{import_entities, import_specs, Entity};
pub use ingest::{doc_value, ingest_json_bytes, ingest_json_str, ingest_value};
pub use set::{BlobLoader, SchemaHandle, SchemaSet};
