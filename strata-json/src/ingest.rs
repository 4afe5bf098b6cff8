//! JSON front-end for the ingestion engine.
//!
//! Adapts `serde_json` values to the engine's document tree, keeping
//! object entry order and scalar types, and offers a byte-stream entry
//! point honoring a layer's declared character encoding (UTF-8 when
//! undeclared).

use serde_json::Value;

use strata_core::builder::GraphBuilder;
use strata_core::context::Context;
use strata_core::error::{Error, Result};
use strata_core::graph::NodeId;
use strata_core::ingest::{self, DocValue, ScalarKind};

/// Converts a parsed JSON value into the engine's document tree.
pub fn doc_value(value: &Value) -> DocValue {
    match value {
        Value::Null => DocValue::Null,
        Value::Bool(b) => DocValue::Scalar {
            value: b.to_string(),
            kind: ScalarKind::Boolean,
        },
        Value::Number(n) => DocValue::Scalar {
            value: n.to_string(),
            kind: if n.is_i64() || n.is_u64() {
                ScalarKind::Integer
            } else {
                ScalarKind::Number
            },
        },
        Value::String(s) => DocValue::Scalar {
            value: s.clone(),
            kind: ScalarKind::String,
        },
        Value::Array(items) => DocValue::Array(items.iter().map(doc_value).collect()),
        Value::Object(entries) => DocValue::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), doc_value(v)))
                .collect(),
        ),
    }
}

/// Ingests a parsed JSON value.
pub fn ingest_value(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    base_id: &str,
    schema_root: Option<NodeId>,
    value: &Value,
) -> Result<Option<NodeId>> {
    let doc = doc_value(value);
    ingest::ingest(ctx, builder, base_id, schema_root, &doc)
}

/// Ingests a JSON text.
pub fn ingest_json_str(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    base_id: &str,
    schema_root: Option<NodeId>,
    text: &str,
) -> Result<Option<NodeId>> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::DataIngestion {
            key: base_id.to_string(),
            source: Box::new(Error::Io(format!("bad JSON input: {e}"))),
        })?;
    ingest_value(ctx, builder, base_id, schema_root, &value)
}

/// Ingests raw bytes, decoding them with the declared encoding first.
pub fn ingest_json_bytes(
    ctx: &Context,
    builder: &mut GraphBuilder<'_>,
    base_id: &str,
    schema_root: Option<NodeId>,
    bytes: &[u8],
    encoding: Option<&str>,
) -> Result<Option<NodeId>> {
    let text = decode(bytes, encoding)?;
    ingest_json_str(ctx, builder, base_id, schema_root, &text)
}

/// Decodes input bytes. UTF-8 is the default; UTF-16 in either byte
/// order is accepted when declared.
pub fn decode(bytes: &[u8], encoding: Option<&str>) -> Result<String> {
    let name = encoding.unwrap_or("utf-8").to_ascii_lowercase();
    match name.as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Io(format!("input is not valid UTF-8: {e}"))),
        "utf-16" | "utf-16le" | "utf16" => decode_utf16(bytes, false),
        "utf-16be" => decode_utf16(bytes, true),
        other => Err(Error::Io(format!("unsupported character encoding: {other}"))),
    }
}

fn decode_utf16(bytes: &[u8], big_endian: bool) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Io("odd UTF-16 input length".into()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .collect();
    String::from_utf16(&units).map_err(|e| Error::Io(format!("input is not valid UTF-16: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::builder::GraphBuilderOptions;
    use strata_core::graph::Graph;
    use strata_core::layer::set_node_id;
    use strata_core::property::PropertyValue;
    use strata_core::term::vocab;

    #[test]
    fn adapts_scalar_kinds() {
        let doc = doc_value(&json!({ "a": 1, "b": "x", "c": true, "d": 1.5 }));
        let DocValue::Object(entries) = doc else {
            panic!("not an object");
        };
        let kinds: Vec<ScalarKind> = entries
            .iter()
            .map(|(_, v)| match v {
                DocValue::Scalar { kind, .. } => *kind,
                _ => panic!("not a scalar"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ScalarKind::Integer,
                ScalarKind::String,
                ScalarKind::Boolean,
                ScalarKind::Number
            ]
        );
    }

    #[test]
    fn ingests_json_text() {
        let mut schema = Graph::new();
        let root = schema.new_node([vocab::ATTRIBUTE, vocab::OBJECT]);
        set_node_id(schema.node_mut(root), "root");
        let name = schema.new_node([vocab::ATTRIBUTE, vocab::VALUE]);
        set_node_id(schema.node_mut(name), "root.name");
        schema
            .node_mut(name)
            .set_property(vocab::ATTRIBUTE_NAME, PropertyValue::string("name"));
        schema.new_edge(root, name, vocab::OBJECT_ATTRIBUTES);

        let ctx = Context::new();
        let mut builder = GraphBuilder::new(
            &schema,
            GraphBuilderOptions {
                embed_schema_nodes: true,
                ..Default::default()
            },
        );
        let doc = ingest_json_str(&ctx, &mut builder, "doc", Some(root), r#"{"name":"ada"}"#)
            .unwrap()
            .unwrap();
        let children: Vec<_> = builder
            .graph()
            .out_edges(doc)
            .map(|e| builder.graph().edge(e).to())
            .collect();
        assert_eq!(children.len(), 1);
        assert_eq!(
            builder.graph().node(children[0]).property(vocab::RAW_VALUE),
            Some(&PropertyValue::string("ada"))
        );
    }

    #[test]
    fn decodes_declared_encodings() {
        assert_eq!(decode(b"abc", None).unwrap(), "abc");
        let utf16le: Vec<u8> = "hi".encode_utf16().flat_map(u16::to_le_bytes).collect();
        assert_eq!(decode(&utf16le, Some("utf-16le")).unwrap(), "hi");
        assert!(decode(b"abc", Some("latin-1")).is_err());
    }
}
