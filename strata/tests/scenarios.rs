//! End-to-end scenarios over the public API: compose, compile, ingest,
//! link.

use pretty_assertions::assert_eq;
use strata::ser::layer_from_json_str;
use strata::term::vocab;
use strata::{
    compose, document_entity_info, Compiler, Context, DocValue, Error, GraphBuilder,
    GraphBuilderOptions, Layer, PropertyValue,
};

fn embed_options() -> GraphBuilderOptions {
    GraphBuilderOptions {
        embed_schema_nodes: true,
        ..Default::default()
    }
}

#[test]
fn override_composition() {
    let ctx = Context::new();
    let mut base = layer_from_json_str(
        r#"{
            "@id": "http://base",
            "@type": "Schema",
            "layer": {
                "@id": "http://base#root",
                "@type": "Object",
                "attributes": { "a": { "@type": "Value", "description": "x" } }
            }
        }"#,
    )
    .unwrap();
    let overlay = layer_from_json_str(
        r#"{
            "@id": "http://ovl",
            "@type": "Overlay",
            "layer": {
                "@id": "http://base#root",
                "attributes": { "a": { "@type": "Value", "description": "y" } }
            }
        }"#,
    )
    .unwrap();
    compose(&ctx, &mut base, &overlay).unwrap();
    let a = base.find_attribute_by_id("a").unwrap();
    assert_eq!(
        base.graph().node(a).property(vocab::DESCRIPTION),
        Some(&PropertyValue::string("y"))
    );
}

#[test]
fn composite_flattens_to_object() {
    let ctx = Context::new();
    let mut compiler = Compiler::new(|iri: &str| {
        if iri != "http://c" {
            return Err(Error::NotFound(iri.to_string()));
        }
        layer_from_json_str(
            r#"{
                "@id": "http://c",
                "@type": "Schema",
                "layer": {
                    "@id": "http://c#root",
                    "allOf": [
                        {
                            "@id": "http://c#o1",
                            "attributes": { "x": { "@type": "Value" } }
                        },
                        {
                            "@id": "http://c#o2",
                            "attributes": { "y": { "@type": "Value" } }
                        }
                    ]
                }
            }"#,
        )
    });
    let compiled = compiler.compile(&ctx, "http://c").unwrap();
    let graph = compiler.compiled().graph();
    let root = graph.node(compiled.root);
    assert!(root.has_label(vocab::OBJECT));
    assert!(!root.has_label(vocab::COMPOSITE));
    assert_eq!(
        graph
            .out_edges_with_label(compiled.root, vocab::ALL_OF)
            .count(),
        0
    );
    let mut children: Vec<String> = graph
        .out_edges_with_label(compiled.root, vocab::OBJECT_ATTRIBUTES)
        .map(|e| {
            strata::layer::node_id(graph.node(graph.edge(e).to()))
                .unwrap()
                .to_string()
        })
        .collect();
    children.sort();
    assert_eq!(children, vec!["x", "y"]);
}

fn polymorphic_compiler() -> Compiler<impl Fn(&str) -> strata::Result<Layer>> {
    Compiler::new(|iri: &str| {
        if iri != "http://p" {
            return Err(Error::NotFound(iri.to_string()));
        }
        layer_from_json_str(
            r#"{
                "@id": "http://p",
                "@type": "Schema",
                "layer": {
                    "@id": "http://p#root",
                    "oneOf": [
                        { "@id": "http://p#int", "@type": "Value", "valueType": "integer" },
                        { "@id": "http://p#str", "@type": "Value", "valueType": "string" }
                    ]
                }
            }"#,
        )
    })
}

#[test]
fn polymorphic_ingestion_picks_the_matching_branch() {
    let ctx = Context::new();
    let mut compiler = polymorphic_compiler();
    let compiled = compiler.compile(&ctx, "http://p").unwrap();
    let schema_graph = compiler.compiled().graph();

    let mut builder = GraphBuilder::new(schema_graph, embed_options());
    let node = strata::ingest(
        &ctx,
        &mut builder,
        "doc",
        Some(compiled.root),
        &DocValue::string("hello"),
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        builder.graph().node(node).property(vocab::SCHEMA_NODE_ID),
        Some(&PropertyValue::string("http://p#str"))
    );

    let node = strata::ingest(
        &ctx,
        &mut builder,
        "doc",
        Some(compiled.root),
        &DocValue::integer(42),
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        builder.graph().node(node).property(vocab::SCHEMA_NODE_ID),
        Some(&PropertyValue::string("http://p#int"))
    );

    let err = strata::ingest(
        &ctx,
        &mut builder,
        "doc",
        Some(compiled.root),
        &DocValue::boolean(true),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NoOptionsMatch(_)));
}

#[test]
fn value_ingested_as_ancestor_property() {
    let ctx = Context::new();
    let mut compiler = Compiler::new(|iri: &str| {
        if iri != "http://s4" {
            return Err(Error::NotFound(iri.to_string()));
        }
        layer_from_json_str(
            r#"{
                "@id": "http://s4",
                "@type": "Schema",
                "layer": {
                    "@id": "root",
                    "@type": "Object",
                    "attributes": {
                        "v": {
                            "@type": "Value",
                            "ingestAs": "property",
                            "asPropertyOf": "root",
                            "propertyName": "tag"
                        }
                    }
                }
            }"#,
        )
    });
    let compiled = compiler.compile(&ctx, "http://s4").unwrap();
    let mut builder = GraphBuilder::new(compiler.compiled().graph(), embed_options());
    let doc = strata::json::ingest_json_str(
        &ctx,
        &mut builder,
        "doc",
        Some(compiled.root),
        r#"{"v":"hi"}"#,
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        builder.graph().node(doc).property("tag"),
        Some(&PropertyValue::string("hi"))
    );
    assert_eq!(builder.graph().out_edges(doc).count(), 0);
}

#[test]
fn mutual_references_compile_and_lose_their_labels() {
    let ctx = Context::new();
    let loader = |iri: &str| match iri {
        "http://a" => layer_from_json_str(
            r#"{
                "@id": "http://a",
                "@type": "Schema",
                "layer": {
                    "@id": "http://a#root",
                    "attributes": { "toB": { "ref": "http://b" } }
                }
            }"#,
        ),
        "http://b" => layer_from_json_str(
            r#"{
                "@id": "http://b",
                "@type": "Schema",
                "layer": {
                    "@id": "http://b#root",
                    "attributes": { "toA": { "ref": "http://a" } }
                }
            }"#,
        ),
        other => Err(Error::NotFound(other.to_string())),
    };
    let mut compiler = Compiler::new(loader);
    let compiled = compiler.compile(&ctx, "http://a").unwrap();
    let graph = compiler.compiled().graph();
    for node in strata::layer::attribute_nodes(graph, compiled.root) {
        assert!(
            !graph.node(node).has_label(vocab::REFERENCE),
            "reference label left on {:?}",
            strata::layer::node_id(graph.node(node))
        );
    }
    assert!(compiler.compiled().schema("http://b").is_some());
}

#[test]
fn foreign_key_link_draws_an_edge_between_entity_roots() {
    let ctx = Context::new();
    let loader = |iri: &str| match iri {
        "http://person" => layer_from_json_str(
            r#"{
                "@id": "http://person",
                "@type": "Schema",
                "layer": {
                    "@id": "http://person#root",
                    "@type": "Object",
                    "entityIdFields": "http://person#id",
                    "attributes": {
                        "http://person#id": { "@type": "Value", "attributeName": "id" }
                    }
                }
            }"#,
        ),
        "http://order" => layer_from_json_str(
            r#"{
                "@id": "http://order",
                "@type": "Schema",
                "layer": {
                    "@id": "http://order#root",
                    "@type": "Object",
                    "attributes": {
                        "http://order#personId": {
                            "ref": "http://person",
                            "attributeName": "personId",
                            "fk": "http://order#personId",
                            "linkLabel": "orderedBy",
                            "forward": true,
                            "ingestAs": "edge"
                        }
                    }
                }
            }"#,
        ),
        other => Err(Error::NotFound(other.to_string())),
    };
    let mut compiler = Compiler::new(loader);
    let person = compiler.compile(&ctx, "http://person").unwrap();
    let order = compiler.compile(&ctx, "http://order").unwrap();

    let mut builder = GraphBuilder::new(compiler.compiled().graph(), embed_options());
    let person_root = strata::json::ingest_json_str(
        &ctx,
        &mut builder,
        "person",
        Some(person.root),
        r#"{"id":"1"}"#,
    )
    .unwrap()
    .unwrap();
    let order_root = strata::json::ingest_json_str(
        &ctx,
        &mut builder,
        "order",
        Some(order.root),
        r#"{"personId":"1"}"#,
    )
    .unwrap()
    .unwrap();

    assert_eq!(
        builder.graph().node(person_root).property(vocab::ENTITY_ID),
        Some(&PropertyValue::string("1"))
    );

    let info = document_entity_info(builder.graph());
    builder.link_nodes(&ctx, &info).unwrap();

    let links: Vec<_> = builder
        .graph()
        .out_edges_with_label(order_root, "orderedBy")
        .map(|e| builder.graph().edge(e).to())
        .collect();
    assert_eq!(links, vec![person_root]);
    // Both endpoints are entity roots.
    for endpoint in [order_root, person_root] {
        assert!(builder
            .graph()
            .node(endpoint)
            .property(vocab::ENTITY_SCHEMA)
            .is_some());
    }
}
