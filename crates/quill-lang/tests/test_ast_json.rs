#![cfg(feature = "ast-json")]
use std::collections::BTreeMap;

use quill_lang::{Expr, Ident, Node, Reference, Value};

#[test]
fn test_node_json_roundtrip() {
    let node = Node::new(Expr::Reference(
        Reference::new(Ident::new("bar"))
            .property(Ident::new("x"))
            .index(Node::new(Expr::Number(0i64.into()))),
    ));

    let json = serde_json::to_string(&node).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();

    assert_eq!(back, node);
}

#[test]
fn test_value_json_roundtrip() {
    let mut map = BTreeMap::new();
    map.insert(Ident::new("k"), Value::from(1i64));
    let value = Value::Array(vec![Value::from("a"), Value::Map(map), Value::None]);

    let json = serde_json::to_string(&value).unwrap();
    let back: Value = serde_json::from_str(&json).unwrap();

    assert_eq!(back, value);
}
