use std::rc::Rc;

use quill_lang::{
    BaseContext, Context, Expr, Ident, MacroContext, Node, Reference, Value, literal_name,
};

fn main() {
    divan::main();
}

#[divan::bench]
fn get_through_bare_alias() -> Option<Value> {
    let base = BaseContext::default();
    base.put(Ident::new("bar"), Value::from("x")).unwrap();
    let scope = MacroContext::new(&base, false);
    scope
        .add_argument(
            &base,
            Ident::new("foo"),
            literal_name("foo"),
            Rc::new(Node::new(Expr::Reference(Reference::new(Ident::new("bar"))))),
        )
        .unwrap();

    let mut value = None;
    for _ in 0..1_000 {
        value = scope.get(Ident::new("foo")).unwrap();
    }
    value
}

#[divan::bench]
fn get_constant_binding() -> Option<Value> {
    let base = BaseContext::default();
    let scope = MacroContext::new(&base, false);
    scope
        .add_argument(
            &base,
            Ident::new("n"),
            literal_name("n"),
            Rc::new(Node::new(Expr::Number(42i64.into()))),
        )
        .unwrap();

    let mut value = None;
    for _ in 0..1_000 {
        value = scope.get(Ident::new("n")).unwrap();
    }
    value
}

#[divan::bench]
fn integer_range_expansion() -> Option<Value> {
    let base = BaseContext::default();
    let range = Node::new(Expr::IntegerRange(
        Rc::new(Node::new(Expr::Number(1i64.into()))),
        Rc::new(Node::new(Expr::Number(100i64.into()))),
    ));

    range.value(&base).unwrap()
}
