use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::{Context, RenderEvents, Resource, Settings};
use crate::ast::node::{Expr, Node};
use crate::diagnostics::DiagnosticSink;
use crate::error::EvalError;
use crate::ident::Ident;
use crate::value::Value;

/// Key under which a dynamic argument's unevaluated call-site text stays
/// reachable, e.g. `.literal.foo` for parameter `foo`.
pub fn literal_name(param: &str) -> Ident {
    Ident::new(param).literal_alias()
}

/// A value bound directly in the macro's transient scope.
#[derive(Debug, Clone)]
enum LocalSlot {
    Value(Value),
    /// The raw call-site node of a dynamic argument, kept for diagnostics
    /// and literal preservation, never for computation.
    Literal(Rc<Node>),
}

impl LocalSlot {
    fn to_value(&self) -> Value {
        match self {
            LocalSlot::Value(value) => value.clone(),
            LocalSlot::Literal(node) => Value::String(node.to_string()),
        }
    }
}

/// Scope for one macro activation.
///
/// Each call-site argument is classified once at bind time. Constant
/// arguments are evaluated immediately and live in the transient local map.
/// Dynamic arguments stay live nodes: every read re-resolves them against
/// the caller's scope, and writes to reference-bound names mutate the
/// caller's state through the alias. Names that are no argument at all
/// resolve local-first and then against the global root, with the scope-mode
/// flag deciding where writes and removals land.
///
/// The activation borrows the caller's scope and the global root; it owns
/// only its two maps, which die with it.
#[derive(Debug)]
pub struct MacroContext<'a> {
    /// Dynamic argument nodes, routed per kind on every access.
    args: RefCell<FxHashMap<Ident, Rc<Node>>>,
    /// Constant argument values, literal aliases and transient local names.
    locals: RefCell<FxHashMap<Ident, LocalSlot>>,
    /// The caller's scope; argument aliases read and write through it.
    wrapped: &'a dyn Context,
    /// The global root; non-argument fallbacks land there.
    inner: &'a dyn Context,
    /// When set, non-argument writes and removals stay in this activation.
    local_scope: bool,
}

impl<'a> MacroContext<'a> {
    pub fn new(wrapped: &'a dyn Context, local_scope: bool) -> Self {
        Self {
            args: RefCell::new(FxHashMap::default()),
            locals: RefCell::new(FxHashMap::default()),
            inner: wrapped.base_context(),
            wrapped,
            local_scope,
        }
    }

    /// Node kinds that can be evaluated once at bind time and stored by
    /// value. References need live re-evaluation; strings, arrays and maps
    /// may contain nested references; ranges and raw text are call-time
    /// constructs.
    fn is_constant(node: &Node) -> bool {
        !matches!(
            &*node.expr,
            Expr::IntegerRange(..)
                | Expr::Reference(_)
                | Expr::ArrayLiteral(_)
                | Expr::MapLiteral(_)
                | Expr::StringLiteral(_)
                | Expr::Text(_)
        )
    }

    /// Binds one call-site argument under `name` for this activation.
    ///
    /// A constant-classified argument is evaluated against `caller` right
    /// here; an evaluation failure propagates unchanged. A dynamic argument
    /// is recorded as a live node, plus a raw copy under `literal_alias` so
    /// its source text stays reachable.
    pub fn add_argument(
        &self,
        caller: &dyn Context,
        name: Ident,
        literal_alias: Ident,
        node: Rc<Node>,
    ) -> Result<(), EvalError> {
        if Self::is_constant(&node) {
            let value = node.value(caller)?.unwrap_or_default();
            self.locals.borrow_mut().insert(name, LocalSlot::Value(value));
        } else {
            self.args.borrow_mut().insert(name, Rc::clone(&node));
            self.locals
                .borrow_mut()
                .insert(literal_alias, LocalSlot::Literal(node));
        }
        Ok(())
    }

    fn put_routed(
        &self,
        name: Ident,
        value: Value,
        force_local: bool,
    ) -> Result<Option<Value>, EvalError> {
        let bound = self.args.borrow().get(&name).map(Rc::clone);
        if let Some(node) = bound {
            // writes through an argument binding never report a previous value
            match &*node.expr {
                Expr::Reference(reference) if reference.has_path() => {
                    reference.set_value(self.wrapped, value)?;
                }
                Expr::Reference(reference) => {
                    self.wrapped.put(reference.root, value)?;
                }
                _ => {
                    self.diagnostics().error(&format!(
                        "cannot assign a new value to constant macro argument \"{name}\" bound to {node}"
                    ));
                }
            }
            return Ok(None);
        }

        if force_local {
            return Ok(self
                .locals
                .borrow_mut()
                .insert(name, LocalSlot::Value(value))
                .map(|slot| slot.to_value()));
        }

        let mut locals = self.locals.borrow_mut();
        if locals.contains_key(&name) {
            Ok(locals
                .insert(name, LocalSlot::Value(value))
                .map(|slot| slot.to_value()))
        } else {
            drop(locals);
            self.inner.put(name, value)
        }
    }
}

impl Context for MacroContext<'_> {
    fn get(&self, name: Ident) -> Result<Option<Value>, EvalError> {
        let bound = self.args.borrow().get(&name).map(Rc::clone);
        if let Some(node) = bound {
            return match &*node.expr {
                // a multilevel reference is re-resolved on every read so the
                // parameter aliases caller state instead of snapshotting it
                Expr::Reference(reference) if reference.has_path() => {
                    reference.execute(self.wrapped)
                }
                Expr::Reference(reference) => self.wrapped.get(reference.root),
                // throwaway loop-element binding; surface it as its text
                Expr::Text(_) => {
                    let mut out = String::new();
                    node.render(self.wrapped, &mut out)?;
                    Ok(Some(Value::String(out)))
                }
                _ => node.value(self.wrapped),
            };
        }

        if let Some(slot) = self.locals.borrow().get(&name) {
            return Ok(Some(slot.to_value()));
        }
        self.inner.get(name)
    }

    fn put(&self, name: Ident, value: Value) -> Result<Option<Value>, EvalError> {
        self.put_routed(name, value, self.local_scope)
    }

    fn local_put(&self, name: Ident, value: Value) -> Result<Option<Value>, EvalError> {
        self.put_routed(name, value, true)
    }

    fn remove(&self, name: Ident) -> Option<Value> {
        if let Some(node) = self.args.borrow_mut().remove(&name) {
            return Some(Value::String(node.to_string()));
        }

        if self.local_scope {
            return self
                .locals
                .borrow_mut()
                .remove(&name)
                .map(|slot| slot.to_value());
        }

        match self.locals.borrow_mut().remove(&name) {
            Some(slot) => Some(slot.to_value()),
            None => self.inner.remove(name),
        }
    }

    /// Deliberately always false: presence queries are not supported through
    /// a macro scope.
    fn contains_key(&self, _name: Ident) -> bool {
        false
    }

    fn keys(&self) -> Vec<Ident> {
        self.args.borrow().keys().copied().collect()
    }

    fn base_context(&self) -> &dyn Context {
        self.inner.base_context()
    }

    fn diagnostics(&self) -> Rc<dyn DiagnosticSink> {
        self.inner.diagnostics()
    }

    fn settings(&self) -> Settings {
        self.inner.settings()
    }

    fn push_template_name(&self, name: &str) {
        self.inner.push_template_name(name);
    }

    fn pop_template_name(&self) {
        self.inner.pop_template_name();
    }

    fn current_template_name(&self) -> Option<SmolStr> {
        self.inner.current_template_name()
    }

    fn template_name_stack(&self) -> Vec<SmolStr> {
        self.inner.template_name_stack()
    }

    fn push_macro_name(&self, name: &str) {
        self.inner.push_macro_name(name);
    }

    fn pop_macro_name(&self) {
        self.inner.pop_macro_name();
    }

    fn current_macro_name(&self) -> Option<SmolStr> {
        self.inner.current_macro_name()
    }

    fn macro_name_stack(&self) -> Vec<SmolStr> {
        self.inner.macro_name_stack()
    }

    fn macro_call_depth(&self) -> usize {
        self.inner.macro_call_depth()
    }

    fn set_current_resource(&self, resource: Option<Resource>) {
        self.inner.set_current_resource(resource);
    }

    fn current_resource(&self) -> Option<Resource> {
        self.inner.current_resource()
    }

    fn icache_get(&self, key: usize) -> Option<Rc<dyn Any>> {
        self.inner.icache_get(key)
    }

    fn icache_put(&self, key: usize, data: Rc<dyn Any>) {
        self.inner.icache_put(key, data);
    }

    fn attach_event_hooks(&self, hooks: Rc<dyn RenderEvents>) -> Option<Rc<dyn RenderEvents>> {
        self.inner.attach_event_hooks(hooks)
    }

    fn event_hooks(&self) -> Option<Rc<dyn RenderEvents>> {
        self.inner.event_hooks()
    }

    fn render_allowed(&self) -> bool {
        self.inner.render_allowed()
    }

    fn set_render_allowed(&self, allowed: bool) {
        self.inner.set_render_allowed(allowed);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::ast::node::Reference;
    use crate::context::BaseContext;
    use crate::diagnostics::MemorySink;

    fn base_with_sink() -> (Rc<MemorySink>, BaseContext) {
        let sink = Rc::new(MemorySink::new());
        (Rc::clone(&sink), BaseContext::new(sink))
    }

    fn node(expr: Expr) -> Rc<Node> {
        Rc::new(Node::new(expr))
    }

    fn reference(root: &str) -> Rc<Node> {
        node(Expr::Reference(Reference::new(Ident::new(root))))
    }

    fn bind(scope: &MacroContext<'_>, caller: &dyn Context, name: &str, arg: Rc<Node>) {
        scope
            .add_argument(caller, Ident::new(name), literal_name(name), arg)
            .unwrap();
    }

    #[rstest]
    #[case::number(Expr::Number(1i64.into()), true)]
    #[case::bool(Expr::Bool(true), true)]
    #[case::binary(
        Expr::Binary(
            crate::ast::node::BinaryOp::Add,
            node(Expr::Number(1i64.into())),
            node(Expr::Number(2i64.into())),
        ),
        true
    )]
    #[case::reference(Expr::Reference(Reference::new(Ident::new("x"))), false)]
    #[case::string_literal(Expr::StringLiteral(vec![node(Expr::Text("s".into()))]), false)]
    #[case::integer_range(
        Expr::IntegerRange(node(Expr::Number(1i64.into())), node(Expr::Number(2i64.into()))),
        false
    )]
    #[case::array_literal(Expr::ArrayLiteral(vec![]), false)]
    #[case::map_literal(Expr::MapLiteral(vec![]), false)]
    #[case::text(Expr::Text("raw".into()), false)]
    fn test_classification(#[case] expr: Expr, #[case] constant: bool) {
        assert_eq!(MacroContext::is_constant(&Node::new(expr)), constant);
    }

    #[test]
    fn test_constant_argument_is_bound_by_value() {
        let (_, base) = base_with_sink();
        let scope = MacroContext::new(&base, false);
        bind(&scope, &base, "n", node(Expr::Number(5i64.into())));

        assert_eq!(scope.get(Ident::new("n")).unwrap(), Some(Value::from(5i64)));
        // constants are not argument bindings, so they are not in keys()
        assert!(scope.keys().is_empty());
    }

    #[test]
    fn test_dynamic_argument_records_literal_alias() {
        let (_, base) = base_with_sink();
        let scope = MacroContext::new(&base, false);
        bind(&scope, &base, "foo", reference("bar"));

        assert_eq!(scope.keys(), vec![Ident::new("foo")]);
        assert_eq!(
            scope.get(literal_name("foo")).unwrap(),
            Some(Value::from("$bar"))
        );
    }

    #[test]
    fn test_write_to_string_literal_argument_is_rejected() {
        let (sink, base) = base_with_sink();
        let scope = MacroContext::new(&base, false);
        bind(
            &scope,
            &base,
            "foo",
            node(Expr::StringLiteral(vec![node(Expr::Text("hi".into()))])),
        );

        assert_eq!(scope.put(Ident::new("foo"), Value::from("bye")).unwrap(), None);

        assert_eq!(scope.get(Ident::new("foo")).unwrap(), Some(Value::from("hi")));
        let errors = sink.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"foo\""));
        assert!(errors[0].contains("\"hi\""));
    }

    #[test]
    fn test_put_on_unbound_name_honors_scope_mode() {
        let (_, base) = base_with_sink();

        let global = MacroContext::new(&base, false);
        global.put(Ident::new("a"), Value::from(1i64)).unwrap();
        assert_eq!(base.get(Ident::new("a")).unwrap(), Some(Value::from(1i64)));

        let local = MacroContext::new(&base, true);
        local.put(Ident::new("b"), Value::from(2i64)).unwrap();
        assert_eq!(base.get(Ident::new("b")).unwrap(), None);
        assert_eq!(local.get(Ident::new("b")).unwrap(), Some(Value::from(2i64)));
    }

    #[test]
    fn test_put_overwrites_where_it_would_read() {
        let (_, base) = base_with_sink();
        let scope = MacroContext::new(&base, false);
        // a local name exists (e.g. from an earlier local_put); global mode
        // still overwrites it locally instead of leaking to the base
        scope.local_put(Ident::new("i"), Value::from(0i64)).unwrap();
        let previous = scope.put(Ident::new("i"), Value::from(1i64)).unwrap();

        assert_eq!(previous, Some(Value::from(0i64)));
        assert_eq!(base.get(Ident::new("i")).unwrap(), None);
        assert_eq!(scope.get(Ident::new("i")).unwrap(), Some(Value::from(1i64)));
    }

    #[test]
    fn test_remove_clears_argument_binding() {
        let (_, base) = base_with_sink();
        base.put(Ident::new("foo"), Value::from("base value")).unwrap();
        let scope = MacroContext::new(&base, false);
        bind(&scope, &base, "foo", reference("bar"));

        assert_eq!(scope.remove(Ident::new("foo")), Some(Value::from("$bar")));
        // falls through to base resolution afterwards
        assert_eq!(
            scope.get(Ident::new("foo")).unwrap(),
            Some(Value::from("base value"))
        );
    }

    #[test]
    fn test_remove_honors_scope_mode_for_unbound_names() {
        let (_, base) = base_with_sink();
        base.put(Ident::new("x"), Value::from("global")).unwrap();

        let local = MacroContext::new(&base, true);
        assert_eq!(local.remove(Ident::new("x")), None);
        assert_eq!(base.get(Ident::new("x")).unwrap(), Some(Value::from("global")));

        let global = MacroContext::new(&base, false);
        assert_eq!(global.remove(Ident::new("x")), Some(Value::from("global")));
        assert_eq!(base.get(Ident::new("x")).unwrap(), None);
    }

    #[test]
    fn test_contains_key_is_always_false() {
        let (_, base) = base_with_sink();
        base.put(Ident::new("x"), Value::from(1i64)).unwrap();
        let scope = MacroContext::new(&base, false);
        bind(&scope, &base, "foo", reference("x"));

        // documented quirk: even resolvable keys report absent
        assert!(!scope.contains_key(Ident::new("x")));
        assert!(!scope.contains_key(Ident::new("foo")));
        assert!(scope.get(Ident::new("foo")).unwrap().is_some());
    }

    #[test]
    fn test_classification_happens_once_at_bind_time() {
        let (_, base) = base_with_sink();
        base.put(Ident::new("n"), Value::from(1i64)).unwrap();
        let scope = MacroContext::new(&base, false);
        // constant argument evaluated at bind: $n + 1 == 2
        bind(
            &scope,
            &base,
            "snapshot",
            node(Expr::Binary(
                crate::ast::node::BinaryOp::Add,
                reference("n"),
                node(Expr::Number(1i64.into())),
            )),
        );

        base.put(Ident::new("n"), Value::from(10i64)).unwrap();
        assert_eq!(
            scope.get(Ident::new("snapshot")).unwrap(),
            Some(Value::from(2i64))
        );
    }
}
