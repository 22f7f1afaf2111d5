use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::{Context, RenderEvents, Resource, Settings};
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::EvalError;
use crate::ident::Ident;
use crate::value::Value;

/// The base variable store and the root of every scope chain.
///
/// Lookups walk the optional parent link; writes and removals act on this
/// store only. Rendering bookkeeping (name stacks, resource slot,
/// introspection cache, event hooks) lives at the chain root, so a chained
/// store observes the same rendering state as its root.
pub struct BaseContext {
    values: RefCell<FxHashMap<Ident, Value>>,
    parent: Option<Rc<BaseContext>>,
    sink: Rc<dyn DiagnosticSink>,
    settings: Settings,
    template_names: RefCell<Vec<SmolStr>>,
    macro_names: RefCell<Vec<SmolStr>>,
    resource: RefCell<Option<Resource>>,
    icache: RefCell<FxHashMap<usize, Rc<dyn Any>>>,
    event_hooks: RefCell<Option<Rc<dyn RenderEvents>>>,
    render_allowed: Cell<bool>,
}

impl Default for BaseContext {
    fn default() -> Self {
        Self::new(Rc::new(TracingSink))
    }
}

impl BaseContext {
    pub fn new(sink: Rc<dyn DiagnosticSink>) -> Self {
        Self::with_settings(sink, Settings::default())
    }

    pub fn with_settings(sink: Rc<dyn DiagnosticSink>, settings: Settings) -> Self {
        Self {
            values: RefCell::new(FxHashMap::default()),
            parent: None,
            sink,
            settings,
            template_names: RefCell::new(Vec::new()),
            macro_names: RefCell::new(Vec::new()),
            resource: RefCell::new(None),
            icache: RefCell::new(FxHashMap::default()),
            event_hooks: RefCell::new(None),
            render_allowed: Cell::new(true),
        }
    }

    /// A child store chaining to `parent` for lookups. Bookkeeping, sink and
    /// settings stay with the root.
    pub fn chained(parent: Rc<BaseContext>) -> Self {
        Self {
            values: RefCell::new(FxHashMap::default()),
            sink: Rc::clone(&parent.sink),
            settings: parent.settings,
            parent: Some(parent),
            template_names: RefCell::new(Vec::new()),
            macro_names: RefCell::new(Vec::new()),
            resource: RefCell::new(None),
            icache: RefCell::new(FxHashMap::default()),
            event_hooks: RefCell::new(None),
            render_allowed: Cell::new(true),
        }
    }

    fn root(&self) -> &BaseContext {
        match &self.parent {
            Some(parent) => parent.root(),
            None => self,
        }
    }
}

impl fmt::Debug for BaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseContext")
            .field("values", &self.values)
            .field("chained", &self.parent.is_some())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Context for BaseContext {
    fn get(&self, name: Ident) -> Result<Option<Value>, EvalError> {
        if let Some(value) = self.values.borrow().get(&name) {
            return Ok(Some(value.clone()));
        }
        match &self.parent {
            Some(parent) => parent.get(name),
            None => Ok(None),
        }
    }

    fn put(&self, name: Ident, value: Value) -> Result<Option<Value>, EvalError> {
        Ok(self.values.borrow_mut().insert(name, value))
    }

    fn remove(&self, name: Ident) -> Option<Value> {
        self.values.borrow_mut().remove(&name)
    }

    fn contains_key(&self, name: Ident) -> bool {
        self.values.borrow().contains_key(&name)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.contains_key(name))
    }

    fn keys(&self) -> Vec<Ident> {
        self.values.borrow().keys().copied().collect()
    }

    fn base_context(&self) -> &dyn Context {
        self.root()
    }

    fn diagnostics(&self) -> Rc<dyn DiagnosticSink> {
        Rc::clone(&self.sink)
    }

    fn settings(&self) -> Settings {
        self.settings
    }

    fn push_template_name(&self, name: &str) {
        self.root().template_names.borrow_mut().push(SmolStr::new(name));
    }

    fn pop_template_name(&self) {
        self.root().template_names.borrow_mut().pop();
    }

    fn current_template_name(&self) -> Option<SmolStr> {
        self.root().template_names.borrow().last().cloned()
    }

    fn template_name_stack(&self) -> Vec<SmolStr> {
        self.root().template_names.borrow().clone()
    }

    fn push_macro_name(&self, name: &str) {
        self.root().macro_names.borrow_mut().push(SmolStr::new(name));
    }

    fn pop_macro_name(&self) {
        self.root().macro_names.borrow_mut().pop();
    }

    fn current_macro_name(&self) -> Option<SmolStr> {
        self.root().macro_names.borrow().last().cloned()
    }

    fn macro_name_stack(&self) -> Vec<SmolStr> {
        self.root().macro_names.borrow().clone()
    }

    fn macro_call_depth(&self) -> usize {
        self.root().macro_names.borrow().len()
    }

    fn set_current_resource(&self, resource: Option<Resource>) {
        *self.root().resource.borrow_mut() = resource;
    }

    fn current_resource(&self) -> Option<Resource> {
        self.root().resource.borrow().clone()
    }

    fn icache_get(&self, key: usize) -> Option<Rc<dyn Any>> {
        self.root().icache.borrow().get(&key).cloned()
    }

    fn icache_put(&self, key: usize, data: Rc<dyn Any>) {
        self.root().icache.borrow_mut().insert(key, data);
    }

    fn attach_event_hooks(&self, hooks: Rc<dyn RenderEvents>) -> Option<Rc<dyn RenderEvents>> {
        self.root().event_hooks.borrow_mut().replace(hooks)
    }

    fn event_hooks(&self) -> Option<Rc<dyn RenderEvents>> {
        self.root().event_hooks.borrow().clone()
    }

    fn render_allowed(&self) -> bool {
        self.root().render_allowed.get()
    }

    fn set_render_allowed(&self, allowed: bool) {
        self.root().render_allowed.set(allowed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let ctx = BaseContext::default();
        let name = Ident::new("x");

        assert_eq!(ctx.put(name, Value::from(42i64)).unwrap(), None);
        assert_eq!(ctx.get(name).unwrap(), Some(Value::from(42i64)));
        assert_eq!(
            ctx.put(name, Value::from(43i64)).unwrap(),
            Some(Value::from(42i64))
        );
    }

    #[test]
    fn test_get_falls_back_to_parent() {
        let parent = Rc::new(BaseContext::default());
        parent
            .put(Ident::new("outer"), Value::from("up"))
            .unwrap();
        let child = BaseContext::chained(Rc::clone(&parent));
        child.put(Ident::new("inner"), Value::from("down")).unwrap();

        assert_eq!(
            child.get(Ident::new("outer")).unwrap(),
            Some(Value::from("up"))
        );
        assert_eq!(
            child.get(Ident::new("inner")).unwrap(),
            Some(Value::from("down"))
        );
        assert_eq!(parent.get(Ident::new("inner")).unwrap(), None);
    }

    #[test]
    fn test_child_shadows_parent() {
        let parent = Rc::new(BaseContext::default());
        let name = Ident::new("x");
        parent.put(name, Value::from("parent")).unwrap();
        let child = BaseContext::chained(Rc::clone(&parent));
        child.put(name, Value::from("child")).unwrap();

        assert_eq!(child.get(name).unwrap(), Some(Value::from("child")));
        assert_eq!(parent.get(name).unwrap(), Some(Value::from("parent")));
    }

    #[test]
    fn test_remove_acts_on_local_store_only() {
        let parent = Rc::new(BaseContext::default());
        let name = Ident::new("x");
        parent.put(name, Value::from("parent")).unwrap();
        let child = BaseContext::chained(Rc::clone(&parent));

        assert_eq!(child.remove(name), None);
        assert_eq!(parent.get(name).unwrap(), Some(Value::from("parent")));
    }

    #[test]
    fn test_bookkeeping_lives_at_the_root() {
        let root = Rc::new(BaseContext::default());
        let child = BaseContext::chained(Rc::clone(&root));

        child.push_template_name("index.qt");
        child.push_macro_name("header");

        assert_eq!(root.current_template_name(), Some("index.qt".into()));
        assert_eq!(root.current_macro_name(), Some("header".into()));
        assert_eq!(root.macro_call_depth(), 1);

        child.pop_macro_name();
        assert_eq!(root.macro_call_depth(), 0);
    }

    #[test]
    fn test_render_allowed_defaults_on() {
        let ctx = BaseContext::default();
        assert!(ctx.render_allowed());
        ctx.set_render_allowed(false);
        assert!(!ctx.render_allowed());
    }

    #[test]
    fn test_icache_roundtrip() {
        let ctx = BaseContext::default();
        ctx.icache_put(7, Rc::new("cached"));

        let data = ctx.icache_get(7).unwrap();
        assert_eq!(data.downcast_ref::<&str>(), Some(&"cached"));
        assert!(ctx.icache_get(8).is_none());
    }
}
