// Scopes a template evaluation resolves names against. The base scope holds
// the variables and the rendering bookkeeping; a macro scope wraps it for the
// duration of one macro activation and routes argument names per their
// classification. Wrapping is composition over a borrowed `next` reference,
// never ownership: a scope chain has the same shape and lifetime as the call
// stack that created it.
use std::any::Any;
use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::diagnostics::DiagnosticSink;
use crate::error::EvalError;
use crate::ident::Ident;
use crate::value::Value;

pub mod base;
pub mod macro_context;

pub use base::BaseContext;
pub use macro_context::{MacroContext, literal_name};

/// Settings shared by every scope in one chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// When a macro argument resolves to no value, render the caller's
    /// literal argument text instead of the body-side reference text.
    pub preserve_literals: bool,
}

/// The template resource currently being rendered, tracked for reload checks
/// and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: SmolStr,
    /// Unix timestamp in milliseconds of the source the resource was parsed
    /// from.
    pub last_modified: u64,
}

/// Hooks an embedder can attach to observe and rewrite reference insertions
/// while a template renders.
pub trait RenderEvents: fmt::Debug {
    /// Called for every reference about to be written to the output; the
    /// returned value is rendered instead.
    fn reference_insert(&self, reference: &str, value: Value) -> Value;
}

/// The capability set every variable scope provides.
///
/// Variable operations may fail with a must-stop [`EvalError`] because a
/// macro scope re-evaluates live argument expressions on access. The
/// bookkeeping operations never fail; wrapping scopes forward them verbatim
/// to the chain root so a wrapped scope substitutes transparently wherever a
/// scope is expected.
pub trait Context: fmt::Debug {
    fn get(&self, name: Ident) -> Result<Option<Value>, EvalError>;

    fn put(&self, name: Ident, value: Value) -> Result<Option<Value>, EvalError>;

    /// Like [`Context::put`], but always binds in the innermost scope
    /// regardless of the configured scope mode. Loop induction variables
    /// must never leak into the caller.
    fn local_put(&self, name: Ident, value: Value) -> Result<Option<Value>, EvalError> {
        self.put(name, value)
    }

    fn remove(&self, name: Ident) -> Option<Value>;

    fn contains_key(&self, name: Ident) -> bool;

    fn keys(&self) -> Vec<Ident>;

    /// The global root of the scope chain.
    fn base_context(&self) -> &dyn Context;

    fn diagnostics(&self) -> Rc<dyn DiagnosticSink>;

    fn settings(&self) -> Settings;

    fn push_template_name(&self, name: &str);
    fn pop_template_name(&self);
    fn current_template_name(&self) -> Option<SmolStr>;
    fn template_name_stack(&self) -> Vec<SmolStr>;

    fn push_macro_name(&self, name: &str);
    fn pop_macro_name(&self);
    fn current_macro_name(&self) -> Option<SmolStr>;
    fn macro_name_stack(&self) -> Vec<SmolStr>;
    fn macro_call_depth(&self) -> usize;

    fn set_current_resource(&self, resource: Option<Resource>);
    fn current_resource(&self) -> Option<Resource>;

    /// Reads a cached introspection result keyed by node identity.
    fn icache_get(&self, key: usize) -> Option<Rc<dyn Any>>;
    fn icache_put(&self, key: usize, data: Rc<dyn Any>);

    /// Attaches event hooks to the chain root, returning the previous ones.
    fn attach_event_hooks(&self, hooks: Rc<dyn RenderEvents>) -> Option<Rc<dyn RenderEvents>>;
    fn event_hooks(&self) -> Option<Rc<dyn RenderEvents>>;

    fn render_allowed(&self) -> bool;
    fn set_render_allowed(&self, allowed: bool);
}
