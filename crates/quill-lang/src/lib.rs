//! Rendering core of the quill template engine.
//!
//! The centerpiece is the macro-argument scope: when a template macro is
//! invoked, each call-site argument is classified once as constant or
//! dynamic. Constants are evaluated immediately and bound by value; dynamic
//! arguments stay live expression nodes that are re-resolved against the
//! caller's scope on every read, and reference-bound arguments are writable
//! back into the caller's scope through the alias.
//!
//! ```rust
//! use std::rc::Rc;
//!
//! use quill_lang::{
//!     BaseContext, Context, Expr, Ident, MacroContext, Node, Reference, Value, literal_name,
//! };
//!
//! let base = BaseContext::default();
//! base.put(Ident::new("bar"), Value::from("x")).unwrap();
//!
//! // #macro(m $foo) ... #m($bar)
//! let scope = MacroContext::new(&base, false);
//! let argument = Rc::new(Node::new(Expr::Reference(Reference::new(Ident::new("bar")))));
//! scope
//!     .add_argument(&base, Ident::new("foo"), literal_name("foo"), argument)
//!     .unwrap();
//!
//! // the parameter reads through the alias...
//! assert_eq!(scope.get(Ident::new("foo")).unwrap(), Some(Value::from("x")));
//!
//! // ...and writing it mutates the caller's state
//! scope.put(Ident::new("foo"), Value::from("y")).unwrap();
//! assert_eq!(base.get(Ident::new("bar")).unwrap(), Some(Value::from("y")));
//! ```
mod ast;
mod context;
mod diagnostics;
mod error;
mod ident;
mod number;
mod range;
mod value;

pub use ast::node::{Accessor, Args, BinaryOp, Expr, Node, Reference, UnaryOp};
pub use context::{
    BaseContext, Context, MacroContext, RenderEvents, Resource, Settings, literal_name,
};
pub use diagnostics::{DiagnosticSink, MemorySink, TracingSink};
pub use error::{Error, EvalError};
pub use ident::Ident;
pub use number::Number;
pub use range::{Position, Range};
pub use value::Value;
