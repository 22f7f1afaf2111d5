use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::context::Context;
use crate::error::EvalError;
use crate::ident::Ident;
use crate::number::Number;
use crate::range::Range;
use crate::value::Value;

pub type Args = Vec<Rc<Node>>;

/// One parsed expression together with the source coordinates it came from.
#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub range: Range,
    pub expr: Rc<Expr>,
}

#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// One step of a reference chain: `.name` or `[index]`.
#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Property(Ident),
    Index(Rc<Node>),
}

/// A `$root.a[0]` style reference: a root name plus an accessor chain.
///
/// This is the write-through handle of the scope machinery. `execute` reads
/// through the chain against a scope; `set_value` patches the addressed slot
/// and writes the root back, so a macro argument bound to a reference acts as
/// a live alias into the caller's state rather than a snapshot.
#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub root: Ident,
    pub path: SmallVec<[Accessor; 2]>,
}

#[cfg_attr(feature = "ast-json", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Reference(Reference),
    /// Interpolated string: text and reference segments, pre-split by the
    /// parser.
    StringLiteral(Args),
    /// `[n..m]`, inclusive at both ends, ascending or descending.
    IntegerRange(Rc<Node>, Rc<Node>),
    ArrayLiteral(Args),
    MapLiteral(Vec<(Rc<Node>, Rc<Node>)>),
    /// Raw template text.
    Text(SmolStr),
    Number(Number),
    Bool(bool),
    Binary(BinaryOp, Rc<Node>, Rc<Node>),
    Unary(UnaryOp, Rc<Node>),
}

impl Reference {
    pub fn new(root: Ident) -> Self {
        Self {
            root,
            path: SmallVec::new(),
        }
    }

    pub fn property(mut self, name: Ident) -> Self {
        self.path.push(Accessor::Property(name));
        self
    }

    pub fn index(mut self, index: Node) -> Self {
        self.path.push(Accessor::Index(Rc::new(index)));
        self
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Reads through the accessor chain against `ctx`. Property misses and
    /// traversal into a non-container degrade to no value; index failures
    /// stop evaluation.
    pub fn execute(&self, ctx: &dyn Context) -> Result<Option<Value>, EvalError> {
        let Some(mut current) = ctx.get(self.root)? else {
            return Ok(None);
        };

        for accessor in &self.path {
            current = match accessor {
                Accessor::Property(name) => match current {
                    Value::Map(mut map) => match map.remove(name) {
                        Some(value) => value,
                        None => {
                            ctx.diagnostics()
                                .debug(&format!("{self} does not contain \"{name}\""));
                            return Ok(None);
                        }
                    },
                    other => {
                        ctx.diagnostics().debug(&format!(
                            "cannot read \"{name}\" from a {} value in {self}",
                            other.type_name()
                        ));
                        return Ok(None);
                    }
                },
                Accessor::Index(index) => {
                    let idx = index.index_value(ctx)?;
                    match current {
                        Value::Array(mut items) => {
                            if idx < 0 || idx as usize >= items.len() {
                                return Err(EvalError::IndexOutOfBounds(
                                    index.range.clone(),
                                    Number::from(idx),
                                ));
                            }
                            items.swap_remove(idx as usize)
                        }
                        other => {
                            ctx.diagnostics().debug(&format!(
                                "cannot index into a {} value in {self}",
                                other.type_name()
                            ));
                            return Ok(None);
                        }
                    }
                }
            };
        }

        Ok(Some(current))
    }

    /// Writes `value` through the accessor chain against `ctx`. A bare
    /// reference puts the root name directly; a chain reads the root,
    /// patches the addressed slot and writes the root back. Missing
    /// intermediate steps degrade with a diagnostic.
    pub fn set_value(&self, ctx: &dyn Context, value: Value) -> Result<(), EvalError> {
        if self.path.is_empty() {
            ctx.put(self.root, value)?;
            return Ok(());
        }

        let Some(mut root_value) = ctx.get(self.root)? else {
            ctx.diagnostics().error(&format!(
                "cannot write through {self}: \"${}\" has no value",
                self.root
            ));
            return Ok(());
        };
        let Some((last, walk)) = self.path.split_last() else {
            return Ok(());
        };

        let mut slot = &mut root_value;
        for accessor in walk {
            slot = match accessor {
                Accessor::Property(name) => match slot {
                    Value::Map(map) => match map.get_mut(name) {
                        Some(next) => next,
                        None => {
                            ctx.diagnostics().error(&format!(
                                "cannot write through {self}: \"{name}\" is missing"
                            ));
                            return Ok(());
                        }
                    },
                    other => {
                        ctx.diagnostics().error(&format!(
                            "cannot write through {self}: found a {} value at \"{name}\"",
                            other.type_name()
                        ));
                        return Ok(());
                    }
                },
                Accessor::Index(index) => {
                    let idx = index.index_value(ctx)?;
                    match slot {
                        Value::Array(items) => {
                            if idx < 0 || idx as usize >= items.len() {
                                return Err(EvalError::IndexOutOfBounds(
                                    index.range.clone(),
                                    Number::from(idx),
                                ));
                            }
                            &mut items[idx as usize]
                        }
                        other => {
                            ctx.diagnostics().error(&format!(
                                "cannot write through {self}: cannot index into a {} value",
                                other.type_name()
                            ));
                            return Ok(());
                        }
                    }
                }
            };
        }

        match last {
            Accessor::Property(name) => match slot {
                Value::Map(map) => {
                    map.insert(*name, value);
                }
                other => {
                    ctx.diagnostics().error(&format!(
                        "cannot write through {self}: found a {} value at \"{name}\"",
                        other.type_name()
                    ));
                    return Ok(());
                }
            },
            Accessor::Index(index) => {
                let idx = index.index_value(ctx)?;
                match slot {
                    Value::Array(items) => {
                        if idx < 0 || idx as usize >= items.len() {
                            return Err(EvalError::IndexOutOfBounds(
                                index.range.clone(),
                                Number::from(idx),
                            ));
                        }
                        items[idx as usize] = value;
                    }
                    other => {
                        ctx.diagnostics().error(&format!(
                            "cannot write through {self}: cannot index into a {} value",
                            other.type_name()
                        ));
                        return Ok(());
                    }
                }
            }
        }

        ctx.put(self.root, root_value)?;
        Ok(())
    }
}

fn truthy(value: &Option<Value>) -> bool {
    value.as_ref().is_some_and(Value::is_truthy)
}

fn where_at(ctx: &dyn Context, range: &Range) -> String {
    let template = ctx
        .current_template_name()
        .unwrap_or_else(|| SmolStr::new("<input>"));
    format!("{template} {range}")
}

impl Node {
    pub fn new(expr: Expr) -> Self {
        Self {
            range: Range::default(),
            expr: Rc::new(expr),
        }
    }

    pub fn with_range(range: Range, expr: Expr) -> Self {
        Self {
            range,
            expr: Rc::new(expr),
        }
    }

    /// Evaluates this expression against `ctx`. `Ok(None)` is the degraded
    /// "no value" outcome; `Err` is a must-stop failure.
    pub fn value(&self, ctx: &dyn Context) -> Result<Option<Value>, EvalError> {
        match &*self.expr {
            Expr::Number(n) => Ok(Some(Value::Number(*n))),
            Expr::Bool(b) => Ok(Some(Value::Bool(*b))),
            Expr::Text(text) => Ok(Some(Value::String(text.to_string()))),
            Expr::Reference(reference) => reference.execute(ctx),
            Expr::StringLiteral(segments) => {
                let mut out = String::new();
                for segment in segments {
                    segment.render(ctx, &mut out)?;
                }
                Ok(Some(Value::String(out)))
            }
            Expr::ArrayLiteral(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.value(ctx)?.unwrap_or_default());
                }
                Ok(Some(Value::Array(values)))
            }
            Expr::MapLiteral(entries) => {
                let mut map = BTreeMap::new();
                for (key, entry) in entries {
                    let key = match key.value(ctx)? {
                        Some(Value::String(s)) => Ident::new(&s),
                        other => {
                            return Err(EvalError::InvalidMapKey(
                                key.range.clone(),
                                SmolStr::new(
                                    other.map_or_else(|| key.to_string(), |v| v.to_string()),
                                ),
                            ));
                        }
                    };
                    map.insert(key, entry.value(ctx)?.unwrap_or_default());
                }
                Ok(Some(Value::Map(map)))
            }
            Expr::IntegerRange(from, to) => self.integer_range(from, to, ctx),
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs, ctx),
            Expr::Unary(op, operand) => self.unary(*op, operand, ctx),
        }
    }

    /// Appends this node's rendering to `out`. Honors the scope's
    /// render-allowed flag and routes reference insertions through any
    /// attached event hooks.
    pub fn render(&self, ctx: &dyn Context, out: &mut String) -> Result<(), EvalError> {
        if !ctx.render_allowed() {
            return Ok(());
        }

        match &*self.expr {
            Expr::Text(text) => {
                out.push_str(text);
                Ok(())
            }
            Expr::Reference(reference) => match reference.execute(ctx)? {
                Some(value) => {
                    let value = match ctx.event_hooks() {
                        Some(hooks) => hooks.reference_insert(&reference.to_string(), value),
                        None => value,
                    };
                    out.push_str(&value.to_string());
                    Ok(())
                }
                None => {
                    if ctx.settings().preserve_literals {
                        let alias = reference.root.literal_alias();
                        if let Some(Value::String(literal)) = ctx.get(alias)? {
                            out.push_str(&literal);
                            return Ok(());
                        }
                    }
                    out.push_str(&reference.to_string());
                    Ok(())
                }
            },
            _ => {
                if let Some(value) = self.value(ctx)? {
                    out.push_str(&value.to_string());
                }
                Ok(())
            }
        }
    }

    fn index_value(&self, ctx: &dyn Context) -> Result<i64, EvalError> {
        match self.value(ctx)? {
            Some(Value::Number(n)) if n.is_int() => Ok(n.to_int()),
            Some(other) => Err(EvalError::InvalidIndex(
                self.range.clone(),
                SmolStr::new(other.to_string()),
            )),
            None => Err(EvalError::InvalidIndex(
                self.range.clone(),
                SmolStr::new(self.to_string()),
            )),
        }
    }

    fn integer_range(
        &self,
        from: &Rc<Node>,
        to: &Rc<Node>,
        ctx: &dyn Context,
    ) -> Result<Option<Value>, EvalError> {
        let left = from.value(ctx)?;
        let right = to.value(ctx)?;

        if left.is_none() || right.is_none() {
            let side = if left.is_none() { "left" } else { "right" };
            ctx.diagnostics().error(&format!(
                "{side} side of range operator [n..m] has no value in {}",
                where_at(ctx, &self.range)
            ));
            return Ok(None);
        }

        match (left, right) {
            (Some(Value::Number(l)), Some(Value::Number(r))) if l.is_int() && r.is_int() => {
                let (l, r) = (l.to_int(), r.to_int());
                let step = if l >= r { -1 } else { 1 };
                let mut values = Vec::with_capacity(l.abs_diff(r) as usize + 1);
                let mut v = l;
                loop {
                    values.push(Value::Number(Number::from(v)));
                    if v == r {
                        break;
                    }
                    v += step;
                }
                Ok(Some(Value::Array(values)))
            }
            (left, _) => {
                let side = if !matches!(&left, Some(Value::Number(n)) if n.is_int()) {
                    "left"
                } else {
                    "right"
                };
                ctx.diagnostics().error(&format!(
                    "{side} side of range operator [n..m] is not an integer in {}",
                    where_at(ctx, &self.range)
                ));
                Ok(None)
            }
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Rc<Node>,
        rhs: &Rc<Node>,
        ctx: &dyn Context,
    ) -> Result<Option<Value>, EvalError> {
        match op {
            BinaryOp::And => {
                if !truthy(&lhs.value(ctx)?) {
                    return Ok(Some(Value::Bool(false)));
                }
                return Ok(Some(Value::Bool(truthy(&rhs.value(ctx)?))));
            }
            BinaryOp::Or => {
                if truthy(&lhs.value(ctx)?) {
                    return Ok(Some(Value::Bool(true)));
                }
                return Ok(Some(Value::Bool(truthy(&rhs.value(ctx)?))));
            }
            _ => {}
        }

        let left = lhs.value(ctx)?;
        let right = rhs.value(ctx)?;
        if left.is_none() || right.is_none() {
            let side = if left.is_none() { "left" } else { "right" };
            ctx.diagnostics().error(&format!(
                "{side} side of \"{}\" has no value in {}",
                op.symbol(),
                where_at(ctx, &self.range)
            ));
            return Ok(None);
        }
        let (Some(left), Some(right)) = (left, right) else {
            return Ok(None);
        };

        match op {
            BinaryOp::Eq => Ok(Some(Value::Bool(left == right))),
            BinaryOp::Ne => Ok(Some(Value::Bool(left != right))),
            BinaryOp::Add => match (left, right) {
                (Value::Number(a), Value::Number(b)) => Ok(Some(Value::Number(a + b))),
                (Value::String(a), b) => Ok(Some(Value::String(format!("{a}{b}")))),
                (a, Value::String(b)) => Ok(Some(Value::String(format!("{a}{b}")))),
                (a, b) => Err(self.invalid_operands(op, &a, &b)),
            },
            BinaryOp::Sub => self.numeric(op, left, right, |a, b| a - b),
            BinaryOp::Mul => self.numeric(op, left, right, |a, b| a * b),
            BinaryOp::Div | BinaryOp::Mod => match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    if b.is_zero() {
                        return Err(EvalError::ZeroDivision(self.range.clone()));
                    }
                    let result = if op == BinaryOp::Div { a / b } else { a % b };
                    Ok(Some(Value::Number(result)))
                }
                (a, b) => Err(self.invalid_operands(op, &a, &b)),
            },
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (left, right) {
                (Value::Number(a), Value::Number(b)) => {
                    Ok(Some(Value::Bool(compare(op, a.partial_cmp(&b)))))
                }
                (Value::String(a), Value::String(b)) => {
                    Ok(Some(Value::Bool(compare(op, a.partial_cmp(&b)))))
                }
                (a, b) => Err(self.invalid_operands(op, &a, &b)),
            },
            // short-circuited above
            BinaryOp::And | BinaryOp::Or => Ok(None),
        }
    }

    fn numeric(
        &self,
        op: BinaryOp,
        left: Value,
        right: Value,
        apply: impl Fn(Number, Number) -> Number,
    ) -> Result<Option<Value>, EvalError> {
        match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Some(Value::Number(apply(a, b)))),
            (a, b) => Err(self.invalid_operands(op, &a, &b)),
        }
    }

    fn unary(
        &self,
        op: UnaryOp,
        operand: &Rc<Node>,
        ctx: &dyn Context,
    ) -> Result<Option<Value>, EvalError> {
        match op {
            UnaryOp::Not => Ok(Some(Value::Bool(!truthy(&operand.value(ctx)?)))),
            UnaryOp::Neg => match operand.value(ctx)? {
                Some(Value::Number(n)) => Ok(Some(Value::Number(-n))),
                Some(other) => Err(EvalError::InvalidOperands {
                    range: self.range.clone(),
                    op: SmolStr::new("-"),
                    lhs: SmolStr::new(other.type_name()),
                    rhs: SmolStr::new("number"),
                }),
                None => {
                    ctx.diagnostics().error(&format!(
                        "operand of \"-\" has no value in {}",
                        where_at(ctx, &self.range)
                    ));
                    Ok(None)
                }
            },
        }
    }

    fn invalid_operands(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
        EvalError::InvalidOperands {
            range: self.range.clone(),
            op: SmolStr::new(op.symbol()),
            lhs: SmolStr::new(lhs.type_name()),
            rhs: SmolStr::new(rhs.type_name()),
        }
    }
}

fn compare(op: BinaryOp, ordering: Option<Ordering>) -> bool {
    match ordering {
        None => false,
        Some(ordering) => match op {
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::Le => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::Ge => ordering != Ordering::Less,
            _ => false,
        },
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.root)?;
        for accessor in &self.path {
            match accessor {
                Accessor::Property(name) => write!(f, ".{}", name)?,
                Accessor::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

// Reconstructs the literal source form of the expression. The `.literal.`
// argument aliases, the constant-write diagnostic and undefined-reference
// rendering all surface this text.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Reference(reference) => write!(f, "{}", reference),
            Expr::StringLiteral(segments) => {
                write!(f, "\"{}\"", segments.iter().format(""))
            }
            Expr::IntegerRange(from, to) => write!(f, "[{}..{}]", from, to),
            Expr::ArrayLiteral(items) => write!(f, "[{}]", items.iter().format(", ")),
            Expr::MapLiteral(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, value))
                    .join(", ")
            ),
            Expr::Text(text) => write!(f, "{}", text),
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Binary(op, lhs, rhs) => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Expr::Unary(UnaryOp::Not, operand) => write!(f, "!{}", operand),
            Expr::Unary(UnaryOp::Neg, operand) => write!(f, "-{}", operand),
        }
    }
}
