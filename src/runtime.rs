//! Loaded views.
//!
//! A [`ViewType`] is the executable result of a successful backend compile. It
//! is immutable and shared; every [`ViewInstance::render`] call owns its output
//! sink and data scope, so one type can render on many threads at once.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use ulid::Ulid;

use crate::error::RenderError;
use crate::expr::{to_output_text, BinaryOp, Expr, UnaryOp};
use crate::node::Position;
use crate::settings::NullBehaviour;
use crate::types::{BaseTypeCatalog, TypeRef};

/// Deepest macro or accessor nesting a render may reach.
pub const MAX_CALL_DEPTH: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// PROGRAM
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub(crate) struct CompiledExpr {
    pub code: String,
    pub expr: Expr,
    pub position: Option<Position>,
}

#[derive(Debug, Clone)]
pub(crate) enum Guard {
    Expr(CompiledExpr),
    Once(String),
    Always,
}

#[derive(Debug, Clone)]
pub(crate) enum Op {
    Write(String),
    Emit {
        expr: CompiledExpr,
        silent: bool,
        encode: bool,
    },
    Local {
        name: String,
        value: CompiledExpr,
    },
    /// One conditional chain; the first arm whose guard holds runs.
    Branches(Vec<(Guard, Vec<Op>)>),
    ForEach {
        variable: String,
        collection: CompiledExpr,
        body: Vec<Op>,
    },
    Block(Vec<Op>),
    /// Appends the body's output to a content slot.
    Capture {
        name: String,
        body: Vec<Op>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    pub params: Vec<String>,
    pub body: Vec<Op>,
}

#[derive(Debug, Clone)]
pub(crate) struct ViewDataSlot {
    pub key: String,
    pub default: Option<CompiledExpr>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Program {
    pub levels: Vec<Vec<Op>>,
    pub globals: Vec<(String, CompiledExpr)>,
    pub view_data: BTreeMap<String, ViewDataSlot>,
    pub model_alias: Option<String>,
    pub accessors: BTreeMap<String, CompiledExpr>,
    pub macros: BTreeMap<String, MacroDef>,
    pub null_behaviour: NullBehaviour,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW TYPE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub struct ViewType {
    pub(crate) name: String,
    pub(crate) namespace: Option<String>,
    pub(crate) view_id: Ulid,
    pub(crate) base_type: TypeRef,
    pub(crate) catalog: BaseTypeCatalog,
    pub(crate) modules: Vec<String>,
    pub(crate) program: Program,
}

impl ViewType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }

    pub fn generated_view_id(&self) -> Ulid {
        self.view_id
    }

    pub fn base_type(&self) -> &TypeRef {
        &self.base_type
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn render_levels(&self) -> usize {
        self.program.levels.len()
    }

    /// True when an instance can be used as `type_text`: the view type itself
    /// or any type on its closed base-type ancestry.
    pub fn is_instance_of(&self, type_text: &str) -> bool {
        let text = type_text.trim();
        if text == self.name || text == self.full_name() {
            return true;
        }
        match TypeRef::parse(text) {
            Some(candidate) => self.catalog.is_instance_of(&self.base_type, &candidate),
            None => false,
        }
    }

    pub fn create_instance(self: &Arc<Self>) -> ViewInstance {
        ViewInstance::new(Arc::clone(self))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VIEW INSTANCE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ViewInstance {
    view_type: Arc<ViewType>,
    pub view_data: Map<String, Value>,
    pub model: Value,
    pub site_root: String,
    /// Named content slots visible to every level before rendering starts.
    pub content: BTreeMap<String, String>,
}

impl ViewInstance {
    pub fn new(view_type: Arc<ViewType>) -> Self {
        Self {
            view_type,
            view_data: Map::new(),
            model: Value::Null,
            site_root: String::new(),
            content: BTreeMap::new(),
        }
    }

    pub fn with_view_data(mut self, key: &str, value: Value) -> Self {
        self.view_data.insert(key.to_string(), value);
        self
    }

    pub fn with_model(mut self, model: Value) -> Self {
        self.model = model;
        self
    }

    pub fn with_site_root(mut self, site_root: impl Into<String>) -> Self {
        self.site_root = site_root.into();
        self
    }

    pub fn view_type(&self) -> &Arc<ViewType> {
        &self.view_type
    }

    pub fn generated_view_id(&self) -> Ulid {
        self.view_type.view_id
    }

    pub fn is_instance_of(&self, type_text: &str) -> bool {
        self.view_type.is_instance_of(type_text)
    }

    /// Runs every render level, innermost first. Each level but the last is
    /// captured into the `view` content slot.
    pub fn render(&self) -> Result<String, RenderError> {
        let program = &self.view_type.program;
        let mut state = RenderState::new(self, program);
        state.initialize_globals()?;

        let mut output = String::new();
        let levels = program.levels.len();
        for (index, level) in program.levels.iter().enumerate() {
            let mut captured = String::new();
            state.frames = vec![BTreeMap::new()];
            state.run(level, &mut captured)?;
            if index + 1 < levels {
                state.content.insert("view".to_string(), captured);
            } else {
                output = captured;
            }
        }
        Ok(output)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVALUATION
// ═══════════════════════════════════════════════════════════════════════════════

struct RenderState<'a> {
    instance: &'a ViewInstance,
    program: &'a Program,
    content: BTreeMap<String, String>,
    once: HashSet<String>,
    globals: BTreeMap<String, Value>,
    frames: Vec<BTreeMap<String, Value>>,
    depth: usize,
}

impl<'a> RenderState<'a> {
    fn new(instance: &'a ViewInstance, program: &'a Program) -> Self {
        Self {
            instance,
            program,
            content: instance.content.clone(),
            once: HashSet::new(),
            globals: BTreeMap::new(),
            frames: Vec::new(),
            depth: 0,
        }
    }

    fn initialize_globals(&mut self) -> Result<(), RenderError> {
        let program = self.program;
        for (name, value) in &program.globals {
            let value = self.eval(value)?;
            self.globals.insert(name.clone(), value);
        }
        Ok(())
    }

    fn run(&mut self, ops: &'a [Op], out: &mut String) -> Result<(), RenderError> {
        for op in ops {
            match op {
                Op::Write(text) => out.push_str(text),
                Op::Emit { expr, silent, encode } => match self.eval(expr) {
                    Ok(value) => {
                        let text = to_output_text(&value);
                        if *encode {
                            out.push_str(&html_encode(&text));
                        } else {
                            out.push_str(&text);
                        }
                    }
                    Err(RenderError::NullReference { .. })
                        if *silent || self.program.null_behaviour == NullBehaviour::Lenient => {}
                    Err(error) => return Err(error),
                },
                Op::Local { name, value } => {
                    let value = self.eval(value)?;
                    if let Some(frame) = self.frames.last_mut() {
                        frame.insert(name.clone(), value);
                    }
                }
                Op::Branches(arms) => {
                    for (guard, body) in arms {
                        let taken = match guard {
                            Guard::Always => true,
                            Guard::Once(key) => self.once.insert(key.clone()),
                            Guard::Expr(condition) => truthy(&self.eval(condition)?),
                        };
                        if taken {
                            self.scoped(BTreeMap::new(), body, out)?;
                            break;
                        }
                    }
                }
                Op::ForEach { variable, collection, body } => {
                    let items = self.iterate(collection)?;
                    let count = items.len();
                    for (index, item) in items.into_iter().enumerate() {
                        let mut frame = BTreeMap::new();
                        frame.insert(variable.clone(), item);
                        frame.insert(format!("{}Index", variable), Value::from(index));
                        frame.insert(format!("{}Count", variable), Value::from(count));
                        frame.insert(format!("{}IsFirst", variable), Value::Bool(index == 0));
                        frame.insert(format!("{}IsLast", variable), Value::Bool(index + 1 == count));
                        self.scoped(frame, body, out)?;
                    }
                }
                Op::Block(body) => self.scoped(BTreeMap::new(), body, out)?,
                Op::Capture { name, body } => {
                    let mut captured = String::new();
                    self.scoped(BTreeMap::new(), body, &mut captured)?;
                    self.content.entry(name.clone()).or_default().push_str(&captured);
                }
            }
        }
        Ok(())
    }

    fn scoped(&mut self, frame: BTreeMap<String, Value>, body: &'a [Op], out: &mut String) -> Result<(), RenderError> {
        self.frames.push(frame);
        let result = self.run(body, out);
        self.frames.pop();
        result
    }

    fn iterate(&mut self, collection: &CompiledExpr) -> Result<Vec<Value>, RenderError> {
        match self.eval(collection)? {
            Value::Array(items) => Ok(items),
            Value::Object(map) => Ok(map.into_iter().map(|(_, v)| v).collect()),
            Value::String(text) => Ok(text.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Null => Err(RenderError::NullReference {
                expression: collection.code.clone(),
                member: "each".to_string(),
                position: collection.position.clone(),
            }),
            other => Err(type_error(collection, format!("{} cannot be iterated", kind_of(&other)))),
        }
    }

    fn eval(&mut self, compiled: &CompiledExpr) -> Result<Value, RenderError> {
        self.eval_expr(&compiled.expr, compiled)
    }

    fn eval_expr(&mut self, expr: &Expr, source: &CompiledExpr) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval_expr(item, source))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Ident(name) => self.lookup(name),
            Expr::Member(target, member) => {
                let target = self.eval_expr(target, source)?;
                member_of(target, member, source)
            }
            Expr::Index(target, index) => {
                let target = self.eval_expr(target, source)?;
                let index = self.eval_expr(index, source)?;
                index_of(target, index, source)
            }
            Expr::Call(callee, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg, source))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, args, source)
            }
            Expr::Unary(op, inner) => {
                let value = self.eval_expr(inner, source)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => match Num::of(&value) {
                        Some(Num::Int(i)) => Ok(i.checked_neg().map(Value::from).unwrap_or_else(|| Num::Float(-(i as f64)).into_value())),
                        Some(Num::Float(f)) => Ok(Num::Float(-f).into_value()),
                        None => Err(type_error(source, format!("cannot negate {}", kind_of(&value)))),
                    },
                }
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                if !truthy(&self.eval_expr(left, source)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&self.eval_expr(right, source)?)))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if truthy(&self.eval_expr(left, source)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&self.eval_expr(right, source)?)))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval_expr(left, source)?;
                let right = self.eval_expr(right, source)?;
                binary(*op, &left, &right, source)
            }
        }
    }

    fn lookup(&mut self, name: &str) -> Result<Value, RenderError> {
        for frame in self.frames.iter().rev() {
            if let Some(value) = frame.get(name) {
                return Ok(value.clone());
            }
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        let program = self.program;
        if let Some(slot) = program.view_data.get(name) {
            let value = lookup_path(&self.instance.view_data, &slot.key);
            if let (Value::Null, Some(default)) = (&value, &slot.default) {
                return self.class_level(name, default);
            }
            return Ok(value);
        }
        if program.model_alias.as_deref() == Some(name) {
            return Ok(self.instance.model.clone());
        }
        if let Some(accessor) = program.accessors.get(name) {
            return self.class_level(name, accessor);
        }
        Ok(match name {
            "Model" => self.instance.model.clone(),
            "SiteRoot" => Value::String(self.instance.site_root.clone()),
            "ViewData" => Value::Object(self.instance.view_data.clone()),
            "Content" => Value::Object(
                self.content
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            _ => Value::Null,
        })
    }

    /// Evaluates a class-level expression, which sees no render locals.
    fn class_level(&mut self, name: &str, expr: &CompiledExpr) -> Result<Value, RenderError> {
        self.enter(name)?;
        let frames = std::mem::take(&mut self.frames);
        let result = self.eval(expr);
        self.frames = frames;
        self.depth -= 1;
        result
    }

    fn enter(&mut self, name: &str) -> Result<(), RenderError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RenderError::RecursionLimit {
                name: name.to_string(),
                limit: MAX_CALL_DEPTH,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn call(&mut self, callee: &Expr, args: Vec<Value>, source: &CompiledExpr) -> Result<Value, RenderError> {
        match callee {
            Expr::Ident(name) if name == "H" => {
                let text = args.first().map(to_output_text).unwrap_or_default();
                Ok(Value::String(html_encode(&text)))
            }
            Expr::Ident(name) if self.program.macros.contains_key(name) => self.call_macro(name, args),
            Expr::Member(target, member) if member == "Eval" => {
                let target = self.eval_expr(target, source)?;
                let key = args.first().map(to_output_text).unwrap_or_default();
                match target {
                    Value::Object(map) => Ok(lookup_path(&map, &key)),
                    Value::Null => Err(null_reference(source, member)),
                    other => Err(type_error(source, format!("{} has no Eval", kind_of(&other)))),
                }
            }
            _ => Err(type_error(source, "expression is not callable".to_string())),
        }
    }

    fn call_macro(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RenderError> {
        let program = self.program;
        let Some(definition) = program.macros.get(name) else {
            return Ok(Value::Null);
        };
        self.enter(name)?;
        let frame: BTreeMap<String, Value> = definition.params.iter().cloned().zip(args).collect();
        let frames = std::mem::replace(&mut self.frames, vec![frame]);
        let mut captured = String::new();
        let result = self.run(&definition.body, &mut captured);
        self.frames = frames;
        self.depth -= 1;
        result.map(|_| Value::String(captured))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Value) -> Option<Num> {
        let Value::Number(n) = value else {
            return None;
        };
        match n.as_i64() {
            Some(i) => Some(Num::Int(i)),
            None => n.as_f64().map(Num::Float),
        }
    }

    fn float(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    /// Integers compare exactly. Anything involving a float compares as f64.
    fn compare(self, other: Num) -> Option<Ordering> {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.float().partial_cmp(&b.float()),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value, source: &CompiledExpr) -> Result<Value, RenderError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(equal(left, right))),
        BinaryOp::Ne => return Ok(Value::Bool(!equal(left, right))),
        BinaryOp::Add if left.is_string() || right.is_string() => {
            return Ok(Value::String(format!("{}{}", to_output_text(left), to_output_text(right))));
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => match (Num::of(left), Num::of(right)) {
                    (Some(a), Some(b)) => a.compare(b),
                    _ => None,
                },
            };
            let Some(ordering) = ordering else {
                return Err(type_error(
                    source,
                    format!("cannot compare {} with {}", kind_of(left), kind_of(right)),
                ));
            };
            return Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (Num::of(left), Num::of(right)) else {
        return Err(type_error(
            source,
            format!("operator {:?} does not apply to {} and {}", op, kind_of(left), kind_of(right)),
        ));
    };
    let divide_by_zero = || RenderError::DivideByZero {
        expression: source.code.clone(),
        position: source.position.clone(),
    };
    let result = match (op, a, b) {
        (BinaryOp::Add, Num::Int(x), Num::Int(y)) => x.checked_add(y).map(Num::Int).unwrap_or(Num::Float(x as f64 + y as f64)),
        (BinaryOp::Sub, Num::Int(x), Num::Int(y)) => x.checked_sub(y).map(Num::Int).unwrap_or(Num::Float(x as f64 - y as f64)),
        (BinaryOp::Mul, Num::Int(x), Num::Int(y)) => x.checked_mul(y).map(Num::Int).unwrap_or(Num::Float(x as f64 * y as f64)),
        (BinaryOp::Add, x, y) => Num::Float(x.float() + y.float()),
        (BinaryOp::Sub, x, y) => Num::Float(x.float() - y.float()),
        (BinaryOp::Mul, x, y) => Num::Float(x.float() * y.float()),
        (BinaryOp::Div | BinaryOp::IntDiv | BinaryOp::Rem, _, y) if y.float() == 0.0 => return Err(divide_by_zero()),
        (BinaryOp::Div, Num::Int(x), Num::Int(y)) if x.checked_rem(y) == Some(0) => Num::Int(x / y),
        (BinaryOp::Div, x, y) => Num::Float(x.float() / y.float()),
        (BinaryOp::IntDiv, Num::Int(x), Num::Int(y)) => x
            .checked_div(y)
            .map(Num::Int)
            .unwrap_or(Num::Float((x as f64 / y as f64).trunc())),
        (BinaryOp::IntDiv, _, _) => return Err(type_error(source, "div requires integers".to_string())),
        (BinaryOp::Rem, Num::Int(x), Num::Int(y)) => Num::Int(x.checked_rem(y).unwrap_or(0)),
        (BinaryOp::Rem, x, y) => Num::Float(x.float() % y.float()),
        _ => return Err(type_error(source, format!("unsupported operator {:?}", op))),
    };
    Ok(result.into_value())
}

fn equal(left: &Value, right: &Value) -> bool {
    match (Num::of(left), Num::of(right)) {
        (Some(a), Some(b)) => a.compare(b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn member_of(target: Value, member: &str, source: &CompiledExpr) -> Result<Value, RenderError> {
    match target {
        Value::Null => Err(null_reference(source, member)),
        Value::Object(mut map) => Ok(map.remove(member).unwrap_or(Value::Null)),
        Value::Array(items) if matches!(member, "Count" | "Length") => Ok(Value::from(items.len())),
        Value::String(text) if matches!(member, "Count" | "Length") => Ok(Value::from(text.chars().count())),
        other => Err(type_error(source, format!("{} has no member '{}'", kind_of(&other), member))),
    }
}

fn index_of(target: Value, index: Value, source: &CompiledExpr) -> Result<Value, RenderError> {
    match (target, &index) {
        (Value::Null, _) => Err(null_reference(source, "[]")),
        (Value::Object(mut map), Value::String(key)) => Ok(map.remove(key).unwrap_or(Value::Null)),
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize).cloned())
            .ok_or_else(|| type_error(source, format!("index {} is out of range", n))),
        (Value::String(text), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| text.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| type_error(source, format!("index {} is out of range", n))),
        (other, _) => Err(type_error(
            source,
            format!("{} cannot be indexed by {}", kind_of(&other), kind_of(&index)),
        )),
    }
}

/// Dotted key lookup: `order.customer.name`.
fn lookup_path(map: &Map<String, Value>, key: &str) -> Value {
    if let Some(value) = map.get(key) {
        return value.clone();
    }
    let mut parts = key.split('.');
    let Some(first) = parts.next() else {
        return Value::Null;
    };
    let mut current = map.get(first);
    for part in parts {
        current = current.and_then(|value| value.get(part));
    }
    current.cloned().unwrap_or(Value::Null)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn null_reference(source: &CompiledExpr, member: &str) -> RenderError {
    RenderError::NullReference {
        expression: source.code.clone(),
        member: member.to_string(),
        position: source.position.clone(),
    }
}

fn type_error(source: &CompiledExpr, message: String) -> RenderError {
    RenderError::Type {
        expression: source.code.clone(),
        message,
        position: source.position.clone(),
    }
}

pub fn html_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&#39;"),
            c => encoded.push(c),
        }
    }
    encoded
}
