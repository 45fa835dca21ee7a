use crate::ast::{ClassDef, FunctionDef};
use crate::builtins::Builtin;
use crate::environment::Env;
use crate::stack::ensure_sufficient_stack;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Nesting depth at which `inspect` abbreviates containers.
const INSPECT_DEPTH: usize = 2;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Rc<RefCell<PlainObject>>),
    Array(Rc<RefCell<Vec<Value>>>),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Native(Rc<NativeFunction>),
}

/// String-keyed property map that enumerates in insertion order.
#[derive(Debug, Clone, Default)]
pub struct PlainObject {
    keys: Vec<String>,
    values: HashMap<String, Value>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.keys.iter().filter_map(move |key| self.values.get(key).map(|value| (key, value)))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<(String, Value)> for PlainObject {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut object = PlainObject::new();
        for (key, value) in iter {
            object.set(key, value);
        }
        object
    }
}

/// A closure: function syntax paired with the scope it was created in.
pub struct Function {
    pub name: String,
    pub def: Rc<FunctionDef>,
    pub env: Env,
    /// Class whose method this is; `super` lookups start at its parent.
    pub home: Option<Rc<Class>>,
    /// Receiver fixed by `bind`, overriding the call-site `this`.
    pub bound_this: Option<Value>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method reads materialize a fresh closure each time; two of them are the
    /// same function when they share definition, home class and scope.
    fn same_method(&self, other: &Function) -> bool {
        match (&self.home, &other.home) {
            (Some(a), Some(b)) => {
                self.bound_this.is_none()
                    && other.bound_this.is_none()
                    && Rc::ptr_eq(a, b)
                    && Rc::ptr_eq(&self.def, &other.def)
                    && Rc::ptr_eq(&self.env, &other.env)
            }
            _ => false,
        }
    }
}

pub struct Class {
    pub name: String,
    pub def: Rc<ClassDef>,
    pub parent: Option<Rc<Class>>,
    /// Scope the class body closes over.
    pub env: Env,
    methods: HashMap<String, Rc<FunctionDef>>,
}

impl Class {
    pub fn new(name: String, def: Rc<ClassDef>, parent: Option<Rc<Class>>, env: Env) -> Self {
        let methods = def
            .methods
            .iter()
            .map(|method| (method.name.clone(), method.function.clone()))
            .collect();
        Self {
            name,
            def,
            parent,
            env,
            methods,
        }
    }

    pub fn own_method(&self, name: &str) -> Option<&Rc<FunctionDef>> {
        self.methods.get(name)
    }

    /// Walk this class and its ancestors for a method, returning it together
    /// with the class that defines it.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<FunctionDef>, Rc<Class>)> {
        let mut class = Some(self.clone());
        while let Some(current) = class {
            if let Some(method) = current.own_method(name) {
                return Some((method.clone(), current));
            }
            class = current.parent.clone();
        }
        None
    }

    /// Method bound to its defining class, ready to be called.
    pub fn method_value(self: &Rc<Self>, name: &str) -> Option<Value> {
        self.find_method(name).map(|(def, home)| {
            Value::Function(Rc::new(Function {
                name: name.to_string(),
                env: home.env.clone(),
                def,
                home: Some(home),
                bound_this: None,
            }))
        })
    }

    pub fn is_derived(&self) -> bool {
        self.parent.is_some()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<PlainObject>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(PlainObject::new()),
        }
    }

    /// Own field first, then the class chain.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.fields.borrow().get(key) {
            return Some(value.clone());
        }
        self.class.method_value(key)
    }
}

/// Host-implemented function, optionally carrying the value it was read from.
pub struct NativeFunction {
    pub builtin: Builtin,
    pub receiver: Option<Value>,
}

impl Value {
    pub fn object(object: PlainObject) -> Value {
        Value::Object(Rc::new(RefCell::new(object)))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn native(builtin: Builtin, receiver: Option<Value>) -> Value {
        Value::Native(Rc::new(NativeFunction { builtin, receiver }))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Class(_) | Value::Native(_))
    }

    /// Result of the `typeof` operator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) | Value::Array(_) | Value::Instance(_) => "object",
            Value::Function(_) | Value::Class(_) | Value::Native(_) => "function",
        }
    }

    /// Numeric conversion for primitives; `None` for objects.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Value::Undefined => Some(f64::NAN),
            Value::Null => Some(0.0),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Some(*n),
            Value::String(s) => Some(string_to_number(s)),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b) || a.same_method(b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`: strict equality plus null/undefined and primitive coercion.
    pub fn loose_equals(&self, other: &Value) -> bool {
        if self.is_nullish() || other.is_nullish() {
            return self.is_nullish() && other.is_nullish();
        }
        if self.is_primitive() && other.is_primitive() {
            return match (self, other) {
                (Value::String(a), Value::String(b)) => a == b,
                _ => match (self.to_number(), other.to_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            };
        }
        if self.is_primitive() != other.is_primitive() {
            let (primitive, object) = if self.is_primitive() { (self, other) } else { (other, self) };
            return Value::String(object.to_string()).loose_equals(primitive);
        }
        self.strict_equals(other)
    }

    /// Like [`inspect`](Value::inspect) but quotes top-level strings, as the
    /// REPL echoes results.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => quote_single(s),
            other => other.inspect(),
        }
    }

    /// Node-style rendering used by `console.log`.
    pub fn inspect(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            _ => {
                let mut seen = Vec::new();
                self.inspect_nested(0, &mut seen)
            }
        }
    }

    fn inspect_nested(&self, depth: usize, seen: &mut Vec<usize>) -> String {
        match self {
            Value::String(s) => quote_single(s),
            Value::Array(items) => {
                let id = Rc::as_ptr(items) as *const () as usize;
                if seen.contains(&id) {
                    return "[Circular]".to_string();
                }
                let items = items.borrow();
                if items.is_empty() {
                    return "[]".to_string();
                }
                if depth > INSPECT_DEPTH {
                    return "[Array]".to_string();
                }
                seen.push(id);
                let parts: Vec<String> = items.iter().map(|item| item.inspect_nested(depth + 1, seen)).collect();
                seen.pop();
                format!("[ {} ]", parts.join(", "))
            }
            Value::Object(object) => {
                let id = Rc::as_ptr(object) as *const () as usize;
                if seen.contains(&id) {
                    return "[Circular]".to_string();
                }
                let object = object.borrow();
                if depth > INSPECT_DEPTH && !object.is_empty() {
                    return "[Object]".to_string();
                }
                seen.push(id);
                let rendered = inspect_entries(&object, depth, seen);
                seen.pop();
                rendered
            }
            Value::Instance(instance) => {
                let id = Rc::as_ptr(instance) as *const () as usize;
                if seen.contains(&id) {
                    return "[Circular]".to_string();
                }
                let fields = instance.fields.borrow();
                if depth > INSPECT_DEPTH && !fields.is_empty() {
                    return format!("[{}]", instance.class.name);
                }
                seen.push(id);
                let rendered = inspect_entries(&fields, depth, seen);
                seen.pop();
                format!("{} {}", instance.class.name, rendered)
            }
            Value::Function(function) => match function.name() {
                "" => "[Function (anonymous)]".to_string(),
                name => format!("[Function: {}]", name),
            },
            Value::Native(native) => format!("[Function: {}]", native.builtin.name()),
            Value::Class(class) => {
                let name = if class.name.is_empty() { "(anonymous)" } else { &class.name };
                match &class.parent {
                    Some(parent) => format!("[class {} extends {}]", name, parent.name),
                    None => format!("[class {}]", name),
                }
            }
            Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
            other => other.to_string(),
        }
    }
}

fn inspect_entries(object: &PlainObject, depth: usize, seen: &mut Vec<usize>) -> String {
    if object.is_empty() {
        return "{}".to_string();
    }
    let parts: Vec<String> = object
        .entries()
        .map(|(key, value)| {
            let key = if is_plain_key(key) { key.clone() } else { quote_single(key) };
            format!("{}: {}", key, value.inspect_nested(depth + 1, seen))
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn quote_single(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        match c {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// String-to-number conversion: whitespace-trimmed decimal, hex, or
/// `Infinity`; anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match trimmed {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if trimmed.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')) => {
            crate::lexer::parse_number(trimmed.trim_start_matches('+'))
                .or_else(|| trimmed.parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        }
        _ => f64::NAN,
    }
}

/// Number-to-string conversion as JavaScript prints numbers.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return format!("{}", n);
    }
    let formatted = format!("{:e}", n);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
        _ => formatted,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(items) => write_joined(f, items, ",", &mut Vec::new()),
            Value::Object(_) | Value::Instance(_) => write!(f, "[object Object]"),
            Value::Function(function) => write!(f, "function {}() {{ [code] }}", function.name()),
            Value::Native(native) => write!(f, "function {}() {{ [native code] }}", native.builtin.name()),
            Value::Class(class) => write!(f, "class {} {{ }}", class.name),
        }
    }
}

/// `Array.prototype.join`: elements rendered as strings, holes and nullish
/// values as empty strings.
pub fn join_array(items: &Rc<RefCell<Vec<Value>>>, separator: &str) -> String {
    let mut joined = String::new();
    // Writing into a String cannot fail.
    let _ = write_joined(&mut joined, items, separator, &mut Vec::new());
    joined
}

/// An array already being rendered further up contributes the empty string.
fn write_joined(
    out: &mut impl fmt::Write,
    items: &Rc<RefCell<Vec<Value>>>,
    separator: &str,
    seen: &mut Vec<usize>,
) -> fmt::Result {
    let id = Rc::as_ptr(items) as *const () as usize;
    if seen.contains(&id) {
        return Ok(());
    }
    seen.push(id);
    let items = items.borrow();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.write_str(separator)?;
        }
        match item {
            Value::Array(nested) => ensure_sufficient_stack(|| write_joined(out, nested, ",", seen))?,
            item if item.is_nullish() => {}
            item => write!(out, "{}", item)?,
        }
    }
    seen.pop();
    Ok(())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other.inspect()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_print_like_javascript() {
        assert_eq!(number_to_string(55.0), "55");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_coercion() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::array(Vec::new()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn equality() {
        let array = Value::array(vec![Value::from(1.0)]);
        assert!(array.strict_equals(&array.clone()));
        assert!(!array.strict_equals(&Value::array(vec![Value::from(1.0)])));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1.0)));
        assert!(!Value::Null.loose_equals(&Value::from(0.0)));
        assert!(!Value::Number(f64::NAN).strict_equals(&Value::Number(f64::NAN)));
    }

    #[test]
    fn object_keeps_insertion_order() {
        let mut object = PlainObject::new();
        object.set("b", Value::from(1.0));
        object.set("a", Value::from(2.0));
        object.set("b", Value::from(3.0));
        assert_eq!(object.keys(), &["b".to_string(), "a".to_string()]);
        assert_eq!(object.get("b"), Some(&Value::from(3.0)));
    }

    #[test]
    fn inspect_formats() {
        let nested: PlainObject = vec![
            ("x".to_string(), Value::from(1.0)),
            ("name".to_string(), Value::from("a")),
            ("list".to_string(), Value::array(vec![Value::from(1.0), Value::from("b")])),
        ]
        .into_iter()
        .collect();
        assert_eq!(Value::object(nested).inspect(), "{ x: 1, name: 'a', list: [ 1, 'b' ] }");
        assert_eq!(Value::from("top").inspect(), "top");
        assert_eq!(Value::array(Vec::new()).inspect(), "[]");
    }

    #[test]
    fn display_joins_arrays() {
        let array = Value::array(vec![Value::from(1.0), Value::Null, Value::from("x")]);
        assert_eq!(array.to_string(), "1,,x");
        assert_eq!(Value::object(PlainObject::new()).to_string(), "[object Object]");
    }

    #[test]
    fn circular_array_is_marked() {
        let array = Value::array(Vec::new());
        if let Value::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        assert_eq!(array.inspect(), "[ [Circular] ]");
        if let Value::Array(items) = &array {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn circular_array_displays_empty() {
        let array = Value::array(vec![Value::from(1.0)]);
        if let Value::Array(items) = &array {
            items.borrow_mut().push(array.clone());
            items.borrow_mut().push(Value::from(2.0));
        }
        assert_eq!(array.to_string(), "1,,2");
        if let Value::Array(items) = &array {
            assert_eq!(join_array(items, "-"), "1--2");
        }
        if let Value::Array(items) = &array {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn shared_array_is_not_circular() {
        let shared = Value::array(vec![Value::from(1.0)]);
        let outer = Value::array(vec![shared.clone(), shared]);
        assert_eq!(outer.to_string(), "1,1");
    }
}
