//! Host-implemented globals and the methods reachable from primitive and
//! array values.

use crate::environment::{BindingKind, Env};
use crate::error::{JsError, JsResult, Span};
use crate::evaluator::Evaluator;
use crate::value::{join_array, number_to_string, Function, PlainObject, Value};
use std::rc::Rc;

/// Longest string, in bytes, that `repeat` will build.
pub const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    // console
    ConsoleLog,
    ConsoleError,
    ConsoleWarn,

    // Math
    MathFloor,
    MathCeil,
    MathRound,
    MathAbs,
    MathMax,
    MathMin,
    MathSqrt,
    MathPow,
    MathTrunc,

    // Object / Array statics
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ArrayIsArray,

    // Global functions
    StringConvert,
    NumberConvert,
    ParseInt,
    ParseFloat,
    IsNaN,

    // Array.prototype
    ArrayPush,
    ArrayPop,
    ArrayShift,
    ArrayMap,
    ArrayFilter,
    ArrayReduce,
    ArrayForEach,
    ArrayFind,
    ArraySome,
    ArrayEvery,
    ArrayJoin,
    ArrayIndexOf,
    ArrayIncludes,
    ArraySlice,
    ArrayConcat,
    ArrayReverse,

    // String.prototype
    StringToUpperCase,
    StringToLowerCase,
    StringIncludes,
    StringIndexOf,
    StringSlice,
    StringTrim,
    StringSplit,
    StringStartsWith,
    StringEndsWith,
    StringCharAt,
    StringRepeat,

    // Function.prototype
    FunctionBind,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::ConsoleLog => "log",
            Builtin::ConsoleError => "error",
            Builtin::ConsoleWarn => "warn",
            Builtin::MathFloor => "floor",
            Builtin::MathCeil => "ceil",
            Builtin::MathRound => "round",
            Builtin::MathAbs => "abs",
            Builtin::MathMax => "max",
            Builtin::MathMin => "min",
            Builtin::MathSqrt => "sqrt",
            Builtin::MathPow => "pow",
            Builtin::MathTrunc => "trunc",
            Builtin::ObjectKeys => "keys",
            Builtin::ObjectValues => "values",
            Builtin::ObjectEntries => "entries",
            Builtin::ArrayIsArray => "isArray",
            Builtin::StringConvert => "String",
            Builtin::NumberConvert => "Number",
            Builtin::ParseInt => "parseInt",
            Builtin::ParseFloat => "parseFloat",
            Builtin::IsNaN => "isNaN",
            Builtin::ArrayPush => "push",
            Builtin::ArrayPop => "pop",
            Builtin::ArrayShift => "shift",
            Builtin::ArrayMap => "map",
            Builtin::ArrayFilter => "filter",
            Builtin::ArrayReduce => "reduce",
            Builtin::ArrayForEach => "forEach",
            Builtin::ArrayFind => "find",
            Builtin::ArraySome => "some",
            Builtin::ArrayEvery => "every",
            Builtin::ArrayJoin => "join",
            Builtin::ArrayIndexOf | Builtin::StringIndexOf => "indexOf",
            Builtin::ArrayIncludes | Builtin::StringIncludes => "includes",
            Builtin::ArraySlice | Builtin::StringSlice => "slice",
            Builtin::ArrayConcat => "concat",
            Builtin::ArrayReverse => "reverse",
            Builtin::StringToUpperCase => "toUpperCase",
            Builtin::StringToLowerCase => "toLowerCase",
            Builtin::StringTrim => "trim",
            Builtin::StringSplit => "split",
            Builtin::StringStartsWith => "startsWith",
            Builtin::StringEndsWith => "endsWith",
            Builtin::StringCharAt => "charAt",
            Builtin::StringRepeat => "repeat",
            Builtin::FunctionBind => "bind",
        }
    }
}

/// Method of an array value, looked up by property name.
pub fn array_method(name: &str) -> Option<Builtin> {
    let builtin = match name {
        "push" => Builtin::ArrayPush,
        "pop" => Builtin::ArrayPop,
        "shift" => Builtin::ArrayShift,
        "map" => Builtin::ArrayMap,
        "filter" => Builtin::ArrayFilter,
        "reduce" => Builtin::ArrayReduce,
        "forEach" => Builtin::ArrayForEach,
        "find" => Builtin::ArrayFind,
        "some" => Builtin::ArraySome,
        "every" => Builtin::ArrayEvery,
        "join" => Builtin::ArrayJoin,
        "indexOf" => Builtin::ArrayIndexOf,
        "includes" => Builtin::ArrayIncludes,
        "slice" => Builtin::ArraySlice,
        "concat" => Builtin::ArrayConcat,
        "reverse" => Builtin::ArrayReverse,
        _ => return None,
    };
    Some(builtin)
}

pub fn string_method(name: &str) -> Option<Builtin> {
    let builtin = match name {
        "toUpperCase" => Builtin::StringToUpperCase,
        "toLowerCase" => Builtin::StringToLowerCase,
        "includes" => Builtin::StringIncludes,
        "indexOf" => Builtin::StringIndexOf,
        "slice" => Builtin::StringSlice,
        "trim" => Builtin::StringTrim,
        "split" => Builtin::StringSplit,
        "startsWith" => Builtin::StringStartsWith,
        "endsWith" => Builtin::StringEndsWith,
        "charAt" => Builtin::StringCharAt,
        "repeat" => Builtin::StringRepeat,
        _ => return None,
    };
    Some(builtin)
}

pub fn function_method(name: &str) -> Option<Builtin> {
    match name {
        "bind" => Some(Builtin::FunctionBind),
        _ => None,
    }
}

fn namespace(entries: &[(&str, Builtin)]) -> PlainObject {
    entries
        .iter()
        .map(|(name, builtin)| (name.to_string(), Value::native(*builtin, None)))
        .collect()
}

/// Populate the global scope with the host objects scripts can reach.
pub fn install_globals(env: &Env) -> JsResult<()> {
    let console = namespace(&[
        ("log", Builtin::ConsoleLog),
        ("error", Builtin::ConsoleError),
        ("warn", Builtin::ConsoleWarn),
    ]);

    let mut math = namespace(&[
        ("floor", Builtin::MathFloor),
        ("ceil", Builtin::MathCeil),
        ("round", Builtin::MathRound),
        ("abs", Builtin::MathAbs),
        ("max", Builtin::MathMax),
        ("min", Builtin::MathMin),
        ("sqrt", Builtin::MathSqrt),
        ("pow", Builtin::MathPow),
        ("trunc", Builtin::MathTrunc),
    ]);
    math.set("PI", Value::Number(std::f64::consts::PI));
    math.set("E", Value::Number(std::f64::consts::E));

    let object = namespace(&[
        ("keys", Builtin::ObjectKeys),
        ("values", Builtin::ObjectValues),
        ("entries", Builtin::ObjectEntries),
    ]);
    let array = namespace(&[("isArray", Builtin::ArrayIsArray)]);

    let globals = [
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
        ("console", Value::object(console)),
        ("Math", Value::object(math)),
        ("Object", Value::object(object)),
        ("Array", Value::object(array)),
        ("String", Value::native(Builtin::StringConvert, None)),
        ("Number", Value::native(Builtin::NumberConvert, None)),
        ("parseInt", Value::native(Builtin::ParseInt, None)),
        ("parseFloat", Value::native(Builtin::ParseFloat, None)),
        ("isNaN", Value::native(Builtin::IsNaN, None)),
    ];

    let mut scope = env.borrow_mut();
    for (name, value) in globals {
        scope.declare(name, BindingKind::Const, value, Span::default())?;
    }
    // Top-level `this` is a plain object scripts may write to.
    scope.declare("this", BindingKind::This, Value::object(PlainObject::new()), Span::default())?;
    Ok(())
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}

fn number_arg(args: &[Value], index: usize) -> f64 {
    arg(args, index).to_number().unwrap_or(f64::NAN)
}

/// Resolve a possibly negative `start`/`end` argument against `len`.
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    match value {
        None | Some(Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number().unwrap_or(0.0);
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            if n < 0.0 {
                (len as f64 + n).max(0.0) as usize
            } else {
                n.min(len as f64) as usize
            }
        }
    }
}

/// `SameValueZero`, used by `includes`.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_equals(b),
    }
}

/// Invoke a builtin with the receiver it was read from.
pub fn call_builtin(
    evaluator: &mut Evaluator,
    builtin: Builtin,
    this: Value,
    args: Vec<Value>,
    span: Span,
) -> JsResult<Value> {
    tracing::trace!(builtin = builtin.name(), args = args.len(), "native call");
    match builtin {
        Builtin::ConsoleLog | Builtin::ConsoleError | Builtin::ConsoleWarn => {
            let line = args.iter().map(Value::inspect).collect::<Vec<_>>().join(" ");
            evaluator.write_line(&line, span)?;
            Ok(Value::Undefined)
        }

        Builtin::MathFloor => Ok(Value::Number(number_arg(&args, 0).floor())),
        Builtin::MathCeil => Ok(Value::Number(number_arg(&args, 0).ceil())),
        Builtin::MathRound => Ok(Value::Number((number_arg(&args, 0) + 0.5).floor())),
        Builtin::MathAbs => Ok(Value::Number(number_arg(&args, 0).abs())),
        Builtin::MathSqrt => Ok(Value::Number(number_arg(&args, 0).sqrt())),
        Builtin::MathTrunc => Ok(Value::Number(number_arg(&args, 0).trunc())),
        Builtin::MathPow => Ok(Value::Number(number_arg(&args, 0).powf(number_arg(&args, 1)))),
        Builtin::MathMax | Builtin::MathMin => {
            let is_max = builtin == Builtin::MathMax;
            let mut result = if is_max { f64::NEG_INFINITY } else { f64::INFINITY };
            for value in &args {
                let n = value.to_number().unwrap_or(f64::NAN);
                if n.is_nan() {
                    return Ok(Value::Number(f64::NAN));
                }
                result = if is_max { result.max(n) } else { result.min(n) };
            }
            Ok(Value::Number(result))
        }

        Builtin::ObjectKeys | Builtin::ObjectValues | Builtin::ObjectEntries => {
            let entries = own_entries(&arg(&args, 0), span)?;
            let items = entries
                .into_iter()
                .map(|(key, value)| match builtin {
                    Builtin::ObjectKeys => Value::String(key),
                    Builtin::ObjectValues => value,
                    _ => Value::array(vec![Value::String(key), value]),
                })
                .collect();
            Ok(Value::array(items))
        }
        Builtin::ArrayIsArray => Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_)))),

        Builtin::StringConvert => Ok(match args.first() {
            Some(value) => Value::String(value.to_string()),
            None => Value::String(String::new()),
        }),
        Builtin::NumberConvert => Ok(Value::Number(match args.first() {
            Some(value) => value.to_number().unwrap_or(f64::NAN),
            None => 0.0,
        })),
        Builtin::ParseInt => Ok(Value::Number(parse_int(&arg(&args, 0).to_string(), args.get(1)))),
        Builtin::ParseFloat => Ok(Value::Number(parse_float(&arg(&args, 0).to_string()))),
        Builtin::IsNaN => Ok(Value::Bool(number_arg(&args, 0).is_nan())),

        Builtin::FunctionBind => match &this {
            Value::Function(function) => Ok(Value::Function(Rc::new(Function {
                name: format!("bound {}", function.name),
                def: function.def.clone(),
                env: function.env.clone(),
                home: function.home.clone(),
                bound_this: Some(arg(&args, 0)),
            }))),
            Value::Native(_) | Value::Class(_) => Ok(this.clone()),
            other => Err(JsError::type_error(
                span,
                format!("{} is not a function", other.inspect()),
            )),
        },

        Builtin::StringToUpperCase
        | Builtin::StringToLowerCase
        | Builtin::StringIncludes
        | Builtin::StringIndexOf
        | Builtin::StringSlice
        | Builtin::StringTrim
        | Builtin::StringSplit
        | Builtin::StringStartsWith
        | Builtin::StringEndsWith
        | Builtin::StringCharAt
        | Builtin::StringRepeat => match this {
            Value::String(s) => string_builtin(builtin, &s, &args, span),
            other => Err(JsError::type_error(
                span,
                format!("String.prototype.{} called on {}", builtin.name(), other.type_name()),
            )),
        },

        _ => array_builtin(evaluator, builtin, this, args, span),
    }
}

/// Own enumerable entries of an object-like value, as `Object.keys` sees them.
pub fn own_entries(value: &Value, span: Span) -> JsResult<Vec<(String, Value)>> {
    match value {
        Value::Object(object) => Ok(object
            .borrow()
            .entries()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()),
        Value::Instance(instance) => Ok(instance
            .fields
            .borrow()
            .entries()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()),
        Value::Array(items) => Ok(items
            .borrow()
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value.clone()))
            .collect()),
        Value::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(index, c)| (index.to_string(), Value::String(c.to_string())))
            .collect()),
        Value::Undefined | Value::Null => Err(JsError::type_error(
            span,
            "Cannot convert undefined or null to object",
        )),
        _ => Ok(Vec::new()),
    }
}

fn string_builtin(builtin: Builtin, s: &str, args: &[Value], span: Span) -> JsResult<Value> {
    let chars: Vec<char> = s.chars().collect();
    let search = || arg(args, 0).to_string();
    let value = match builtin {
        Builtin::StringToUpperCase => Value::String(s.to_uppercase()),
        Builtin::StringToLowerCase => Value::String(s.to_lowercase()),
        Builtin::StringTrim => Value::String(s.trim().to_string()),
        Builtin::StringIncludes => Value::Bool(s.contains(&search())),
        Builtin::StringStartsWith => Value::Bool(s.starts_with(&search())),
        Builtin::StringEndsWith => Value::Bool(s.ends_with(&search())),
        Builtin::StringIndexOf => {
            let needle = search();
            let index = s
                .find(&needle)
                .map_or(-1.0, |byte_index| s[..byte_index].chars().count() as f64);
            Value::Number(index)
        }
        Builtin::StringSlice => {
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            Value::String(if start < end { chars[start..end].iter().collect() } else { String::new() })
        }
        Builtin::StringCharAt => {
            let index = number_arg(args, 0);
            let index = if index.is_nan() { 0.0 } else { index };
            Value::String(
                (index >= 0.0)
                    .then(|| chars.get(index as usize))
                    .flatten()
                    .map(|c| c.to_string())
                    .unwrap_or_default(),
            )
        }
        Builtin::StringRepeat => {
            let count = number_arg(args, 0);
            if count < 0.0 || count.is_infinite() {
                return Err(JsError::range_error(span, format!("Invalid count value: {}", number_to_string(count))));
            }
            let count = if count.is_nan() { 0 } else { count as usize };
            match s.len().checked_mul(count) {
                Some(length) if length <= MAX_STRING_LENGTH => Value::String(s.repeat(count)),
                _ => return Err(JsError::range_error(span, "Invalid string length")),
            }
        }
        Builtin::StringSplit => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::String(s.to_string())],
                Some(separator) => {
                    let separator = separator.to_string();
                    if separator.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            Value::array(parts)
        }
        _ => Value::Undefined,
    };
    Ok(value)
}

fn array_builtin(
    evaluator: &mut Evaluator,
    builtin: Builtin,
    this: Value,
    args: Vec<Value>,
    span: Span,
) -> JsResult<Value> {
    let items = match &this {
        Value::Array(items) => items.clone(),
        other => {
            return Err(JsError::type_error(
                span,
                format!("Array.prototype.{} called on {}", builtin.name(), other.type_name()),
            ))
        }
    };
    let len = || items.borrow().len();
    let element = |index: usize| items.borrow().get(index).cloned();

    match builtin {
        Builtin::ArrayPush => {
            items.borrow_mut().extend(args);
            Ok(Value::Number(len() as f64))
        }
        Builtin::ArrayPop => Ok(items.borrow_mut().pop().unwrap_or(Value::Undefined)),
        Builtin::ArrayShift => {
            let mut items = items.borrow_mut();
            Ok(if items.is_empty() { Value::Undefined } else { items.remove(0) })
        }
        Builtin::ArrayJoin => {
            let separator = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(value) => value.to_string(),
            };
            Ok(Value::String(join_array(&items, &separator)))
        }
        Builtin::ArrayIndexOf => {
            let needle = arg(&args, 0);
            let position = items.borrow().iter().position(|item| item.strict_equals(&needle));
            Ok(Value::Number(position.map_or(-1.0, |index| index as f64)))
        }
        Builtin::ArrayIncludes => {
            let needle = arg(&args, 0);
            Ok(Value::Bool(items.borrow().iter().any(|item| same_value_zero(item, &needle))))
        }
        Builtin::ArraySlice => {
            let items = items.borrow();
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
            Ok(Value::array(slice))
        }
        Builtin::ArrayConcat => {
            let mut result = items.borrow().clone();
            for value in args {
                match value {
                    Value::Array(other) => result.extend(other.borrow().iter().cloned()),
                    other => result.push(other),
                }
            }
            Ok(Value::array(result))
        }
        Builtin::ArrayReverse => {
            items.borrow_mut().reverse();
            Ok(this)
        }
        Builtin::ArrayReduce => {
            let callback = callable_arg(&args, builtin, span)?;
            let mut index = 0;
            let mut accumulator = match args.get(1) {
                Some(initial) => initial.clone(),
                None => {
                    index = 1;
                    element(0).ok_or_else(|| {
                        JsError::type_error(span, "Reduce of empty array with no initial value")
                    })?
                }
            };
            while index < len() {
                if let Some(item) = element(index) {
                    accumulator = evaluator.call_value(
                        &callback,
                        Value::Undefined,
                        vec![accumulator, item, Value::Number(index as f64), this.clone()],
                        span,
                    )?;
                }
                index += 1;
            }
            Ok(accumulator)
        }
        Builtin::ArrayMap
        | Builtin::ArrayFilter
        | Builtin::ArrayForEach
        | Builtin::ArrayFind
        | Builtin::ArraySome
        | Builtin::ArrayEvery => {
            let callback = callable_arg(&args, builtin, span)?;
            let this_arg = arg(&args, 1);
            let mut mapped = Vec::new();
            let mut index = 0;
            while index < len() {
                let Some(item) = element(index) else { break };
                let result = evaluator.call_value(
                    &callback,
                    this_arg.clone(),
                    vec![item.clone(), Value::Number(index as f64), this.clone()],
                    span,
                )?;
                match builtin {
                    Builtin::ArrayMap => mapped.push(result),
                    Builtin::ArrayFilter if result.is_truthy() => mapped.push(item),
                    Builtin::ArrayFind if result.is_truthy() => return Ok(item),
                    Builtin::ArraySome if result.is_truthy() => return Ok(Value::Bool(true)),
                    Builtin::ArrayEvery if !result.is_truthy() => return Ok(Value::Bool(false)),
                    _ => {}
                }
                index += 1;
            }
            Ok(match builtin {
                Builtin::ArrayMap | Builtin::ArrayFilter => Value::array(mapped),
                Builtin::ArraySome => Value::Bool(false),
                Builtin::ArrayEvery => Value::Bool(true),
                _ => Value::Undefined,
            })
        }
        _ => Ok(Value::Undefined),
    }
}

fn callable_arg(args: &[Value], builtin: Builtin, span: Span) -> JsResult<Value> {
    let callback = arg(args, 0);
    if callback.is_callable() {
        Ok(callback)
    } else {
        Err(JsError::type_error(
            span,
            format!("{} is not a function", callback.inspect()),
        )
        .with_help(format!("Array.prototype.{} expects a callback function.", builtin.name())))
    }
}

fn parse_int(text: &str, radix: Option<&Value>) -> f64 {
    let mut text = text.trim();
    let mut negative = false;
    if let Some(rest) = text.strip_prefix('-') {
        negative = true;
        text = rest;
    } else if let Some(rest) = text.strip_prefix('+') {
        text = rest;
    }

    let mut radix = radix.and_then(Value::to_number).filter(|n| !n.is_nan()).unwrap_or(0.0) as u32;
    if radix == 0 || radix == 16 {
        if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            text = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }

    let mut result = 0.0;
    let mut has_digits = false;
    for c in text.chars() {
        match c.to_digit(radix) {
            Some(digit) => {
                has_digits = true;
                result = result * radix as f64 + digit as f64;
            }
            None => break,
        }
    }

    match (has_digits, negative) {
        (false, _) => f64::NAN,
        (true, true) => -result,
        (true, false) => result,
    }
}

fn parse_float(text: &str) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    let chars: Vec<char> = text.chars().collect();
    while end < chars.len() {
        let c = chars[end];
        let accepted = match c {
            '0'..='9' => true,
            '+' | '-' => end == 0 || matches!(chars[end - 1], 'e' | 'E'),
            '.' if !seen_dot && !seen_exponent => {
                seen_dot = true;
                true
            }
            'e' | 'E' if !seen_exponent && end > 0 => {
                seen_exponent = true;
                true
            }
            _ => false,
        };
        if !accepted {
            break;
        }
        end += 1;
    }
    let prefix: String = chars[..end].iter().collect();
    if prefix.starts_with("Infinity") || text.starts_with("Infinity") {
        return f64::INFINITY;
    }
    // Back off trailing exponent or sign characters without digits.
    let mut candidate = prefix.as_str();
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return n;
        }
        if let Some(n) = crate::lexer::parse_number(candidate) {
            return n;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    f64::NAN
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_int_handles_sign_radix_and_garbage() {
        assert_eq!(parse_int("42px", None), 42.0);
        assert_eq!(parse_int("  -17", None), -17.0);
        assert_eq!(parse_int("0xff", None), 255.0);
        assert_eq!(parse_int("101", Some(&Value::Number(2.0))), 5.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn parse_float_takes_longest_prefix() {
        assert_eq!(parse_float("3.14abc"), 3.14);
        assert_eq!(parse_float("1e3"), 1000.0);
        assert_eq!(parse_float("2e"), 2.0);
        assert!(parse_float("x1").is_nan());
    }

    #[test]
    fn relative_indices() {
        assert_eq!(relative_index(Some(&Value::Number(-2.0)), 5, 0), 3);
        assert_eq!(relative_index(Some(&Value::Number(10.0)), 5, 0), 5);
        assert_eq!(relative_index(None, 5, 5), 5);
    }

    #[test]
    fn string_methods() {
        let span = Span::default();
        assert_eq!(
            string_builtin(Builtin::StringSlice, "hello", &[Value::Number(1.0), Value::Number(-1.0)], span).unwrap(),
            Value::from("ell")
        );
        assert_eq!(
            string_builtin(Builtin::StringIndexOf, "héllo", &[Value::from("l")], span).unwrap(),
            Value::Number(2.0)
        );
        let split = string_builtin(Builtin::StringSplit, "a,b,c", &[Value::from(",")], span).unwrap();
        assert_eq!(split.inspect(), "[ 'a', 'b', 'c' ]");
        assert!(string_builtin(Builtin::StringRepeat, "x", &[Value::Number(-1.0)], span).is_err());
    }

    #[test]
    fn repeat_refuses_oversized_results() {
        let span = Span::default();
        let error = string_builtin(Builtin::StringRepeat, "ab", &[Value::Number(1e18)], span).unwrap_err();
        assert_eq!(error.kind, crate::error::ErrorKind::RangeError);
        assert_eq!(error.message, "Invalid string length");
        assert!(string_builtin(Builtin::StringRepeat, "x", &[Value::Number(1e300)], span).is_err());
        assert_eq!(
            string_builtin(Builtin::StringRepeat, "", &[Value::Number(1e18)], span).unwrap(),
            Value::from("")
        );
        assert_eq!(
            string_builtin(Builtin::StringRepeat, "ab", &[Value::Number(3.0)], span).unwrap(),
            Value::from("ababab")
        );
    }

    #[test]
    fn method_tables() {
        assert_eq!(array_method("reduce"), Some(Builtin::ArrayReduce));
        assert_eq!(string_method("toUpperCase"), Some(Builtin::StringToUpperCase));
        assert_eq!(array_method("nope"), None);
        assert_eq!(Builtin::ArrayIncludes.name(), "includes");
    }
}
