//! Runtime values
//!
//! Primitives are stored inline; arrays, objects, functions and classes live
//! behind copy-on-write [`Handle`]s so assignment is always a handle copy.

mod array;
mod copy_counter;
mod errors;
mod function;
mod object;
mod string;

pub use array::ArrayData;
pub use copy_counter::CopyCounter;
pub use errors::CONST_MUTATION_MESSAGE;
pub use function::{BodyRef, ClassData, FunctionData};
pub use object::ObjectData;
pub use string::string_at_byte;

use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::builtin::Builtin;
use crate::content_hash::strict_equals;
use crate::handle::Handle;
use crate::native::NativeFunction;

/// A runtime value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    /// Empty register or array hole. Reads as `undefined`.
    #[default]
    Void,
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    String(Rc<str>),
    Array(Handle<ArrayData>),
    Object(Handle<ObjectData>),
    Function(Handle<FunctionData>),
    Class(Handle<ClassData>),
    Native(&'static NativeFunction),
    Builtin(Builtin),
    CopyCounter(CopyCounter),
}

impl Value {
    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Handle::new(ArrayData::new(elements)))
    }

    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Value {
        Value::Object(Handle::new(ObjectData::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            None,
        )))
    }

    pub fn object_with_prototype<K: Into<String>>(
        fields: impl IntoIterator<Item = (K, Value)>,
        prototype: Value,
    ) -> Value {
        Value::Object(Handle::new(ObjectData::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            Some(prototype),
        )))
    }

    pub fn function(body: BodyRef, captures: Vec<Value>) -> Value {
        Value::Function(Handle::new(FunctionData::new(body, captures)))
    }

    pub fn class(data: ClassData) -> Value {
        Value::Class(Handle::new(data))
    }

    /// A fresh copy counter carrying `tag`.
    pub fn copy_counter(tag: Value) -> Value {
        Value::CopyCounter(CopyCounter::new(tag))
    }

    /// Map the empty marker to `undefined`.
    #[inline]
    pub fn or_undefined(self) -> Value {
        match self {
            Value::Void => Value::Undefined,
            other => other,
        }
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Void | Value::Undefined)
    }

    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Void | Value::Undefined | Value::Null)
    }

    pub fn typeof_(&self) -> &'static str {
        match self {
            Value::Void | Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) | Value::CopyCounter(_) => "object",
            Value::Function(_) | Value::Class(_) | Value::Native(_) => "function",
            Value::Builtin(b) => {
                if b.is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Void | Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::BigInt(b) => !b.is_zero(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// ECMAScript `ToNumber`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Void | Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::BigInt(b) => b.to_f64().unwrap_or(f64::NAN),
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_string()),
            _ => f64::NAN,
        }
    }

    /// Interpret the value as an array index.
    pub fn to_index(&self) -> Option<usize> {
        match self {
            Value::Number(n) => {
                if *n >= 0.0 && n.fract() == 0.0 && *n < u32::MAX as f64 {
                    Some(*n as usize)
                } else {
                    None
                }
            }
            Value::String(s) => {
                let canonical = s.as_ref() == "0"
                    || (!s.is_empty()
                        && !s.starts_with('0')
                        && s.bytes().all(|b| b.is_ascii_digit()));
                if canonical {
                    s.parse().ok()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Key used for field access.
    pub fn to_property_key(&self) -> String {
        match self {
            Value::String(s) => s.to_string(),
            other => other.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayData> {
        match self {
            Value::Array(a) => Some(a.read()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectData> {
        match self {
            Value::Object(o) => Some(o.read()),
            _ => None,
        }
    }

    /// Field lookup on objects, following the prototype chain.
    pub fn get_field(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(o) => o.read().lookup(key),
            _ => None,
        }
    }

    /// JSON-like rendering that keeps the structure of the value visible.
    pub fn codify(&self) -> String {
        let mut out = String::new();
        self.codify_into(&mut out);
        out
    }

    fn codify_into(&self, out: &mut String) {
        match self {
            Value::String(s) => quote_into(s, out),
            Value::BigInt(b) => {
                out.push_str(&b.to_string());
                out.push('n');
            }
            Value::Array(a) => {
                out.push('[');
                for (i, element) in a.read().elements.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    element.codify_into(out);
                }
                out.push(']');
            }
            Value::Object(o) => {
                if let Some(name) = self.error_name() {
                    out.push_str(&name);
                }
                codify_fields(o.read().fields.iter(), out);
            }
            Value::CopyCounter(c) => {
                out.push_str("CopyCounter{\"tag\":");
                c.tag.codify_into(out);
                out.push_str(&format!(",\"count\":{}}}", c.count()));
            }
            other => out.push_str(&other.to_string()),
        }
    }
}

fn codify_fields<'a>(fields: impl Iterator<Item = (&'a String, &'a Value)>, out: &mut String) {
    out.push('{');
    for (i, (key, value)) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        quote_into(key, out);
        out.push(':');
        value.codify_into(out);
    }
    out.push('}');
}

fn quote_into(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    let numeric = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !numeric {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// ECMAScript `Number::toString` for radix 10.
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
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    format!("{}", n)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void | Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::BigInt(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(a) => {
                for (i, element) in a.read().elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    if !element.is_nullish() {
                        write!(f, "{}", element)?;
                    }
                }
                Ok(())
            }
            Value::Object(o) => match self.error_name() {
                Some(name) => match o.read().fields.get("message") {
                    Some(message) if !message.to_string().is_empty() => {
                        write!(f, "{}: {}", name, message)
                    }
                    _ => write!(f, "{}", name),
                },
                None => write!(f, "[object Object]"),
            },
            Value::Function(func) => write!(f, "[function {}]", func.read().body.name),
            Value::Class(class) => write!(f, "[class {}]", class.read().name),
            Value::Native(native) => write!(f, "[function {}]", native.name),
            Value::Builtin(b) if b.is_callable() => write!(f, "[function {}]", b.name()),
            Value::Builtin(b) => write!(f, "[object {}]", b.name()),
            Value::CopyCounter(c) => write!(f, "[CopyCounter {}]", c.tag),
        }
    }
}

/// Equality follows `===`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        strict_equals(self, other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<BigInt> for Value {
    fn from(b: BigInt) -> Self {
        Value::BigInt(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(elements: Vec<Value>) -> Self {
        Value::array(elements)
    }
}
