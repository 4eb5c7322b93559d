//! Operator semantics
//!
//! Every operation returns `Err(value)` for a program-level exception so the
//! dispatch loop can route it to the nearest protected region.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use valuevm_bytecode::{BinaryOp, UnaryOp};
use valuevm_core::content_hash::compare_bigint_number;
use valuevm_core::{
    loose_equals, strict_equals, string_at_byte, ArrayData, Builtin, Handle, NativeFunction, Value,
};

use crate::builtins;

/// Result of an operation: a value, or a thrown value.
pub type OpResult = Result<Value, Value>;

/// Largest run of holes an index or `length` assignment may create.
pub const MAX_ARRAY_GAP: usize = 100;

/// Largest shift amount accepted for BigInt shifts.
const MAX_BIGINT_SHIFT: i64 = 1 << 20;

pub fn unary(op: UnaryOp, value: &Value) -> OpResult {
    match op {
        UnaryOp::Plus => match value {
            Value::BigInt(_) => Err(Value::type_error(
                "Cannot convert a BigInt value to a number",
            )),
            other => Ok(Value::Number(to_primitive(other).to_number())),
        },
        UnaryOp::Minus => match value {
            Value::BigInt(b) => Ok(Value::BigInt(-b)),
            other => Ok(Value::Number(-to_primitive(other).to_number())),
        },
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::BitNot => match value {
            Value::BigInt(b) => Ok(Value::BigInt(-b - 1)),
            other => Ok(Value::Number(f64::from(!to_int32(
                to_primitive(other).to_number(),
            )))),
        },
        UnaryOp::TypeOf => Ok(Value::from(value.typeof_())),
    }
}

pub fn binary(op: BinaryOp, lhs: &Value, rhs: &Value) -> OpResult {
    use BinaryOp::*;
    match op {
        Plus => plus(lhs, rhs),
        Minus => arithmetic(lhs, rhs, |a, b| a - b, |a, b| Ok(Value::BigInt(a - b))),
        Mul => arithmetic(lhs, rhs, |a, b| a * b, |a, b| Ok(Value::BigInt(a * b))),
        Div => arithmetic(lhs, rhs, |a, b| a / b, |a, b| {
            if b.is_zero() {
                Err(Value::range_error("Division by zero"))
            } else {
                Ok(Value::BigInt(a / b))
            }
        }),
        Mod => arithmetic(lhs, rhs, |a, b| a % b, |a, b| {
            if b.is_zero() {
                Err(Value::range_error("Division by zero"))
            } else {
                Ok(Value::BigInt(a % b))
            }
        }),
        Exp => arithmetic(lhs, rhs, f64::powf, |a, b| match b.to_u32() {
            Some(exponent) => Ok(Value::BigInt(a.pow(exponent))),
            None if b.sign() == num_bigint::Sign::Minus => {
                Err(Value::range_error("Exponent must be non-negative"))
            }
            None => Err(Value::range_error("Maximum BigInt size exceeded")),
        }),

        LooseEq => Ok(Value::Bool(loose_equals(lhs, rhs))),
        LooseNe => Ok(Value::Bool(!loose_equals(lhs, rhs))),
        StrictEq => Ok(Value::Bool(strict_equals(lhs, rhs))),
        StrictNe => Ok(Value::Bool(!strict_equals(lhs, rhs))),

        And => Ok(if lhs.is_truthy() { rhs } else { lhs }.clone().or_undefined()),
        Or => Ok(if lhs.is_truthy() { lhs } else { rhs }.clone().or_undefined()),
        NullishCoalesce => Ok(if lhs.is_nullish() { rhs } else { lhs }.clone().or_undefined()),

        Less => Ok(Value::Bool(compare(lhs, rhs) == Some(Ordering::Less))),
        LessEq => Ok(Value::Bool(matches!(
            compare(lhs, rhs),
            Some(Ordering::Less | Ordering::Equal)
        ))),
        Greater => Ok(Value::Bool(compare(lhs, rhs) == Some(Ordering::Greater))),
        GreaterEq => Ok(Value::Bool(matches!(
            compare(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ))),

        BitAnd => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_int32(a) & to_int32(b)),
            |a, b| Ok(Value::BigInt(a & b)),
        ),
        BitOr => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_int32(a) | to_int32(b)),
            |a, b| Ok(Value::BigInt(a | b)),
        ),
        BitXor => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_int32(a) ^ to_int32(b)),
            |a, b| Ok(Value::BigInt(a ^ b)),
        ),
        LeftShift => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_int32(a).wrapping_shl(to_uint32(b) & 31)),
            |a, b| shift_bigint(a, b, true),
        ),
        RightShift => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_int32(a) >> (to_uint32(b) & 31)),
            |a, b| shift_bigint(a, b, false),
        ),
        RightShiftUnsigned => arithmetic(
            lhs,
            rhs,
            |a, b| f64::from(to_uint32(a) >> (to_uint32(b) & 31)),
            |_, _| {
                Err(Value::type_error(
                    "BigInts have no unsigned right shift, use >> instead",
                ))
            },
        ),

        InstanceOf => instance_of(lhs, rhs),
        In => has_property(rhs, lhs),
        OptionalChain => optional_chain(lhs, rhs),
    }
}

/// `+`: string concatenation when either side is a string after
/// primitive conversion, numeric addition otherwise.
fn plus(lhs: &Value, rhs: &Value) -> OpResult {
    let a = to_primitive(lhs);
    let b = to_primitive(rhs);
    match (&a, &b) {
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::from(format!("{a}{b}"))),
        (Value::BigInt(x), Value::BigInt(y)) => Ok(Value::BigInt(x + y)),
        (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(mixed_bigint()),
        _ => Ok(Value::Number(a.to_number() + b.to_number())),
    }
}

fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    number: fn(f64, f64) -> f64,
    bigint: fn(&BigInt, &BigInt) -> OpResult,
) -> OpResult {
    match (lhs, rhs) {
        (Value::BigInt(a), Value::BigInt(b)) => bigint(a, b),
        (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(mixed_bigint()),
        _ => Ok(Value::Number(number(
            to_primitive(lhs).to_number(),
            to_primitive(rhs).to_number(),
        ))),
    }
}

fn mixed_bigint() -> Value {
    Value::type_error("Cannot mix BigInt and other types, use explicit conversions")
}

fn shift_bigint(value: &BigInt, amount: &BigInt, left: bool) -> OpResult {
    let amount = amount
        .to_i64()
        .filter(|n| n.abs() <= MAX_BIGINT_SHIFT)
        .ok_or_else(|| Value::range_error("Maximum BigInt size exceeded"))?;
    let amount = if left { amount } else { -amount };
    // Bounded by MAX_BIGINT_SHIFT above
    let magnitude = amount.unsigned_abs() as usize;
    if amount >= 0 {
        Ok(Value::BigInt(value << magnitude))
    } else {
        Ok(Value::BigInt(value >> magnitude))
    }
}

/// Composite values convert to their string rendering.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Void => Value::Undefined,
        Value::Array(_)
        | Value::Object(_)
        | Value::Function(_)
        | Value::Class(_)
        | Value::Native(_)
        | Value::Builtin(_)
        | Value::CopyCounter(_) => Value::from(value.to_string()),
        other => other.clone(),
    }
}

/// Relational comparison. `None` means the operands are unordered (NaN).
pub fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    let a = to_primitive(lhs);
    let b = to_primitive(rhs);
    match (&a, &b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
        (Value::BigInt(x), Value::String(s)) => s.trim().parse::<BigInt>().ok().map(|y| x.cmp(&y)),
        (Value::String(s), Value::BigInt(y)) => s.trim().parse::<BigInt>().ok().map(|x| x.cmp(y)),
        (Value::BigInt(x), other) => compare_bigint_number(x, other.to_number()),
        (other, Value::BigInt(y)) => {
            compare_bigint_number(y, other.to_number()).map(Ordering::reverse)
        }
        _ => a.to_number().partial_cmp(&b.to_number()),
    }
}

/// ECMAScript `ToUint32`.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// ECMAScript `ToInt32`.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// `value instanceof class`. Instances are matched by the content of their
/// prototype, so two evaluations of one class declaration agree.
pub fn instance_of(value: &Value, class: &Value) -> OpResult {
    match class {
        Value::Class(c) => {
            let prototype = &c.read().prototype;
            Ok(Value::Bool(match value {
                Value::Object(o) => o
                    .read()
                    .prototype
                    .as_ref()
                    .is_some_and(|p| strict_equals(p, prototype)),
                _ => false,
            }))
        }
        Value::Builtin(b) => match b.error_kind() {
            Some(kind) => Ok(Value::Bool(match value.error_name() {
                Some(name) => *b == Builtin::Error || name.as_ref() == kind,
                None => false,
            })),
            None => Err(not_callable_rhs()),
        },
        Value::Function(_) | Value::Native(_) => Ok(Value::Bool(false)),
        _ => Err(not_callable_rhs()),
    }
}

fn not_callable_rhs() -> Value {
    Value::type_error("Right-hand side of 'instanceof' is not callable")
}

/// `key in target`
pub fn has_property(target: &Value, key: &Value) -> OpResult {
    let found = match target {
        Value::Object(o) => o.read().has(&key.to_property_key()),
        Value::Array(a) => match key.to_index() {
            Some(index) => a.read().elements.get(index).is_some_and(|e| !e.is_void()),
            None => {
                let name = key.to_property_key();
                name == "length" || builtins::array_method(&name).is_some()
            }
        },
        Value::Class(c) => {
            let name = key.to_property_key();
            name == "prototype" || c.read().statics.contains_key(&name)
        }
        Value::Function(_) | Value::Native(_) | Value::Builtin(_) | Value::CopyCounter(_) => false,
        _ => {
            return Err(Value::type_error(format!(
                "Cannot use 'in' operator to search for '{}' in {}",
                key.to_property_key(),
                target
            )))
        }
    };
    Ok(Value::Bool(found))
}

/// Read `target[key]`.
pub fn sub(target: &Value, key: &Value) -> OpResult {
    match target {
        Value::Void | Value::Undefined | Value::Null => Err(Value::type_error(format!(
            "Cannot read properties of {} (reading '{}')",
            target,
            key.to_property_key()
        ))),
        Value::Bool(_) | Value::Function(_) | Value::Native(_) => Ok(Value::Undefined),
        Value::Number(_) => Ok(method_or_undefined(builtins::number_method(
            &key.to_property_key(),
        ))),
        Value::BigInt(_) => Ok(method_or_undefined(builtins::bigint_method(
            &key.to_property_key(),
        ))),
        Value::String(s) => {
            if let Some(index) = key.to_index() {
                return Ok(string_at_byte(s, index));
            }
            let name = key.to_property_key();
            if name == "length" {
                return Ok(Value::Number(s.len() as f64));
            }
            Ok(method_or_undefined(builtins::string_method(&name)))
        }
        Value::Array(a) => {
            if let Some(index) = key.to_index() {
                return Ok(a.read().get(index));
            }
            let name = key.to_property_key();
            if name == "length" {
                return Ok(Value::Number(a.read().len() as f64));
            }
            Ok(method_or_undefined(builtins::array_method(&name)))
        }
        Value::Object(o) => Ok(o
            .read()
            .lookup(&key.to_property_key())
            .map_or(Value::Undefined, Value::or_undefined)),
        Value::Class(c) => {
            let data = c.read();
            let name = key.to_property_key();
            if name == "prototype" {
                return Ok(data.prototype.clone());
            }
            Ok(data
                .statics
                .get(&name)
                .cloned()
                .map_or(Value::Undefined, Value::or_undefined))
        }
        Value::Builtin(b) => Ok(builtins::builtin_member(*b, &key.to_property_key())
            .unwrap_or(Value::Undefined)),
        Value::CopyCounter(counter) => Ok(match key.to_property_key().as_str() {
            "tag" => (*counter.tag).clone(),
            "count" => Value::Number(counter.count() as f64),
            _ => Value::Undefined,
        }),
    }
}

/// `target?.[key]`
pub fn optional_chain(target: &Value, key: &Value) -> OpResult {
    if target.is_nullish() {
        return Ok(Value::Undefined);
    }
    sub(target, key)
}

fn method_or_undefined(method: Option<&'static NativeFunction>) -> Value {
    method.map_or(Value::Undefined, Value::Native)
}

/// Write `target[key] = value` through copy-on-write. The payload is only
/// touched once the write is known to succeed.
pub fn submov(target: &mut Value, key: &Value, value: Value) -> Result<(), Value> {
    match target {
        Value::Array(handle) => {
            if let Some(index) = key.to_index() {
                let len = handle.read().len();
                if index > len && index - len > MAX_ARRAY_GAP {
                    return Err(Value::type_error(format!(
                        "Cannot assign index {index}: gap of more than {MAX_ARRAY_GAP} elements"
                    )));
                }
                let mut data = handle.get_mut();
                match data.elements.get_mut(index) {
                    Some(slot) => *slot = value,
                    None => {
                        data.elements.resize(index, Value::Void);
                        data.elements.push(value);
                    }
                }
                return Ok(());
            }
            match key.to_property_key().as_str() {
                "length" => set_length(handle, &value),
                name => Err(Value::type_error(format!(
                    "Cannot assign to property '{name}' of array"
                ))),
            }
        }
        Value::Object(handle) => {
            handle
                .get_mut()
                .fields
                .insert(key.to_property_key(), value);
            Ok(())
        }
        Value::Class(handle) => {
            let name = key.to_property_key();
            if name == "prototype" {
                return Err(Value::type_error("Cannot assign to class prototype"));
            }
            handle.get_mut().statics.insert(name, value);
            Ok(())
        }
        Value::Void | Value::Undefined => {
            Err(Value::type_error("Cannot assign to subscript of undefined"))
        }
        Value::Null => Err(Value::type_error("Cannot assign to subscript of null")),
        other => Err(Value::type_error(format!(
            "Cannot assign to subscript of {}",
            other.typeof_()
        ))),
    }
}

fn set_length(handle: &mut Handle<ArrayData>, value: &Value) -> Result<(), Value> {
    let new_len = value
        .to_index()
        .ok_or_else(|| Value::range_error("Invalid array length"))?;
    let len = handle.read().len();
    if new_len == len {
        return Ok(());
    }
    if new_len > len && new_len - len > MAX_ARRAY_GAP {
        return Err(Value::type_error(format!(
            "Cannot extend array by more than {MAX_ARRAY_GAP} elements"
        )));
    }
    handle.get_mut().elements.resize(new_len, Value::Void);
    Ok(())
}

/// `delete target[key]`. Arrays keep a hole; objects drop the field and
/// keep the order of the rest.
pub fn delete(target: &mut Value, key: &Value) -> OpResult {
    match target {
        Value::Array(handle) => match key.to_index() {
            Some(index) => {
                if index < handle.read().len() {
                    if let Some(slot) = handle.get_mut().elements.get_mut(index) {
                        *slot = Value::Void;
                    }
                }
                Ok(Value::Bool(true))
            }
            None => Ok(Value::Bool(key.to_property_key() != "length")),
        },
        Value::Object(handle) => {
            let name = key.to_property_key();
            if handle.read().fields.contains_key(&name) {
                handle.get_mut().fields.shift_remove(&name);
            }
            Ok(Value::Bool(true))
        }
        Value::Class(handle) => {
            let name = key.to_property_key();
            if handle.read().statics.contains_key(&name) {
                handle.get_mut().statics.shift_remove(&name);
            }
            Ok(Value::Bool(true))
        }
        Value::Void | Value::Undefined | Value::Null => Err(Value::type_error(
            "Cannot convert undefined or null to object",
        )),
        _ => Ok(Value::Bool(true)),
    }
}

/// `++`/`--` in place.
pub fn increment(target: &mut Value, delta: i32) {
    match target {
        Value::Number(n) => *n += f64::from(delta),
        Value::BigInt(b) => *b += delta,
        other => *other = Value::Number(to_primitive(other).to_number() + f64::from(delta)),
    }
}
