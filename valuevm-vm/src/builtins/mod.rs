//! Native methods and builtin globals
//!
//! Natives are plain `static` [`NativeFunction`]s so a method read produces a
//! `Value::Native` without allocating. Each submodule resolves the methods of
//! one kind of receiver.

pub mod array;
mod array_frames;
pub mod debug;
pub mod error;
pub mod iteration;
pub mod math;
pub mod number;
pub mod string;


use valuevm_core::{Builtin, NativeFunction, Value};

use crate::operations::OpResult;

/// Method of an array receiver.
pub fn array_method(name: &str) -> Option<&'static NativeFunction> {
    array::method(name)
}

/// Method of a string receiver.
pub fn string_method(name: &str) -> Option<&'static NativeFunction> {
    string::method(name)
}

/// Method of a number receiver.
pub fn number_method(name: &str) -> Option<&'static NativeFunction> {
    number::method(name)
}

/// Method of a BigInt receiver.
pub fn bigint_method(name: &str) -> Option<&'static NativeFunction> {
    number::bigint_method(name)
}

/// Member of a builtin global, e.g. `Math.floor` or `Number.isNaN`.
pub fn builtin_member(builtin: Builtin, key: &str) -> Option<Value> {
    match builtin {
        Builtin::Math => math::member(key),
        Builtin::Debug => debug::member(key),
        Builtin::Console => debug::console_member(key),
        Builtin::Number => number::member(key),
        Builtin::String => string::member(key),
        Builtin::Array => array::member(key),
        Builtin::Error
        | Builtin::TypeError
        | Builtin::RangeError
        | Builtin::InternalError
        | Builtin::Boolean
        | Builtin::BigInt => None,
    }
}

/// Call a builtin global as a function.
pub fn call_builtin(builtin: Builtin, args: Vec<Value>) -> OpResult {
    if let Some(kind) = builtin.error_kind() {
        return Ok(error::construct(kind, &args));
    }
    match builtin {
        Builtin::Number => Ok(number::convert(&args)),
        Builtin::String => Ok(string::convert(&args)),
        Builtin::Boolean => Ok(Value::Bool(
            args.first().is_some_and(Value::is_truthy),
        )),
        Builtin::BigInt => number::convert_bigint(&args),
        Builtin::Array => array::construct(args),
        _ => Err(Value::type_error(format!(
            "{} is not a function",
            builtin.name()
        ))),
    }
}

/// `new builtin(...args)`. Only the error classes and `Array` construct;
/// wrapper objects for primitives do not exist.
pub fn construct_builtin(builtin: Builtin, args: Vec<Value>) -> OpResult {
    match (builtin, builtin.error_kind()) {
        (_, Some(kind)) => Ok(error::construct(kind, &args)),
        (Builtin::Array, None) => array::construct(args),
        _ => Err(Value::type_error(format!(
            "{} is not a constructor",
            builtin.name()
        ))),
    }
}

/// Resolve a possibly negative position argument against `len`, the way
/// `slice` and `at` do. Missing or `undefined` arguments give `default`.
pub(crate) fn relative_index(arg: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(value) = arg.filter(|v| !v.is_undefined()) else {
        return default;
    };
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// Argument `index`, or `undefined` when absent.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index)
        .cloned()
        .map_or(Value::Undefined, Value::or_undefined)
}
