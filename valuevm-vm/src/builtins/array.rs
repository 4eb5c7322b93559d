//! Array methods
//!
//! Mutating methods go through [`ThisArg::get_mut`], so they refuse const
//! receivers and copy the payload only when it is shared. Methods taking a
//! callback run as native frames, see [`array_frames`](super::array_frames).

use valuevm_core::{strict_equals, ArrayData, NativeFunction, NativeResult, ThisArg, Value};

use super::array_frames::{
    make_every, make_filter, make_find, make_find_index, make_flat_map, make_map, make_reduce,
    make_reduce_right, make_some, make_sort,
};
use super::iteration::{array_iterator, IterKind};
use super::{arg, relative_index};

pub static PUSH: NativeFunction = NativeFunction::direct("push", push);
pub static POP: NativeFunction = NativeFunction::direct("pop", pop);
pub static SHIFT: NativeFunction = NativeFunction::direct("shift", shift);
pub static UNSHIFT: NativeFunction = NativeFunction::direct("unshift", unshift);
pub static SLICE: NativeFunction = NativeFunction::direct("slice", slice);
pub static CONCAT: NativeFunction = NativeFunction::direct("concat", concat);
pub static INCLUDES: NativeFunction = NativeFunction::direct("includes", includes);
pub static INDEX_OF: NativeFunction = NativeFunction::direct("indexOf", index_of);
pub static JOIN: NativeFunction = NativeFunction::direct("join", join);
pub static REVERSE: NativeFunction = NativeFunction::direct("reverse", reverse);
pub static AT: NativeFunction = NativeFunction::direct("at", at);
pub static SPLICE: NativeFunction = NativeFunction::direct("splice", splice);
pub static FILL: NativeFunction = NativeFunction::direct("fill", fill);
pub static COPY_WITHIN: NativeFunction = NativeFunction::direct("copyWithin", copy_within);
pub static LAST_INDEX_OF: NativeFunction = NativeFunction::direct("lastIndexOf", last_index_of);
pub static FLAT: NativeFunction = NativeFunction::direct("flat", flat);
pub static TO_STRING: NativeFunction = NativeFunction::direct("toString", to_string);
pub static KEYS: NativeFunction = NativeFunction::direct("keys", keys);
pub static VALUES: NativeFunction = NativeFunction::direct("values", values);
pub static ENTRIES: NativeFunction = NativeFunction::direct("entries", entries);

pub static MAP: NativeFunction = NativeFunction::frame("map", make_map, false);
pub static FILTER: NativeFunction = NativeFunction::frame("filter", make_filter, false);
pub static REDUCE: NativeFunction = NativeFunction::frame("reduce", make_reduce, false);
pub static REDUCE_RIGHT: NativeFunction =
    NativeFunction::frame("reduceRight", make_reduce_right, false);
pub static FIND: NativeFunction = NativeFunction::frame("find", make_find, false);
pub static FIND_INDEX: NativeFunction = NativeFunction::frame("findIndex", make_find_index, false);
pub static EVERY: NativeFunction = NativeFunction::frame("every", make_every, false);
pub static SOME: NativeFunction = NativeFunction::frame("some", make_some, false);
pub static FLAT_MAP: NativeFunction = NativeFunction::frame("flatMap", make_flat_map, false);
pub static SORT: NativeFunction = NativeFunction::frame("sort", make_sort, true);

pub static IS_ARRAY: NativeFunction = NativeFunction::direct("isArray", is_array);
pub static FROM: NativeFunction = NativeFunction::direct("from", from);
pub static OF: NativeFunction = NativeFunction::direct("of", of);

/// Member of the `Array` global.
pub fn member(key: &str) -> Option<Value> {
    let native: &'static NativeFunction = match key {
        "isArray" => &IS_ARRAY,
        "from" => &FROM,
        "of" => &OF,
        _ => return None,
    };
    Some(Value::Native(native))
}

/// `Array(...)` and `new Array(...)`. A single number argument is a length
/// and gives that many holes.
pub fn construct(args: Vec<Value>) -> NativeResult {
    match args.as_slice() {
        [Value::Number(n)] => {
            if n.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(n) {
                Ok(Value::array(vec![Value::Void; *n as usize]))
            } else {
                Err(Value::range_error("Invalid array length"))
            }
        }
        _ => Ok(Value::array(args)),
    }
}

pub fn method(name: &str) -> Option<&'static NativeFunction> {
    Some(match name {
        "push" => &PUSH,
        "pop" => &POP,
        "shift" => &SHIFT,
        "unshift" => &UNSHIFT,
        "slice" => &SLICE,
        "concat" => &CONCAT,
        "includes" => &INCLUDES,
        "indexOf" => &INDEX_OF,
        "join" => &JOIN,
        "reverse" => &REVERSE,
        "at" => &AT,
        "splice" => &SPLICE,
        "fill" => &FILL,
        "copyWithin" => &COPY_WITHIN,
        "lastIndexOf" => &LAST_INDEX_OF,
        "flat" => &FLAT,
        "toString" => &TO_STRING,
        "keys" => &KEYS,
        "values" => &VALUES,
        "entries" => &ENTRIES,
        "map" => &MAP,
        "filter" => &FILTER,
        "reduce" => &REDUCE,
        "reduceRight" => &REDUCE_RIGHT,
        "find" => &FIND,
        "findIndex" => &FIND_INDEX,
        "every" => &EVERY,
        "some" => &SOME,
        "flatMap" => &FLAT_MAP,
        "sort" => &SORT,
        _ => return None,
    })
}

fn not_an_array(this: &Value) -> Value {
    Value::type_error(format!("Array method called on {}", this.typeof_()))
}

fn read<'a>(this: &'a ThisArg<'_>) -> Result<&'a ArrayData, Value> {
    match this.get() {
        Value::Array(handle) => Ok(handle.read()),
        other => Err(not_an_array(other)),
    }
}

fn with_elements<R>(
    this: &mut ThisArg<'_>,
    f: impl FnOnce(&mut Vec<Value>) -> R,
) -> Result<R, Value> {
    match this.get_mut()? {
        Value::Array(handle) => Ok(f(&mut handle.get_mut().elements)),
        other => Err(not_an_array(other)),
    }
}

// Mutators

fn push(mut this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let len = with_elements(&mut this, |elements| {
        elements.extend(args);
        elements.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn pop(mut this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    if read(&this)?.is_empty() {
        this.get_mut()?;
        return Ok(Value::Undefined);
    }
    let popped = with_elements(&mut this, Vec::pop)?;
    Ok(popped.map_or(Value::Undefined, Value::or_undefined))
}

fn shift(mut this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    if read(&this)?.is_empty() {
        this.get_mut()?;
        return Ok(Value::Undefined);
    }
    let shifted = with_elements(&mut this, |elements| elements.remove(0))?;
    Ok(shifted.or_undefined())
}

fn unshift(mut this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let len = with_elements(&mut this, |elements| {
        let mut front = args;
        front.append(elements);
        *elements = front;
        elements.len()
    })?;
    Ok(Value::Number(len as f64))
}

fn reverse(mut this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    with_elements(&mut this, |elements| elements.reverse())?;
    Ok(this.get().clone())
}

/// Clamp a count argument to `0..=max`; absent means `max`.
fn count_arg(value: Option<&Value>, max: usize) -> usize {
    match value {
        None => max,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() || n <= 0.0 {
                0
            } else {
                n.trunc().min(max as f64) as usize
            }
        }
    }
}

fn splice(mut this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let len = read(&this)?.len();
    let start = relative_index(args.first(), len, 0);
    let delete_count = if args.is_empty() {
        0
    } else {
        count_arg(args.get(1), len - start)
    };
    let inserted: Vec<Value> = args.into_iter().skip(2).collect();
    let removed = with_elements(&mut this, |elements| {
        elements
            .splice(start..start + delete_count, inserted)
            .collect::<Vec<_>>()
    })?;
    Ok(Value::array(removed))
}

fn fill(mut this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let len = read(&this)?.len();
    let value = arg(&args, 0);
    let start = relative_index(args.get(1), len, 0);
    let end = relative_index(args.get(2), len, len);
    with_elements(&mut this, |elements| {
        for slot in elements.iter_mut().take(end).skip(start) {
            *slot = value.clone();
        }
    })?;
    Ok(this.get().clone())
}

fn copy_within(mut this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let len = read(&this)?.len();
    let target = relative_index(args.first(), len, 0);
    let start = relative_index(args.get(1), len, 0);
    let end = relative_index(args.get(2), len, len);
    let count = end.saturating_sub(start).min(len - target);
    if count > 0 {
        with_elements(&mut this, |elements| {
            let chunk = elements[start..start + count].to_vec();
            elements[target..target + count].clone_from_slice(&chunk);
        })?;
    }
    Ok(this.get().clone())
}

// Accessors

fn slice(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let data = read(&this)?;
    let len = data.len();
    let start = relative_index(args.first(), len, 0);
    let end = relative_index(args.get(1), len, len);
    if start >= end {
        return Ok(Value::array(Vec::new()));
    }
    Ok(Value::array(
        data.elements
            .iter()
            .skip(start)
            .take(end - start)
            .cloned()
            .collect(),
    ))
}

fn concat(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let mut elements = read(&this)?.elements.clone();
    for value in args {
        match value {
            Value::Array(other) => elements.extend(other.read().elements.iter().cloned()),
            other => elements.push(other),
        }
    }
    Ok(Value::array(elements))
}

/// `SameValueZero`: `===` except that NaN matches NaN.
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        (Value::Void, other) => other.is_undefined(),
        _ => strict_equals(a, b),
    }
}

fn includes(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let needle = arg(&args, 0);
    let found = read(&this)?
        .elements
        .iter()
        .any(|element| same_value_zero(element, &needle));
    Ok(Value::Bool(found))
}

fn index_of(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let needle = arg(&args, 0);
    let position = read(&this)?
        .elements
        .iter()
        .position(|element| !element.is_void() && strict_equals(element, &needle));
    Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
}

fn last_index_of(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let needle = arg(&args, 0);
    let position = read(&this)?
        .elements
        .iter()
        .rposition(|element| !element.is_void() && strict_equals(element, &needle));
    Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
}

fn flatten_into(out: &mut Vec<Value>, elements: &[Value], depth: f64) {
    for element in elements {
        match element {
            Value::Void => {}
            Value::Array(inner) if depth >= 1.0 => {
                flatten_into(out, &inner.read().elements, depth - 1.0)
            }
            other => out.push(other.clone()),
        }
    }
}

fn flat(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let depth = match args.first() {
        None | Some(Value::Void | Value::Undefined) => 1.0,
        Some(depth) => {
            let n = depth.to_number();
            if n.is_nan() {
                0.0
            } else {
                n.trunc()
            }
        }
    };
    let mut flattened = Vec::new();
    flatten_into(&mut flattened, &read(&this)?.elements, depth);
    Ok(Value::array(flattened))
}

fn to_string(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    join(this, Vec::new())
}

fn iterator(this: &ThisArg<'_>, kind: IterKind) -> NativeResult {
    read(this)?;
    Ok(array_iterator(this.get().clone(), kind))
}

fn keys(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    iterator(&this, IterKind::Keys)
}

fn values(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    iterator(&this, IterKind::Values)
}

fn entries(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    iterator(&this, IterKind::Entries)
}

fn join(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let separator = match args.first() {
        None | Some(Value::Void | Value::Undefined) => ",".to_string(),
        Some(sep) => sep.to_string(),
    };
    let parts: Vec<String> = read(&this)?
        .elements
        .iter()
        .map(|element| {
            if element.is_nullish() {
                String::new()
            } else {
                element.to_string()
            }
        })
        .collect();
    Ok(Value::from(parts.join(&separator)))
}

fn at(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let data = read(&this)?;
    let n = arg(&args, 0).to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { data.len() as f64 + n } else { n };
    if index < 0.0 || index >= data.len() as f64 {
        return Ok(Value::Undefined);
    }
    Ok(data.get(index as usize))
}

// Statics

fn is_array(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_)))))
}

/// Copies arrays and splits strings into characters. A mapping function is
/// not supported.
fn from(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    if args.len() > 1 {
        return Err(Value::type_error("Array.from does not support a mapping function"));
    }
    match arg(&args, 0) {
        Value::Array(handle) => Ok(Value::array(
            handle.read().elements.iter().cloned().map(Value::or_undefined).collect(),
        )),
        Value::String(s) => Ok(Value::array(
            s.chars().map(|c| Value::from(c.to_string())).collect(),
        )),
        Value::Undefined | Value::Null => {
            Err(Value::type_error("items is not iterable"))
        }
        _ => Ok(Value::array(Vec::new())),
    }
}

fn of(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::array(args))
}
