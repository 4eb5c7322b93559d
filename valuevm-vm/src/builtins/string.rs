//! String methods
//!
//! Positions are byte offsets into the UTF-8 encoding. `slice` cuts at
//! those offsets and replaces partial characters with U+FFFD.

use std::rc::Rc;

use valuevm_core::{string_at_byte, NativeFunction, NativeResult, ThisArg, Value};

use super::{arg, relative_index};

pub static TO_UPPER_CASE: NativeFunction =
    NativeFunction::direct("toUpperCase", to_upper_case);
pub static TO_LOWER_CASE: NativeFunction =
    NativeFunction::direct("toLowerCase", to_lower_case);
pub static INCLUDES: NativeFunction = NativeFunction::direct("includes", includes);
pub static INDEX_OF: NativeFunction = NativeFunction::direct("indexOf", index_of);
pub static LAST_INDEX_OF: NativeFunction =
    NativeFunction::direct("lastIndexOf", last_index_of);
pub static STARTS_WITH: NativeFunction = NativeFunction::direct("startsWith", starts_with);
pub static ENDS_WITH: NativeFunction = NativeFunction::direct("endsWith", ends_with);
pub static SLICE: NativeFunction = NativeFunction::direct("slice", slice);
pub static SUBSTRING: NativeFunction = NativeFunction::direct("substring", substring);
pub static TRIM: NativeFunction = NativeFunction::direct("trim", trim);
pub static TRIM_START: NativeFunction = NativeFunction::direct("trimStart", trim_start);
pub static TRIM_END: NativeFunction = NativeFunction::direct("trimEnd", trim_end);
pub static SPLIT: NativeFunction = NativeFunction::direct("split", split);
pub static AT: NativeFunction = NativeFunction::direct("at", at);
pub static CHAR_AT: NativeFunction = NativeFunction::direct("charAt", char_at);
pub static CHAR_CODE_AT: NativeFunction = NativeFunction::direct("charCodeAt", char_code_at);
pub static CODE_POINT_AT: NativeFunction =
    NativeFunction::direct("codePointAt", code_point_at);
pub static PAD_START: NativeFunction = NativeFunction::direct("padStart", pad_start);
pub static PAD_END: NativeFunction = NativeFunction::direct("padEnd", pad_end);
pub static REPEAT: NativeFunction = NativeFunction::direct("repeat", repeat);
pub static REPLACE: NativeFunction = NativeFunction::direct("replace", replace);
pub static REPLACE_ALL: NativeFunction = NativeFunction::direct("replaceAll", replace_all);
pub static CONCAT: NativeFunction = NativeFunction::direct("concat", concat);
pub static TO_STRING: NativeFunction = NativeFunction::direct("toString", value_of);
pub static VALUE_OF: NativeFunction = NativeFunction::direct("valueOf", value_of);

pub static FROM_CHAR_CODE: NativeFunction =
    NativeFunction::direct("fromCharCode", from_char_code);
pub static FROM_CODE_POINT: NativeFunction =
    NativeFunction::direct("fromCodePoint", from_code_point);

/// Longest string `repeat` and the padding methods will build.
const MAX_STRING_BYTES: usize = 1 << 28;

pub fn method(name: &str) -> Option<&'static NativeFunction> {
    Some(match name {
        "toUpperCase" => &TO_UPPER_CASE,
        "toLowerCase" => &TO_LOWER_CASE,
        "includes" => &INCLUDES,
        "indexOf" => &INDEX_OF,
        "lastIndexOf" => &LAST_INDEX_OF,
        "startsWith" => &STARTS_WITH,
        "endsWith" => &ENDS_WITH,
        "slice" => &SLICE,
        "substring" => &SUBSTRING,
        "trim" => &TRIM,
        "trimStart" => &TRIM_START,
        "trimEnd" => &TRIM_END,
        "split" => &SPLIT,
        "at" => &AT,
        "charAt" => &CHAR_AT,
        "charCodeAt" => &CHAR_CODE_AT,
        "codePointAt" => &CODE_POINT_AT,
        "padStart" => &PAD_START,
        "padEnd" => &PAD_END,
        "repeat" => &REPEAT,
        "replace" => &REPLACE,
        "replaceAll" => &REPLACE_ALL,
        "concat" => &CONCAT,
        "toString" => &TO_STRING,
        "valueOf" => &VALUE_OF,
        _ => return None,
    })
}

/// Member of the `String` global.
pub fn member(key: &str) -> Option<Value> {
    match key {
        "fromCharCode" => Some(Value::Native(&FROM_CHAR_CODE)),
        "fromCodePoint" => Some(Value::Native(&FROM_CODE_POINT)),
        _ => None,
    }
}

/// `String(value)`
pub fn convert(args: &[Value]) -> Value {
    match args.first() {
        None => Value::from(""),
        Some(s @ Value::String(_)) => s.clone(),
        Some(value) => Value::from(value.to_string()),
    }
}

fn receiver(this: &ThisArg<'_>) -> Result<Rc<str>, Value> {
    match this.get() {
        Value::String(s) => Ok(Rc::clone(s)),
        other => Err(Value::type_error(format!(
            "String method called on {}",
            other.typeof_()
        ))),
    }
}

fn search_string(args: &[Value]) -> String {
    arg(args, 0).to_string()
}

fn to_upper_case(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::from(receiver(&this)?.to_uppercase()))
}

fn to_lower_case(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::from(receiver(&this)?.to_lowercase()))
}

fn includes(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    Ok(Value::Bool(s.contains(search_string(&args).as_str())))
}

fn index_of(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let position = s.find(search_string(&args).as_str());
    Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
}

fn starts_with(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    Ok(Value::Bool(s.starts_with(search_string(&args).as_str())))
}

fn ends_with(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    Ok(Value::Bool(s.ends_with(search_string(&args).as_str())))
}

fn slice(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let bytes = s.as_bytes();
    let start = relative_index(args.first(), bytes.len(), 0);
    let end = relative_index(args.get(1), bytes.len(), bytes.len());
    let cut = bytes.get(start..end).unwrap_or_default();
    Ok(Value::from(String::from_utf8_lossy(cut).into_owned()))
}

fn trim(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::from(receiver(&this)?.trim()))
}

fn split(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::Void | Value::Undefined) => vec![Value::String(s)],
        Some(separator) => {
            let separator = separator.to_string();
            if separator.is_empty() {
                s.chars().map(|c| Value::from(c.to_string())).collect()
            } else {
                s.split(separator.as_str()).map(Value::from).collect()
            }
        }
    };
    Ok(Value::array(parts))
}

fn last_index_of(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let position = s.rfind(search_string(&args).as_str());
    Ok(Value::Number(position.map_or(-1.0, |p| p as f64)))
}

/// Byte range of `s` between two clamped positions, in either order.
fn substring(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let len = s.len();
    let clamp = |value: Option<&Value>, default: usize| match value {
        None | Some(Value::Void | Value::Undefined) => default,
        Some(value) => {
            let n = value.to_number();
            if n.is_nan() || n < 0.0 {
                0
            } else {
                n.trunc().min(len as f64) as usize
            }
        }
    };
    let a = clamp(args.first(), 0);
    let b = clamp(args.get(1), len);
    let cut = s.as_bytes().get(a.min(b)..a.max(b)).unwrap_or_default();
    Ok(Value::from(String::from_utf8_lossy(cut).into_owned()))
}

fn trim_start(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::from(receiver(&this)?.trim_start()))
}

fn trim_end(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::from(receiver(&this)?.trim_end()))
}

/// A byte offset argument; `None` when out of range.
fn byte_index(value: Option<&Value>, len: usize, wrap: bool) -> Option<usize> {
    let n = value.map_or(0.0, Value::to_number);
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let n = if wrap && n < 0.0 { len as f64 + n } else { n };
    (n >= 0.0 && n < len as f64).then_some(n as usize)
}

fn at(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    Ok(match byte_index(args.first(), s.len(), true) {
        Some(index) => string_at_byte(&s, index),
        None => Value::Undefined,
    })
}

fn char_at(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    Ok(match byte_index(args.first(), s.len(), false) {
        Some(index) => string_at_byte(&s, index),
        None => Value::from(""),
    })
}

fn char_code_at(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let byte = byte_index(args.first(), s.len(), false)
        .and_then(|i| s.as_bytes().get(i).copied());
    Ok(Value::Number(byte.map_or(f64::NAN, f64::from)))
}

fn code_point_at(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let code_point = byte_index(args.first(), s.len(), false)
        .filter(|&i| s.is_char_boundary(i))
        .and_then(|i| s[i..].chars().next());
    Ok(code_point.map_or(Value::Undefined, |c| Value::Number(f64::from(u32::from(c)))))
}

fn padding(s: &str, args: &[Value]) -> Result<String, Value> {
    let target = arg(args, 0).to_number();
    let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
    if target > MAX_STRING_BYTES {
        return Err(Value::range_error("Invalid string length"));
    }
    let filler = match args.get(1) {
        None | Some(Value::Void | Value::Undefined) => " ".to_string(),
        Some(filler) => filler.to_string(),
    };
    let missing = target.saturating_sub(s.len());
    if missing == 0 || filler.is_empty() {
        return Ok(String::new());
    }
    let mut pad: String = filler.repeat(missing / filler.len() + 1);
    let mut cut = missing;
    while !pad.is_char_boundary(cut) {
        cut -= 1;
    }
    pad.truncate(cut);
    Ok(pad)
}

fn pad_start(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let pad = padding(&s, &args)?;
    Ok(Value::from(pad + &*s))
}

fn pad_end(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let pad = padding(&s, &args)?;
    Ok(Value::from(format!("{s}{pad}")))
}

fn repeat(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let count = arg(&args, 0).to_number();
    let count = if count.is_nan() { 0.0 } else { count.trunc() };
    if count < 0.0 || count.is_infinite() {
        return Err(Value::range_error(format!(
            "Invalid count value: {}",
            Value::Number(count)
        )));
    }
    if s.len() as f64 * count > MAX_STRING_BYTES as f64 {
        return Err(Value::range_error("Invalid string length"));
    }
    Ok(Value::from(s.repeat(count as usize)))
}

fn replace(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let pattern = search_string(&args);
    let replacement = arg(&args, 1).to_string();
    Ok(Value::from(s.replacen(pattern.as_str(), &replacement, 1)))
}

fn replace_all(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let s = receiver(&this)?;
    let pattern = search_string(&args);
    let replacement = arg(&args, 1).to_string();
    Ok(Value::from(s.replace(pattern.as_str(), &replacement)))
}

fn concat(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let mut s = receiver(&this)?.to_string();
    for value in &args {
        s.push_str(&value.to_string());
    }
    Ok(Value::from(s))
}

fn value_of(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    Ok(Value::String(receiver(&this)?))
}

/// Lone surrogates become U+FFFD.
fn from_char_code(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let units: Vec<u16> = args
        .iter()
        .map(|v| {
            let n = v.to_number();
            if n.is_finite() {
                n.trunc().rem_euclid(65536.0) as u16
            } else {
                0
            }
        })
        .collect();
    Ok(Value::from(String::from_utf16_lossy(&units)))
}

fn from_code_point(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let mut s = String::new();
    for value in &args {
        let n = value.to_number();
        let c = (n.fract() == 0.0 && (0.0..=1_114_111.0).contains(&n))
            .then(|| char::from_u32(n as u32))
            .flatten()
            .ok_or_else(|| {
                Value::range_error(format!("Invalid code point {}", Value::Number(n)))
            })?;
        s.push(c);
    }
    Ok(Value::from(s))
}
