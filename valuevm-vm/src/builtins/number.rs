//! Number and BigInt methods, and the `Number` and `BigInt` globals

use num_bigint::BigInt;
use num_traits::Zero;
use valuevm_core::value::number_to_string;
use valuevm_core::{NativeFunction, NativeResult, ThisArg, Value};

use super::arg;

pub static TO_STRING: NativeFunction = NativeFunction::direct("toString", to_string);
pub static TO_FIXED: NativeFunction = NativeFunction::direct("toFixed", to_fixed);
pub static TO_EXPONENTIAL: NativeFunction =
    NativeFunction::direct("toExponential", to_exponential);
pub static VALUE_OF: NativeFunction = NativeFunction::direct("valueOf", value_of);
pub static BIGINT_TO_STRING: NativeFunction =
    NativeFunction::direct("toString", bigint_to_string);
pub static BIGINT_VALUE_OF: NativeFunction = NativeFunction::direct("valueOf", value_of);

pub static IS_FINITE: NativeFunction = NativeFunction::direct("isFinite", is_finite);
pub static IS_INTEGER: NativeFunction = NativeFunction::direct("isInteger", is_integer);
pub static IS_NAN: NativeFunction = NativeFunction::direct("isNaN", is_nan);
pub static IS_SAFE_INTEGER: NativeFunction =
    NativeFunction::direct("isSafeInteger", is_safe_integer);
pub static PARSE_FLOAT: NativeFunction = NativeFunction::direct("parseFloat", parse_float);
pub static PARSE_INT: NativeFunction = NativeFunction::direct("parseInt", parse_int);

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Digits emitted after the point for non-integral values in a radix
/// other than 10.
const MAX_FRACTION_DIGITS: usize = 52;

pub fn method(name: &str) -> Option<&'static NativeFunction> {
    match name {
        "toString" => Some(&TO_STRING),
        "toFixed" => Some(&TO_FIXED),
        "toExponential" => Some(&TO_EXPONENTIAL),
        "valueOf" => Some(&VALUE_OF),
        _ => None,
    }
}

pub fn bigint_method(name: &str) -> Option<&'static NativeFunction> {
    match name {
        "toString" => Some(&BIGINT_TO_STRING),
        "valueOf" => Some(&BIGINT_VALUE_OF),
        _ => None,
    }
}

/// Member of the `Number` global.
pub fn member(key: &str) -> Option<Value> {
    let native: &'static NativeFunction = match key {
        "EPSILON" => return Some(Value::Number(f64::EPSILON)),
        "MAX_VALUE" => return Some(Value::Number(f64::MAX)),
        "MIN_VALUE" => return Some(Value::Number(f64::from_bits(1))),
        "MAX_SAFE_INTEGER" => return Some(Value::Number(MAX_SAFE_INTEGER)),
        "MIN_SAFE_INTEGER" => return Some(Value::Number(-MAX_SAFE_INTEGER)),
        "POSITIVE_INFINITY" => return Some(Value::Number(f64::INFINITY)),
        "NEGATIVE_INFINITY" => return Some(Value::Number(f64::NEG_INFINITY)),
        "NaN" => return Some(Value::Number(f64::NAN)),
        "isFinite" => &IS_FINITE,
        "isInteger" => &IS_INTEGER,
        "isNaN" => &IS_NAN,
        "isSafeInteger" => &IS_SAFE_INTEGER,
        "parseFloat" => &PARSE_FLOAT,
        "parseInt" => &PARSE_INT,
        _ => return None,
    };
    Some(Value::Native(native))
}

/// `Number(value)`
pub fn convert(args: &[Value]) -> Value {
    match args.first() {
        None => Value::Number(0.0),
        Some(value) => Value::Number(value.to_number()),
    }
}

/// `BigInt(value)`
pub fn convert_bigint(args: &[Value]) -> NativeResult {
    match arg(args, 0) {
        Value::BigInt(b) => Ok(Value::BigInt(b)),
        Value::Bool(b) => Ok(Value::BigInt(BigInt::from(u8::from(b)))),
        Value::Number(n) => {
            if n.is_finite() && n.fract() == 0.0 {
                let digits = format!("{n:.0}");
                Ok(Value::BigInt(digits.parse().unwrap_or_else(|_| BigInt::zero())))
            } else {
                Err(Value::range_error(format!(
                    "The number {} cannot be converted to a BigInt because it is not an integer",
                    number_to_string(n)
                )))
            }
        }
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Value::BigInt(BigInt::zero()));
            }
            trimmed
                .parse::<BigInt>()
                .map(Value::BigInt)
                .map_err(|_| Value::error("SyntaxError", format!("Cannot convert {s} to a BigInt")))
        }
        other => Err(Value::type_error(format!(
            "Cannot convert {} to a BigInt",
            other.codify()
        ))),
    }
}

fn radix(args: &[Value]) -> Result<u32, Value> {
    match args.first() {
        None | Some(Value::Void | Value::Undefined) => Ok(10),
        Some(value) => {
            let n = value.to_number();
            if n.fract() == 0.0 && (2.0..=36.0).contains(&n) {
                Ok(n as u32)
            } else {
                Err(Value::range_error(
                    "toString() radix must be between 2 and 36",
                ))
            }
        }
    }
}

fn to_string(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let Value::Number(n) = this.get() else {
        return Err(Value::type_error("Number.prototype.toString requires a number"));
    };
    let radix = radix(&args)?;
    if radix == 10 || !n.is_finite() {
        return Ok(Value::from(number_to_string(*n)));
    }
    Ok(Value::from(format_radix(*n, radix)))
}

fn format_radix(n: f64, radix: u32) -> String {
    let negative = n < 0.0;
    let n = n.abs();
    let mut integer = n.trunc();
    let mut fraction = n - integer;

    let mut digits = Vec::new();
    loop {
        let digit = (integer % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        integer = (integer / f64::from(radix)).trunc();
        if integer < 1.0 {
            break;
        }
    }
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.extend(digits.iter().rev());

    if fraction > 0.0 {
        out.push('.');
        for _ in 0..MAX_FRACTION_DIGITS {
            fraction *= f64::from(radix);
            let digit = fraction.trunc() as u32;
            out.push(std::char::from_digit(digit, radix).unwrap_or('0'));
            fraction -= fraction.trunc();
            if fraction == 0.0 {
                break;
            }
        }
    }
    out
}

fn to_fixed(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let Value::Number(n) = this.get() else {
        return Err(Value::type_error("Number.prototype.toFixed requires a number"));
    };
    let digits = match args.first() {
        None | Some(Value::Void | Value::Undefined) => 0.0,
        Some(value) => value.to_number().trunc(),
    };
    if !(0.0..=100.0).contains(&digits) {
        return Err(Value::range_error(
            "toFixed() digits argument must be between 0 and 100",
        ));
    }
    if !n.is_finite() || n.abs() >= 1e21 {
        return Ok(Value::from(number_to_string(*n)));
    }
    Ok(Value::from(fixed(*n, digits as usize)))
}

/// `n` with `digits` fraction digits. Halves round away from zero.
pub(crate) fn fixed(n: f64, digits: usize) -> String {
    let scale = 10f64.powi(digits as i32);
    let scaled = n * scale;
    // Beyond 2^53 every float is already integral at this scale
    let rounded = if scaled.abs() < 9_007_199_254_740_992.0 {
        scaled.round() / scale
    } else {
        n
    };
    format!("{:.*}", digits, rounded)
}

fn to_exponential(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let Value::Number(n) = this.get() else {
        return Err(Value::type_error("Number.prototype.toExponential requires a number"));
    };
    if !n.is_finite() {
        return Ok(Value::from(number_to_string(*n)));
    }
    let formatted = match args.first() {
        None | Some(Value::Void | Value::Undefined) => format!("{:e}", n),
        Some(value) => {
            let digits = value.to_number().trunc();
            if !(0.0..=100.0).contains(&digits) {
                return Err(Value::range_error(
                    "toExponential() argument must be between 0 and 100",
                ));
            }
            format!("{:.*e}", digits as usize, n)
        }
    };
    // JS always signs the exponent
    Ok(Value::from(match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }))
}

fn value_of(this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    match this.get() {
        value @ (Value::Number(_) | Value::BigInt(_)) => Ok(value.clone()),
        other => Err(Value::type_error(format!(
            "valueOf called on {}",
            other.typeof_()
        ))),
    }
}

// Number statics

fn is_finite(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(
        args.first().is_some_and(|v| v.to_number().is_finite()),
    ))
}

fn integral(args: &[Value]) -> Option<f64> {
    let n = args.first()?.to_number();
    (n.is_finite() && n.trunc() == n).then_some(n)
}

fn is_integer(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(integral(&args).is_some()))
}

fn is_safe_integer(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(
        integral(&args).is_some_and(|n| n.abs() <= MAX_SAFE_INTEGER),
    ))
}

fn is_nan(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Bool(args.first().is_some_and(|v| v.to_number().is_nan())))
}

/// Longest numeric prefix of `s`, after leading whitespace.
fn parse_float(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let text = arg(&args, 0).to_string();
    let s = text.trim_start();
    let (sign, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if unsigned.starts_with("Infinity") {
        return Ok(Value::Number(sign * f64::INFINITY));
    }
    let bytes = unsigned.as_bytes();
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };
    let mut end = digits(0);
    let mut mantissa_digits = end;
    if bytes.get(end) == Some(&b'.') {
        let fraction = digits(end + 1);
        mantissa_digits += fraction;
        end += 1 + fraction;
    }
    if mantissa_digits == 0 {
        return Ok(Value::Number(f64::NAN));
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let signed = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exponent = digits(end + 1 + signed);
        if exponent > 0 {
            end += 1 + signed + exponent;
        }
    }
    let n: f64 = unsigned[..end].parse().unwrap_or(f64::NAN);
    Ok(Value::Number(sign * n))
}

fn parse_int(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let text = arg(&args, 0).to_string();
    let s = text.trim_start();
    let (sign, mut digits) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    let mut radix = match args.get(1).map(Value::to_number) {
        None => 0,
        Some(r) if r.is_nan() => 0,
        Some(r) => r.trunc() as i64,
    };
    if radix != 0 && !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    if (radix == 0 || radix == 16) && (digits.starts_with("0x") || digits.starts_with("0X")) {
        digits = &digits[2..];
        radix = 16;
    }
    if radix == 0 {
        radix = 10;
    }
    let radix = radix as u32;
    let mut value = 0.0;
    let mut any = false;
    for digit in digits.chars().map_while(|c| c.to_digit(radix)) {
        value = value * f64::from(radix) + f64::from(digit);
        any = true;
    }
    Ok(Value::Number(if any { sign * value } else { f64::NAN }))
}

fn bigint_to_string(this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let Value::BigInt(b) = this.get() else {
        return Err(Value::type_error("BigInt.prototype.toString requires a BigInt"));
    };
    Ok(Value::from(b.to_str_radix(radix(&args)?)))
}
