//! The `Math` global

use std::f64::consts;

use valuevm_core::{NativeFunction, NativeResult, ThisArg, Value};

use super::arg;

macro_rules! unary_math {
    ($static_name:ident, $name:literal, $op:expr) => {
        pub static $static_name: NativeFunction = NativeFunction::direct($name, {
            fn call(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
                let op: fn(f64) -> f64 = $op;
                Ok(Value::Number(op(arg(&args, 0).to_number())))
            }
            call
        });
    };
}

unary_math!(FLOOR, "floor", f64::floor);
unary_math!(CEIL, "ceil", f64::ceil);
unary_math!(TRUNC, "trunc", f64::trunc);
unary_math!(ABS, "abs", f64::abs);
unary_math!(SQRT, "sqrt", f64::sqrt);
unary_math!(CBRT, "cbrt", f64::cbrt);
unary_math!(EXP, "exp", f64::exp);
unary_math!(LOG, "log", f64::ln);
unary_math!(LOG2, "log2", f64::log2);
unary_math!(LOG10, "log10", f64::log10);
unary_math!(SIN, "sin", f64::sin);
unary_math!(COS, "cos", f64::cos);
unary_math!(TAN, "tan", f64::tan);
unary_math!(ASIN, "asin", f64::asin);
unary_math!(ACOS, "acos", f64::acos);
unary_math!(ATAN, "atan", f64::atan);
unary_math!(SIGN, "sign", |n: f64| if n == 0.0 || n.is_nan() { n } else { n.signum() });
// Halves round towards +Infinity
unary_math!(ROUND, "round", |n: f64| (n + 0.5).floor());

pub static MIN: NativeFunction = NativeFunction::direct("min", min);
pub static MAX: NativeFunction = NativeFunction::direct("max", max);
pub static POW: NativeFunction = NativeFunction::direct("pow", pow);
pub static ATAN2: NativeFunction = NativeFunction::direct("atan2", atan2);
pub static HYPOT: NativeFunction = NativeFunction::direct("hypot", hypot);

pub fn member(key: &str) -> Option<Value> {
    let native: &'static NativeFunction = match key {
        "PI" => return Some(Value::Number(consts::PI)),
        "E" => return Some(Value::Number(consts::E)),
        "LN2" => return Some(Value::Number(consts::LN_2)),
        "LN10" => return Some(Value::Number(consts::LN_10)),
        "LOG2E" => return Some(Value::Number(consts::LOG2_E)),
        "LOG10E" => return Some(Value::Number(consts::LOG10_E)),
        "SQRT2" => return Some(Value::Number(consts::SQRT_2)),
        "SQRT1_2" => return Some(Value::Number(consts::FRAC_1_SQRT_2)),
        "floor" => &FLOOR,
        "ceil" => &CEIL,
        "round" => &ROUND,
        "trunc" => &TRUNC,
        "abs" => &ABS,
        "sqrt" => &SQRT,
        "min" => &MIN,
        "max" => &MAX,
        "pow" => &POW,
        "cbrt" => &CBRT,
        "exp" => &EXP,
        "log" => &LOG,
        "log2" => &LOG2,
        "log10" => &LOG10,
        "sin" => &SIN,
        "cos" => &COS,
        "tan" => &TAN,
        "asin" => &ASIN,
        "acos" => &ACOS,
        "atan" => &ATAN,
        "atan2" => &ATAN2,
        "hypot" => &HYPOT,
        "sign" => &SIGN,
        _ => return None,
    };
    Some(Value::Native(native))
}

fn fold(args: &[Value], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    args.iter().fold(init, |acc, value| {
        let n = value.to_number();
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            pick(acc, n)
        }
    })
}

fn min(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Number(fold(&args, f64::INFINITY, f64::min)))
}

fn max(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::Number(fold(&args, f64::NEG_INFINITY, f64::max)))
}

fn pow(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let base = arg(&args, 0).to_number();
    let exponent = arg(&args, 1).to_number();
    Ok(Value::Number(base.powf(exponent)))
}

fn atan2(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let y = arg(&args, 0).to_number();
    let x = arg(&args, 1).to_number();
    Ok(Value::Number(y.atan2(x)))
}

fn hypot(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let sum: f64 = args.iter().map(|v| v.to_number().powi(2)).sum();
    Ok(Value::Number(sum.sqrt()))
}
