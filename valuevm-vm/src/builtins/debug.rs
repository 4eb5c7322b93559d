//! The `Debug` and `console` globals
//!
//! Output goes through `tracing` rather than stdout, under the
//! `valuevm::debug` and `valuevm::console` targets.

use tracing::{debug, error, info, warn};
use valuevm_core::{NativeFunction, NativeResult, ThisArg, Value};

use super::arg;

pub static LOG: NativeFunction = NativeFunction::direct("log", log);
pub static MAKE_COPY_COUNTER: NativeFunction =
    NativeFunction::direct("makeCopyCounter", make_copy_counter);

pub static CONSOLE_LOG: NativeFunction = NativeFunction::direct("log", console_log);
pub static CONSOLE_INFO: NativeFunction = NativeFunction::direct("info", console_log);
pub static CONSOLE_DEBUG: NativeFunction = NativeFunction::direct("debug", console_debug);
pub static CONSOLE_WARN: NativeFunction = NativeFunction::direct("warn", console_warn);
pub static CONSOLE_ERROR: NativeFunction = NativeFunction::direct("error", console_error);

/// Member of the `console` global.
pub fn console_member(key: &str) -> Option<Value> {
    let native: &'static NativeFunction = match key {
        "log" => &CONSOLE_LOG,
        "info" => &CONSOLE_INFO,
        "debug" => &CONSOLE_DEBUG,
        "warn" => &CONSOLE_WARN,
        "error" => &CONSOLE_ERROR,
        _ => return None,
    };
    Some(Value::Native(native))
}

pub fn member(key: &str) -> Option<Value> {
    match key {
        "log" => Some(Value::Native(&LOG)),
        "makeCopyCounter" => Some(Value::Native(&MAKE_COPY_COUNTER)),
        _ => None,
    }
}

fn log(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    let line = args
        .iter()
        .map(Value::codify)
        .collect::<Vec<_>>()
        .join(" ");
    info!(target: "valuevm::debug", "{}", line);
    Ok(Value::Undefined)
}

/// Strings print bare, everything else in source form.
fn console_line(args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::String(s) => s.to_string(),
            other => other.codify(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console_log(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    info!(target: "valuevm::console", "{}", console_line(&args));
    Ok(Value::Undefined)
}

fn console_debug(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    debug!(target: "valuevm::console", "{}", console_line(&args));
    Ok(Value::Undefined)
}

fn console_warn(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    warn!(target: "valuevm::console", "{}", console_line(&args));
    Ok(Value::Undefined)
}

fn console_error(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    error!(target: "valuevm::console", "{}", console_line(&args));
    Ok(Value::Undefined)
}

fn make_copy_counter(_this: ThisArg<'_>, args: Vec<Value>) -> NativeResult {
    Ok(Value::copy_counter(arg(&args, 0)))
}
