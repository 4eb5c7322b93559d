//! The error classes: `Error`, `TypeError`, `RangeError` and `InternalError`

use valuevm_core::Value;

/// Build an error object of `kind`. The message is the first argument
/// converted to a string, or empty when absent.
pub fn construct(kind: &str, args: &[Value]) -> Value {
    let message = match args.first() {
        None | Some(Value::Void | Value::Undefined) => String::new(),
        Some(message) => message.to_string(),
    };
    Value::error(kind, message)
}
