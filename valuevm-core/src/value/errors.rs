use std::rc::Rc;

use super::Value;

/// Message of the type error raised when a non-assignable receiver would be
/// mutated.
pub const CONST_MUTATION_MESSAGE: &str = "Cannot mutate this because it is const";

impl Value {
    /// Prototype shared by error objects of `kind`.
    pub fn error_prototype(kind: &str) -> Value {
        Value::object([("name", Value::from(kind))])
    }

    /// An error object of `kind` with a `message` field.
    pub fn error(kind: &str, message: impl Into<String>) -> Value {
        Value::object_with_prototype(
            [("message", Value::from(message.into()))],
            Value::error_prototype(kind),
        )
    }

    pub fn type_error(message: impl Into<String>) -> Value {
        Value::error("TypeError", message)
    }

    pub fn range_error(message: impl Into<String>) -> Value {
        Value::error("RangeError", message)
    }

    /// The `name` of an error-shaped object: an object with a `message`
    /// field whose prototype carries a string `name`.
    pub fn error_name(&self) -> Option<Rc<str>> {
        let Value::Object(object) = self else {
            return None;
        };
        let data = object.read();
        if !data.fields.contains_key("message") {
            return None;
        }
        match &data.prototype {
            Some(Value::Object(proto)) => match proto.read().fields.get("name") {
                Some(Value::String(name)) => Some(Rc::clone(name)),
                _ => None,
            },
            _ => None,
        }
    }

    /// The `message` field of an error-shaped object.
    pub fn error_message(&self) -> Option<String> {
        self.error_name()?;
        self.get_field("message").map(|m| m.to_string())
    }
}
