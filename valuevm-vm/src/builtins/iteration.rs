//! Array iterators returned by `keys`, `values` and `entries`
//!
//! An iterator is an ordinary object holding the array and a cursor, with
//! `next` on its prototype. Advancing mutates the cursor, so `next` needs
//! an assignable receiver like any other mutating method.

use valuevm_core::{NativeFunction, NativeResult, ThisArg, Value};

pub static NEXT: NativeFunction = NativeFunction::direct("next", next);

const ARRAY_FIELD: &str = "array";
const INDEX_FIELD: &str = "index";
const KIND_FIELD: &str = "kind";

/// What each step of an array iterator yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterKind {
    Keys,
    Values,
    Entries,
}

impl IterKind {
    fn name(self) -> &'static str {
        match self {
            IterKind::Keys => "keys",
            IterKind::Values => "values",
            IterKind::Entries => "entries",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "keys" => Some(IterKind::Keys),
            "values" => Some(IterKind::Values),
            "entries" => Some(IterKind::Entries),
            _ => None,
        }
    }
}

fn prototype() -> Value {
    Value::object([("next", Value::Native(&NEXT))])
}

/// A fresh iterator over `array`.
pub fn array_iterator(array: Value, kind: IterKind) -> Value {
    Value::object_with_prototype(
        [
            (ARRAY_FIELD, array),
            (INDEX_FIELD, Value::Number(0.0)),
            (KIND_FIELD, Value::from(kind.name())),
        ],
        prototype(),
    )
}

fn step_result(value: Value, done: bool) -> Value {
    Value::object([("value", value), ("done", Value::Bool(done))])
}

fn next(mut this: ThisArg<'_>, _args: Vec<Value>) -> NativeResult {
    let not_an_iterator = || Value::type_error("next called on a non-iterator");
    let Value::Object(handle) = this.get_mut()? else {
        return Err(not_an_iterator());
    };
    let mut data = handle.get_mut();
    let kind = data
        .fields
        .get(KIND_FIELD)
        .and_then(Value::as_str)
        .and_then(IterKind::from_name)
        .ok_or_else(not_an_iterator)?;
    let index = data
        .fields
        .get(INDEX_FIELD)
        .map_or(0.0, Value::to_number) as usize;
    let element = match data.fields.get(ARRAY_FIELD).and_then(Value::as_array) {
        Some(array) if index < array.len() => array.get(index),
        Some(_) => return Ok(step_result(Value::Undefined, true)),
        None => return Err(not_an_iterator()),
    };
    data.fields
        .insert(INDEX_FIELD.to_string(), Value::Number(index as f64 + 1.0));
    let key = Value::Number(index as f64);
    let value = match kind {
        IterKind::Keys => key,
        IterKind::Values => element,
        IterKind::Entries => Value::array(vec![key, element]),
    };
    Ok(step_result(value, false))
}
