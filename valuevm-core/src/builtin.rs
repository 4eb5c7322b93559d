//! Global builtin objects reachable from bytecode constants

use serde::{Deserialize, Serialize};

/// Builtin global values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Builtin {
    Error,
    TypeError,
    RangeError,
    InternalError,
    Number,
    String,
    Boolean,
    BigInt,
    Array,
    Math,
    Debug,
    #[serde(rename = "console")]
    Console,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Error => "Error",
            Builtin::TypeError => "TypeError",
            Builtin::RangeError => "RangeError",
            Builtin::InternalError => "InternalError",
            Builtin::Number => "Number",
            Builtin::String => "String",
            Builtin::Boolean => "Boolean",
            Builtin::BigInt => "BigInt",
            Builtin::Array => "Array",
            Builtin::Math => "Math",
            Builtin::Debug => "Debug",
            Builtin::Console => "console",
        }
    }

    /// The error kind constructed by this builtin, if it is an error class.
    pub fn error_kind(self) -> Option<&'static str> {
        match self {
            Builtin::Error | Builtin::TypeError | Builtin::RangeError | Builtin::InternalError => {
                Some(self.name())
            }
            _ => None,
        }
    }

    /// Whether the global can be called as a function.
    pub fn is_callable(self) -> bool {
        !matches!(self, Builtin::Math | Builtin::Debug | Builtin::Console)
    }
}
