//! ValueVM core
//!
//! Runtime value representation for a value-semantics language: every
//! binding behaves as if it owns its data, while payloads are shared through
//! reference-counted copy-on-write handles until a mutation would make the
//! sharing observable.

pub mod builtin;
pub mod content_hash;
pub mod handle;
pub mod native;
pub mod value;

pub use builtin::Builtin;
pub use content_hash::{content_hash, loose_equals, strict_equals, ContentHash};
pub use handle::{store_stats, Handle, Payload, PayloadMut, StoreStats};
pub use native::{
    DirectFn, FrameStep, MakeFrameFn, NativeCall, NativeFrame, NativeFunction, NativeResult,
    ThisArg,
};
pub use value::{
    string_at_byte, ArrayData, BodyRef, ClassData, CopyCounter, FunctionData, ObjectData, Value,
    CONST_MUTATION_MESSAGE,
};

#[cfg(test)]
mod content_hash_tests;
