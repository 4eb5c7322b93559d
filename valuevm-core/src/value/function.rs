use std::cell::OnceCell;
use std::mem::size_of;
use std::rc::Rc;

use indexmap::IndexMap;

use super::Value;
use crate::content_hash::ContentHash;
use crate::handle::Payload;

/// Reference to a loaded bytecode body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodyRef {
    /// Index of the body in its program.
    pub index: usize,
    pub name: Rc<str>,
    /// Structural digest of the body computed at load time.
    pub digest: ContentHash,
}

/// A function body together with its captured values.
#[derive(Clone, Debug)]
pub struct FunctionData {
    pub body: BodyRef,
    pub captures: Vec<Value>,
    pub(crate) hash: OnceCell<ContentHash>,
}

impl FunctionData {
    pub fn new(body: BodyRef, captures: Vec<Value>) -> Self {
        FunctionData {
            body,
            captures,
            hash: OnceCell::new(),
        }
    }
}

impl Payload for FunctionData {
    fn footprint(&self) -> usize {
        size_of::<Self>() + self.captures.len() * size_of::<Value>()
    }

    fn invalidate(&mut self) {
        self.hash.take();
    }
}

/// A class: constructor, method prototype and static members.
#[derive(Clone, Debug)]
pub struct ClassData {
    pub name: Rc<str>,
    /// `Value::Function` or `Value::Undefined` when there is no constructor.
    pub constructor: Value,
    /// Object holding the methods shared by instances.
    pub prototype: Value,
    pub statics: IndexMap<String, Value>,
    pub(crate) hash: OnceCell<ContentHash>,
}

impl ClassData {
    pub fn new(
        name: impl Into<Rc<str>>,
        constructor: Value,
        prototype: Value,
        statics: IndexMap<String, Value>,
    ) -> Self {
        ClassData {
            name: name.into(),
            constructor,
            prototype,
            statics,
            hash: OnceCell::new(),
        }
    }
}

impl Payload for ClassData {
    fn footprint(&self) -> usize {
        size_of::<Self>() + self.statics.len() * (size_of::<String>() + size_of::<Value>())
    }

    fn invalidate(&mut self) {
        self.hash.take();
    }
}
