use std::cell::OnceCell;
use std::mem::size_of;

use indexmap::IndexMap;

use super::Value;
use crate::content_hash::ContentHash;
use crate::handle::Payload;

/// Payload of an object value.
///
/// Fields keep insertion order for iteration and display; equality ignores it.
#[derive(Clone, Debug, Default)]
pub struct ObjectData {
    pub fields: IndexMap<String, Value>,
    pub prototype: Option<Value>,
    pub(crate) hash: OnceCell<ContentHash>,
}

impl ObjectData {
    pub fn new(fields: IndexMap<String, Value>, prototype: Option<Value>) -> Self {
        ObjectData {
            fields,
            prototype,
            hash: OnceCell::new(),
        }
    }

    /// Own field, then the prototype chain.
    pub fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.fields.get(key) {
            return Some(value.clone());
        }
        match &self.prototype {
            Some(Value::Object(proto)) => proto.read().lookup(key),
            _ => None,
        }
    }

    pub fn has(&self, key: &str) -> bool {
        if self.fields.contains_key(key) {
            return true;
        }
        match &self.prototype {
            Some(Value::Object(proto)) => proto.read().has(key),
            _ => false,
        }
    }
}

impl Payload for ObjectData {
    fn footprint(&self) -> usize {
        size_of::<Self>() + self.fields.len() * (size_of::<String>() + size_of::<Value>())
    }

    fn invalidate(&mut self) {
        self.hash.take();
    }
}
