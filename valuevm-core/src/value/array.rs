use std::cell::OnceCell;
use std::mem::size_of;

use super::Value;
use crate::content_hash::ContentHash;
use crate::handle::Payload;

/// Payload of an array value. Holes are stored as [`Value::Void`].
#[derive(Clone, Debug, Default)]
pub struct ArrayData {
    pub elements: Vec<Value>,
    pub(crate) hash: OnceCell<ContentHash>,
}

impl ArrayData {
    pub fn new(elements: Vec<Value>) -> Self {
        ArrayData {
            elements,
            hash: OnceCell::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Element at `index`, with holes and out-of-range reads as `undefined`.
    pub fn get(&self, index: usize) -> Value {
        self.elements
            .get(index)
            .cloned()
            .map_or(Value::Undefined, Value::or_undefined)
    }
}

impl Payload for ArrayData {
    fn footprint(&self) -> usize {
        size_of::<Self>() + self.elements.len() * size_of::<Value>()
    }

    fn invalidate(&mut self) {
        self.hash.take();
    }
}
