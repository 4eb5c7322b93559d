use std::cell::Cell;
use std::rc::Rc;

use super::Value;

/// Debug value counting how often it is cloned.
///
/// Every clone of the counter (including the clone made when a payload that
/// contains it is duplicated) increments the shared count.
#[derive(Debug)]
pub struct CopyCounter {
    pub tag: Box<Value>,
    count: Rc<Cell<usize>>,
}

impl CopyCounter {
    pub fn new(tag: Value) -> Self {
        CopyCounter {
            tag: Box::new(tag),
            count: Rc::new(Cell::new(0)),
        }
    }

    pub fn count(&self) -> usize {
        self.count.get()
    }

    /// Whether two counters share one count.
    pub fn same_counter(&self, other: &CopyCounter) -> bool {
        Rc::ptr_eq(&self.count, &other.count)
    }

    pub(crate) fn counter_addr(&self) -> usize {
        Rc::as_ptr(&self.count) as usize
    }
}

impl Clone for CopyCounter {
    fn clone(&self) -> Self {
        self.count.set(self.count.get() + 1);
        CopyCounter {
            tag: self.tag.clone(),
            count: Rc::clone(&self.count),
        }
    }
}
