//! Host functions
//!
//! Programs declare the host functions they import; the embedder registers
//! an implementation for each before the run starts. The interpreter treats
//! every host call as opaque I/O: arguments go out, a value or a thrown
//! value comes back.

use rustc_hash::FxHashMap;
use valuevm_core::Value;

/// A function provided by the embedder.
pub trait HostFunction {
    fn call(&self, args: &[Value]) -> Result<Value, Value>;
}

impl<F> HostFunction for F
where
    F: Fn(&[Value]) -> Result<Value, Value>,
{
    fn call(&self, args: &[Value]) -> Result<Value, Value> {
        self(args)
    }
}

/// Registered host functions by import name.
#[derive(Default)]
pub struct HostRegistry {
    functions: FxHashMap<String, Box<dyn HostFunction>>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: impl HostFunction + 'static) {
        self.functions.insert(name.into(), Box::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&dyn HostFunction> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// First import in `imports` without a registered implementation.
    pub fn first_missing<'a>(&self, imports: &'a [String]) -> Option<&'a str> {
        imports
            .iter()
            .find(|name| !self.contains(name))
            .map(String::as_str)
    }
}

impl std::fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("HostRegistry").field("functions", &names).finish()
    }
}
