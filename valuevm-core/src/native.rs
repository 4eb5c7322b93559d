//! Native (Rust-implemented) functions and receiver access

use std::fmt;

use crate::value::{Value, CONST_MUTATION_MESSAGE};

/// Result of a native call. `Err` carries a thrown program value.
pub type NativeResult = Result<Value, Value>;

/// Signature of a native that runs to completion.
pub type DirectFn = fn(ThisArg<'_>, Vec<Value>) -> NativeResult;

/// Builds the frame of a native that calls back into the program. Receives
/// the receiver and the arguments.
pub type MakeFrameFn = fn(Value, Vec<Value>) -> Result<Box<dyn NativeFrame>, Value>;

/// A function implemented in Rust.
pub struct NativeFunction {
    pub name: &'static str,
    pub call: NativeCall,
}

/// How a native runs.
#[derive(Clone, Copy)]
pub enum NativeCall {
    /// Runs to completion without calling program functions.
    Direct(DirectFn),
    /// Runs as a frame on the VM's stack so it can call program functions
    /// without re-entering the interpreter.
    Frame {
        make: MakeFrameFn,
        /// The frame takes ownership of the receiver and hands it back
        /// when it finishes. Refused on const receivers.
        mutates_this: bool,
    },
}

impl NativeFunction {
    pub const fn direct(name: &'static str, call: DirectFn) -> Self {
        NativeFunction {
            name,
            call: NativeCall::Direct(call),
        }
    }

    pub const fn frame(name: &'static str, make: MakeFrameFn, mutates_this: bool) -> Self {
        NativeFunction {
            name,
            call: NativeCall::Frame { make, mutates_this },
        }
    }

    pub fn addr(&self) -> usize {
        self as *const NativeFunction as usize
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// What a [`NativeFrame`] wants next.
#[derive(Debug)]
pub enum FrameStep {
    /// Call `callee` with a const `this`. The result is delivered through
    /// [`NativeFrame::resume`] before the next step.
    Call {
        callee: Value,
        this: Value,
        args: Vec<Value>,
    },
    /// Finish with `value`, handing the receiver back.
    Return { value: Value, this: Value },
}

/// State of a native running on the VM's frame stack.
pub trait NativeFrame: fmt::Debug {
    fn step(&mut self) -> Result<FrameStep, Value>;

    /// Accept the return value of the last requested call.
    fn resume(&mut self, result: Value) -> Result<(), Value>;
}

/// The receiver of a native call.
///
/// Natives read the receiver freely; mutating it requires
/// [`ThisArg::get_mut`], which refuses when the call site is not assignable.
pub struct ThisArg<'a> {
    value: &'a mut Value,
    mutable: bool,
}

impl<'a> ThisArg<'a> {
    pub fn new(value: &'a mut Value, mutable: bool) -> Self {
        ThisArg { value, mutable }
    }

    pub fn get(&self) -> &Value {
        self.value
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn get_mut(&mut self) -> Result<&mut Value, Value> {
        if self.mutable {
            Ok(self.value)
        } else {
            Err(Value::type_error(CONST_MUTATION_MESSAGE))
        }
    }
}
