//! Fatal interpreter errors
//!
//! Program-level exceptions are ordinary values carried in
//! `Result<Value, Value>`. The errors here end the run: no handler is
//! consulted and no revert is performed.

use std::fmt;

use thiserror::Error;
use valuevm_bytecode::BytecodeError;
use valuevm_core::Value;

/// Resource whose ceiling was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Instructions,
    Memory,
    CallDepth,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Instructions => write!(f, "instruction count"),
            Resource::Memory => write!(f, "memory"),
            Resource::CallDepth => write!(f, "call depth"),
        }
    }
}

/// VM error types
#[derive(Error, Debug)]
pub enum VMError {
    /// A resource ceiling was exceeded
    #[error("Resource limit exceeded for {resource}: limit {limit}, reached {reached}")]
    ResourceExhausted {
        resource: Resource,
        limit: u64,
        reached: u64,
    },

    /// The program violated an invariant the compiler must guarantee
    #[error("Internal error in {function}@{ip}: {message}")]
    Internal {
        function: String,
        ip: usize,
        message: String,
    },

    #[error("Invalid program: {0}")]
    InvalidProgram(#[from] BytecodeError),

    #[error("Host function {0:?} is imported but not registered")]
    MissingHostFunction(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

impl VMError {
    /// Whether the error came from a resource ceiling.
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, VMError::ResourceExhausted { .. })
    }
}

/// Result type for VM operations
pub type VMResult<T> = Result<T, VMError>;

/// Why an instruction did not complete.
#[derive(Debug)]
pub(crate) enum Fault {
    /// A program value was thrown and may be caught.
    Throw(Value),
    /// The run must stop.
    Fatal(VMError),
}

impl From<Value> for Fault {
    fn from(value: Value) -> Self {
        Fault::Throw(value)
    }
}

impl From<VMError> for Fault {
    fn from(error: VMError) -> Self {
        Fault::Fatal(error)
    }
}

pub(crate) type Flow<T> = Result<T, Fault>;
