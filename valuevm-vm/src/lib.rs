//! ValueVM virtual machine
//!
//! Register-based interpreter for value-semantics bytecode: receivers are
//! threaded through method calls, protected regions revert their bindings
//! when they throw, and resource ceilings stop runaway programs.

pub mod builder;
pub mod builtins;
pub mod error;
pub mod frame;
pub mod host;
pub mod operations;
pub mod result;
pub mod safety;
pub mod transaction;
pub mod vm;

pub use builder::{VMBuilder, VMConfig};
pub use error::{Resource, VMError, VMResult};
pub use frame::{CallFrame, FrameState};
pub use host::{HostFunction, HostRegistry};
pub use result::{Diagnostic, DiagnosticLevel, ExecutionResult};
pub use safety::ResourceLimits;
pub use transaction::{ScopeToken, Snapshot, TransactionLog};
pub use valuevm_core::Value;
pub use vm::VM;

// Test modules
#[cfg(test)]
mod operations_tests;
