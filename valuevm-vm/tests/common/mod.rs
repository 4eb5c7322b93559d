//! Helpers shared by the integration tests

#![allow(dead_code)]

use anyhow::Result;
use valuevm_bytecode::{Builtin, Constant, FunctionBuilder, Instruction, ProgramBuilder, Register};
use valuevm_vm::{ExecutionResult, ResourceLimits, VMBuilder, Value, VM};

/// Route VM logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Load `program` into a VM with test limits.
pub fn vm(program: ProgramBuilder) -> Result<VM> {
    init_tracing();
    VMBuilder::new()
        .with_program(program.load()?)
        .with_limits(ResourceLimits::testing())
        .build()
}

/// Run the entry point of `program`.
pub fn run(program: ProgramBuilder) -> Result<Result<Value, Value>> {
    Ok(vm(program)?.run_main()?)
}

/// Run the entry point of `program` through [`VM::execute`].
pub fn execute(program: ProgramBuilder) -> Result<ExecutionResult> {
    Ok(vm(program)?.execute())
}

/// Program whose entry point is `main`.
pub fn program_with_main(main: FunctionBuilder) -> Result<ProgramBuilder> {
    let mut program = ProgramBuilder::new();
    let id = program.add(main.finish()?);
    program.set_entry(id);
    Ok(program)
}

/// Emit `dst = Debug.makeCopyCounter(tag)`.
pub fn make_copy_counter(f: &mut FunctionBuilder, tag: &str, dst: Register) {
    let debug = f.constant(Constant::Builtin(Builtin::Debug));
    let key = f.string("makeCopyCounter");
    let tag = f.string(tag);
    f.emit(Instruction::ConstSubCall {
        obj: debug,
        key,
        args: vec![tag],
        dst,
    });
}

/// Clones recorded by a copy counter.
pub fn copy_count(value: &Value) -> usize {
    match value {
        Value::CopyCounter(counter) => counter.count(),
        other => panic!("expected a copy counter, got {other:?}"),
    }
}

/// Elements of an array value, borrowed so no element is cloned.
pub fn elements(value: &Value) -> &[Value] {
    match value.as_array() {
        Some(array) => &array.elements,
        None => panic!("expected an array, got {value:?}"),
    }
}
