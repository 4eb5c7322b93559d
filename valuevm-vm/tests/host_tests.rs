//! Host imports and programs loaded from JSON

mod common;

use anyhow::Result;
use common::*;
use std::cell::RefCell;
use std::rc::Rc;
use valuevm_bytecode::{
    BinaryOp, FunctionBuilder, Instruction, Operand, Program, ProgramBuilder, RETURN_REGISTER,
};
use valuevm_vm::{VMBuilder, VMError, Value, VM};

fn calls_host(name: &str, arg: f64) -> Result<ProgramBuilder> {
    let mut main = FunctionBuilder::new("main", 0);
    main.emit(Instruction::HostCall {
        name: name.to_string(),
        args: vec![Operand::Number(arg)],
        dst: RETURN_REGISTER,
    });
    let mut program = program_with_main(main)?;
    program.import_host(name);
    Ok(program)
}

fn double(args: &[Value]) -> Result<Value, Value> {
    let n = args.first().map_or(f64::NAN, Value::to_number);
    Ok(Value::from(n * 2.0))
}

// ========== Host Functions ==========

#[test]
fn test_host_function_result_is_written() -> Result<()> {
    init_tracing();
    let mut vm = VMBuilder::new()
        .with_program(calls_host("double", 21.0)?.load()?)
        .with_host("double", double)
        .build()?;
    assert_eq!(vm.run_main()?, Ok(Value::from(42)));
    Ok(())
}

#[test]
fn test_missing_host_is_rejected_at_build() -> Result<()> {
    let result = VMBuilder::new()
        .with_program(calls_host("double", 1.0)?.load()?)
        .build();
    let error = result.err().expect("build must fail");
    assert!(error.to_string().contains("double"));
    Ok(())
}

#[test]
fn test_missing_host_is_fatal_at_run() -> Result<()> {
    let mut vm = VM::new(calls_host("double", 1.0)?.load()?);
    assert!(matches!(
        vm.run_main(),
        Err(VMError::MissingHostFunction(name)) if name == "double"
    ));

    vm.register_host("double", double);
    assert_eq!(vm.run_main()?, Ok(Value::from(2)));
    Ok(())
}

#[test]
fn test_host_error_is_catchable() -> Result<()> {
    // try { fail() } catch (e) { return e }
    let mut main = FunctionBuilder::new("main", 0);
    let caught = main.alloc();
    let handler = main.label();
    let region = main.begin_region(&[], Some(caught));
    main.emit(Instruction::HostCall {
        name: "fail".to_string(),
        args: Vec::new(),
        dst: RETURN_REGISTER,
    });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(caught),
        dst: RETURN_REGISTER,
    });
    let mut program = program_with_main(main)?;
    program.import_host("fail");

    let mut vm = VMBuilder::new()
        .with_program(program.load()?)
        .with_host("fail", |_: &[Value]| Err(Value::error("Error", "host failed")))
        .build()?;
    let caught = vm.run_main()?.expect("error is caught");
    assert_eq!(caught.error_message().as_deref(), Some("host failed"));
    Ok(())
}

#[test]
fn test_host_sees_argument_values() -> Result<()> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);

    let mut main = FunctionBuilder::new("main", 0);
    let arr = main.alloc();
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Number(1.0), Operand::Bool(true)],
        dst: arr,
    });
    main.emit(Instruction::HostCall {
        name: "print".to_string(),
        args: vec![Operand::Reg(arr), Operand::Null],
        dst: RETURN_REGISTER,
    });
    let mut program = program_with_main(main)?;
    program.import_host("print");

    let mut vm = VMBuilder::new()
        .with_program(program.load()?)
        .with_host("print", move |args: &[Value]| {
            sink.borrow_mut()
                .extend(args.iter().map(Value::codify));
            Ok(Value::Undefined)
        })
        .build()?;
    assert_eq!(vm.run_main()?, Ok(Value::Undefined));
    assert_eq!(*seen.borrow(), vec!["[1,true]".to_string(), "null".to_string()]);
    Ok(())
}

// ========== JSON Programs ==========

#[test]
fn test_program_survives_json_round_trip() -> Result<()> {
    let mut main = FunctionBuilder::new("main", 0);
    let x = main.alloc();
    main.emit(Instruction::Mov {
        src: Operand::Number(6.0),
        dst: x,
    });
    main.emit(Instruction::Binary {
        op: BinaryOp::Mul,
        lhs: Operand::Reg(x),
        rhs: Operand::Number(7.0),
        dst: RETURN_REGISTER,
    });
    let json = program_with_main(main)?.build()?.to_json()?;

    let mut vm = VM::new(Program::from_json(&json)?.load()?);
    assert_eq!(vm.run_main()?, Ok(Value::from(42)));
    Ok(())
}

#[test]
fn test_handwritten_json_program_runs() -> Result<()> {
    let json = r#"{
        "functions": [
            {
                "name": "main",
                "param_count": 0,
                "register_count": 4,
                "instructions": [
                    { "op": "Mov", "src": { "Number": 0 }, "dst": 2 },
                    { "op": "Inc", "reg": 2 },
                    { "op": "Throw", "value": { "Reg": 2 } },
                    { "op": "Binary", "operator": "Plus", "lhs": { "Take": 3 }, "rhs": { "Const": 0 }, "dst": 0 },
                    { "op": "Return" }
                ],
                "constants": [ { "String": "!" } ],
                "regions": [
                    { "start": 1, "end": 3, "handler": 3, "exception": 3, "snapshot": [2] }
                ]
            }
        ],
        "entry": 0
    }"#;

    let mut vm = VM::new(Program::from_json(json)?.load()?);
    assert_eq!(vm.run_main()?, Ok(Value::from("1!")));
    Ok(())
}
