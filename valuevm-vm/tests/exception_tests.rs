//! Protected regions: catching, reverting and propagating exceptions

mod common;

use anyhow::Result;
use common::*;
use valuevm_bytecode::{
    Builtin, Constant, FunctionBuilder, FunctionId, Instruction, Operand, ProgramBuilder,
    RETURN_REGISTER, THIS_REGISTER,
};
use valuevm_vm::Value;

/// Class `Box { constructor() { this.n = 0 } failingSet(v) { this.n = v; throw "failed" } }`
fn box_class(program: &mut ProgramBuilder) -> Result<Constant> {
    let mut ctor = FunctionBuilder::new("Box", 0);
    let n = ctor.string("n");
    ctor.emit(Instruction::SubMov {
        key: n,
        value: Operand::Number(0.0),
        obj: THIS_REGISTER,
    });
    let ctor = program.add(ctor.finish()?);

    let mut failing = FunctionBuilder::new("failingSet", 1);
    let n = failing.string("n");
    let param = failing.param(0);
    let message = failing.string("failed");
    failing.emit(Instruction::SubMov {
        key: n,
        value: Operand::Reg(param),
        obj: THIS_REGISTER,
    });
    failing.emit(Instruction::Throw { value: message });
    let failing = program.add(failing.finish()?);

    Ok(Constant::Class {
        name: "Box".to_string(),
        constructor: Some(ctor),
        methods: vec![("failingSet".to_string(), failing)],
        statics: Vec::new(),
    })
}

fn entry(program: &mut ProgramBuilder, main: FunctionBuilder) -> Result<FunctionId> {
    let id = program.add(main.finish()?);
    program.set_entry(id);
    Ok(id)
}

// ========== Reverting Bindings ==========

#[test]
fn test_increment_before_throw_is_reverted() -> Result<()> {
    // x = 0; try { x++; throw "err" } catch (e) {}; return x
    let mut main = FunctionBuilder::new("main", 0);
    let x = main.alloc();
    let e = main.alloc();
    main.emit(Instruction::Mov {
        src: Operand::Number(0.0),
        dst: x,
    });
    let handler = main.label();
    let region = main.begin_region(&[x], Some(e));
    main.emit(Instruction::Inc { reg: x });
    let err = main.string("err");
    main.emit(Instruction::Throw { value: err });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(x),
        dst: RETURN_REGISTER,
    });

    assert_eq!(run(program_with_main(main)?)?, Ok(Value::from(0)));
    Ok(())
}

#[test]
fn test_completed_region_keeps_its_mutations() -> Result<()> {
    // x = 0; try { x++ } catch {}; x++; throw x  -> the throw is uncaught
    let mut main = FunctionBuilder::new("main", 0);
    let x = main.alloc();
    main.emit(Instruction::Mov {
        src: Operand::Number(0.0),
        dst: x,
    });
    let handler = main.label();
    let after = main.label();
    let region = main.begin_region(&[x], None);
    main.emit(Instruction::Inc { reg: x });
    main.end_region(region, handler);
    main.jump(after);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Number(-1.0),
        dst: x,
    });
    main.bind(after);
    main.emit(Instruction::Inc { reg: x });
    main.emit(Instruction::Throw {
        value: Operand::Take(x),
    });

    assert_eq!(run(program_with_main(main)?)?, Err(Value::from(2)));
    Ok(())
}

#[test]
fn test_native_mutation_is_reverted() -> Result<()> {
    // arr = [1]; try { arr.push(2); throw "x" } catch {}; return arr
    let mut main = FunctionBuilder::new("main", 0);
    let arr = main.alloc();
    let scratch = main.alloc();
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Number(1.0)],
        dst: arr,
    });
    let handler = main.label();
    let region = main.begin_region(&[arr, scratch], None);
    let push = main.string("push");
    main.emit(Instruction::SubCall {
        obj: arr,
        key: push,
        args: vec![Operand::Number(2.0)],
        dst: scratch,
    });
    let x = main.string("x");
    main.emit(Instruction::Throw { value: x });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(arr),
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    assert_eq!(result, Value::array(vec![Value::from(1)]));
    Ok(())
}

#[test]
fn test_receiver_of_throwing_method_is_restored() -> Result<()> {
    // b = new Box(); try { b.failingSet(5) } catch {}; return b.n
    let mut program = ProgramBuilder::new();
    let class = box_class(&mut program)?;

    let mut main = FunctionBuilder::new("main", 0);
    let b = main.alloc();
    let scratch = main.alloc();
    let class = main.constant(class);
    main.emit(Instruction::New {
        class,
        args: Vec::new(),
        dst: b,
    });
    let handler = main.label();
    let region = main.begin_region(&[b, scratch], None);
    let method = main.string("failingSet");
    main.emit(Instruction::SubCall {
        obj: b,
        key: method,
        args: vec![Operand::Number(5.0)],
        dst: scratch,
    });
    main.end_region(region, handler);
    main.bind(handler);
    let n = main.string("n");
    main.emit(Instruction::Sub {
        obj: Operand::Reg(b),
        key: n,
        dst: RETURN_REGISTER,
    });
    entry(&mut program, main)?;

    assert_eq!(run(program)?, Ok(Value::from(0)));
    Ok(())
}

#[test]
fn test_receiver_survives_throw_without_snapshot() -> Result<()> {
    // The receiver was moved into the callee; catching must put the
    // pre-call value back even when the region snapshots nothing.
    let mut program = ProgramBuilder::new();
    let class = box_class(&mut program)?;

    let mut main = FunctionBuilder::new("main", 0);
    let b = main.alloc();
    let scratch = main.alloc();
    let class = main.constant(class);
    main.emit(Instruction::New {
        class,
        args: Vec::new(),
        dst: b,
    });
    let handler = main.label();
    let region = main.begin_region(&[], None);
    let method = main.string("failingSet");
    main.emit(Instruction::SubCall {
        obj: b,
        key: method,
        args: vec![Operand::Number(5.0)],
        dst: scratch,
    });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(b),
        dst: RETURN_REGISTER,
    });
    entry(&mut program, main)?;

    let result = run(program)?.expect("program returns");
    assert_eq!(result.get_field("n"), Some(Value::from(0)));
    Ok(())
}

// ========== Nested Regions ==========

#[test]
fn test_rethrow_from_cleanup_reverts_cumulatively() -> Result<()> {
    // x = 0; y = 0
    // try {
    //   x = 1
    //   try { y = 1; throw "inner" } finally { throw "cleanup" }
    // } catch (e) { return [x, y, e] }
    let mut main = FunctionBuilder::new("main", 0);
    let x = main.alloc();
    let y = main.alloc();
    let inner_exception = main.alloc();
    let outer_exception = main.alloc();
    main.emit(Instruction::Mov {
        src: Operand::Number(0.0),
        dst: x,
    });
    main.emit(Instruction::Mov {
        src: Operand::Number(0.0),
        dst: y,
    });

    let outer_handler = main.label();
    let inner_handler = main.label();
    let outer = main.begin_region(&[x, y, inner_exception], Some(outer_exception));
    main.emit(Instruction::Mov {
        src: Operand::Number(1.0),
        dst: x,
    });
    let inner = main.begin_region(&[y], Some(inner_exception));
    main.emit(Instruction::Mov {
        src: Operand::Number(1.0),
        dst: y,
    });
    let first = main.string("inner");
    main.emit(Instruction::Throw { value: first });
    main.end_region(inner, inner_handler);
    main.bind(inner_handler);
    let second = main.string("cleanup");
    main.emit(Instruction::Throw { value: second });
    main.end_region(outer, outer_handler);
    main.bind(outer_handler);
    main.emit(Instruction::MakeArray {
        items: vec![
            Operand::Take(x),
            Operand::Take(y),
            Operand::Take(outer_exception),
        ],
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    assert_eq!(
        result,
        Value::array(vec![Value::from(0), Value::from(0), Value::from("cleanup")])
    );
    Ok(())
}

#[test]
fn test_three_nested_rethrows_revert_every_level() -> Result<()> {
    // x = 0; y = 0; z = 0
    // try {
    //   x = 1
    //   try {
    //     y = 1
    //     try { z = 1; throw "inner" } catch { throw "middle" }
    //   } catch { throw "cleanup" }
    // } catch (e) { return [x, y, z, e] }
    let mut main = FunctionBuilder::new("main", 0);
    let x = main.alloc();
    let y = main.alloc();
    let z = main.alloc();
    let outer_exception = main.alloc();
    for reg in [x, y, z] {
        main.emit(Instruction::Mov {
            src: Operand::Number(0.0),
            dst: reg,
        });
    }

    let outer_handler = main.label();
    let middle_handler = main.label();
    let inner_handler = main.label();
    let outer = main.begin_region(&[x, y, z], Some(outer_exception));
    main.emit(Instruction::Mov {
        src: Operand::Number(1.0),
        dst: x,
    });
    let middle = main.begin_region(&[y, z], None);
    main.emit(Instruction::Mov {
        src: Operand::Number(1.0),
        dst: y,
    });
    let inner = main.begin_region(&[z], None);
    main.emit(Instruction::Mov {
        src: Operand::Number(1.0),
        dst: z,
    });
    let first = main.string("inner");
    main.emit(Instruction::Throw { value: first });
    main.end_region(inner, inner_handler);
    main.bind(inner_handler);
    let second = main.string("middle");
    main.emit(Instruction::Throw { value: second });
    main.end_region(middle, middle_handler);
    main.bind(middle_handler);
    let third = main.string("cleanup");
    main.emit(Instruction::Throw { value: third });
    main.end_region(outer, outer_handler);
    main.bind(outer_handler);
    main.emit(Instruction::MakeArray {
        items: vec![
            Operand::Take(x),
            Operand::Take(y),
            Operand::Take(z),
            Operand::Take(outer_exception),
        ],
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    assert_eq!(
        result,
        Value::array(vec![
            Value::from(0),
            Value::from(0),
            Value::from(0),
            Value::from("cleanup"),
        ])
    );
    Ok(())
}

#[test]
fn test_exception_crosses_frames_to_caller_region() -> Result<()> {
    let mut program = ProgramBuilder::new();
    let mut thrower = FunctionBuilder::new("thrower", 0);
    let local = thrower.alloc();
    thrower.emit(Instruction::Mov {
        src: Operand::Number(99.0),
        dst: local,
    });
    thrower.emit(Instruction::Throw {
        value: Operand::Take(local),
    });
    let thrower = program.add(thrower.finish()?);

    let mut main = FunctionBuilder::new("main", 0);
    let caught = main.alloc();
    let handler = main.label();
    let region = main.begin_region(&[], Some(caught));
    let callee = main.constant(Constant::Function(thrower));
    main.emit(Instruction::Call {
        func: callee,
        args: Vec::new(),
        dst: RETURN_REGISTER,
    });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(caught),
        dst: RETURN_REGISTER,
    });
    entry(&mut program, main)?;

    let mut vm = vm(program)?;
    assert_eq!(vm.run_main()?, Ok(Value::from(99)));
    assert_eq!(vm.call_depth(), 0);
    Ok(())
}

// ========== Error Values ==========

#[test]
fn test_runtime_type_error_is_catchable() -> Result<()> {
    // try { undefined.foo } catch (e) { return e.message }
    let mut main = FunctionBuilder::new("main", 0);
    let scratch = main.alloc();
    let caught = main.alloc();
    let handler = main.label();
    let region = main.begin_region(&[scratch], Some(caught));
    let foo = main.string("foo");
    main.emit(Instruction::Sub {
        obj: Operand::Undefined,
        key: foo,
        dst: scratch,
    });
    main.end_region(region, handler);
    main.bind(handler);
    let message = main.string("message");
    main.emit(Instruction::Sub {
        obj: Operand::Reg(caught),
        key: message,
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?;
    assert_eq!(
        result,
        Ok(Value::from("Cannot read properties of undefined (reading 'foo')"))
    );
    Ok(())
}

#[test]
fn test_uncaught_error_keeps_its_fields() -> Result<()> {
    // throw new TypeError("bad input")
    let mut main = FunctionBuilder::new("main", 0);
    let error = main.alloc();
    let class = main.constant(Constant::Builtin(Builtin::TypeError));
    let message = main.string("bad input");
    main.emit(Instruction::New {
        class,
        args: vec![message],
        dst: error,
    });
    main.emit(Instruction::Throw {
        value: Operand::Take(error),
    });

    let result = execute(program_with_main(main)?)?;
    assert!(!result.is_ok());
    assert!(!result.is_fatal());
    assert_eq!(
        result.codified(),
        Err(r#"TypeError{"message":"bad input"}"#.to_string())
    );
    let thrown = result.output.as_ref().unwrap_err();
    assert_eq!(thrown.error_message().as_deref(), Some("bad input"));
    Ok(())
}
