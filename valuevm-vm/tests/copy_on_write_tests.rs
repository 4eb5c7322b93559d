//! Copy-on-write behaviour observed through copy counters and store stats

mod common;

use anyhow::Result;
use common::*;
use proptest::prelude::*;
use valuevm_bytecode::{
    BinaryOp, Constant, FunctionBuilder, Instruction, Operand, ProgramBuilder, RETURN_REGISTER,
    THIS_REGISTER,
};
use valuevm_core::store_stats;
use valuevm_vm::Value;

fn push(f: &mut FunctionBuilder, array: usize, value: Operand) {
    let key = f.string("push");
    let scratch = f.alloc();
    f.emit(Instruction::SubCall {
        obj: array,
        key,
        args: vec![value],
        dst: scratch,
    });
}

// ========== Unique Handles ==========

#[test]
fn test_push_on_unique_array_never_copies() -> Result<()> {
    // x = [counter]; x.push(2); return x
    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let x = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(counter)],
        dst: x,
    });
    push(&mut main, x, Operand::Number(2.0));
    main.emit(Instruction::Mov {
        src: Operand::Take(x),
        dst: RETURN_REGISTER,
    });

    let before = store_stats();
    let result = run(program_with_main(main)?)?.expect("program returns");
    let after = store_stats();

    let items = elements(&result);
    assert_eq!(items.len(), 2);
    assert_eq!(copy_count(&items[0]), 0);
    assert_eq!(items[1], Value::from(2));
    assert_eq!(after.payload_clones, before.payload_clones);
    Ok(())
}

#[test]
fn test_subscript_assignment_on_unique_array_never_copies() -> Result<()> {
    // x = [counter, 1]; x[1] = 5; return x
    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let x = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(counter), Operand::Number(1.0)],
        dst: x,
    });
    main.emit(Instruction::SubMov {
        key: Operand::Number(1.0),
        value: Operand::Number(5.0),
        obj: x,
    });
    main.emit(Instruction::Mov {
        src: Operand::Take(x),
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    let items = elements(&result);
    assert_eq!(copy_count(&items[0]), 0);
    assert_eq!(items[1], Value::from(5));
    Ok(())
}

#[test]
fn test_mutating_method_on_variable_never_copies() -> Result<()> {
    let mut program = ProgramBuilder::new();

    // constructor(counter) { this.n = 0; this.counter = counter }
    let mut ctor = FunctionBuilder::new("Counter", 1);
    let n = ctor.string("n");
    let counter_key = ctor.string("counter");
    let param = ctor.param(0);
    ctor.emit(Instruction::SubMov {
        key: n,
        value: Operand::Number(0.0),
        obj: THIS_REGISTER,
    });
    ctor.emit(Instruction::SubMov {
        key: counter_key,
        value: Operand::Take(param),
        obj: THIS_REGISTER,
    });
    let ctor = program.add(ctor.finish()?);

    // bump() { this.n = this.n + 1 }
    let mut bump = FunctionBuilder::new("bump", 0);
    let n = bump.string("n");
    let t = bump.alloc();
    bump.emit(Instruction::Sub {
        obj: Operand::Reg(THIS_REGISTER),
        key: n,
        dst: t,
    });
    bump.emit(Instruction::Binary {
        op: BinaryOp::Plus,
        lhs: Operand::Reg(t),
        rhs: Operand::Number(1.0),
        dst: t,
    });
    bump.emit(Instruction::SubMov {
        key: n,
        value: Operand::Take(t),
        obj: THIS_REGISTER,
    });
    let bump = program.add(bump.finish()?);

    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let obj = main.alloc();
    let scratch = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    let class = main.constant(Constant::Class {
        name: "Counter".to_string(),
        constructor: Some(ctor),
        methods: vec![("bump".to_string(), bump)],
        statics: Vec::new(),
    });
    main.emit(Instruction::New {
        class,
        args: vec![Operand::Take(counter)],
        dst: obj,
    });
    let key = main.string("bump");
    for _ in 0..3 {
        main.emit(Instruction::SubCall {
            obj,
            key,
            args: Vec::new(),
            dst: scratch,
        });
    }
    main.emit(Instruction::Mov {
        src: Operand::Take(obj),
        dst: RETURN_REGISTER,
    });
    let main = program.add(main.finish()?);
    program.set_entry(main);

    let before = store_stats();
    let result = run(program)?.expect("program returns");
    let after = store_stats();

    assert_eq!(result.get_field("n"), Some(Value::from(3)));
    let object = result.as_object().expect("instance");
    assert_eq!(copy_count(&object.fields["counter"]), 0);
    assert_eq!(after.payload_clones, before.payload_clones);
    Ok(())
}

// ========== Shared Handles ==========

#[test]
fn test_mutating_an_alias_copies_exactly_once() -> Result<()> {
    // x = [counter]; y = x; y.push(3); return [x, y]
    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let x = main.alloc();
    let y = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(counter)],
        dst: x,
    });
    main.emit(Instruction::Mov {
        src: Operand::Reg(x),
        dst: y,
    });
    push(&mut main, y, Operand::Number(3.0));
    push(&mut main, y, Operand::Number(4.0));
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(x), Operand::Take(y)],
        dst: RETURN_REGISTER,
    });

    let before = store_stats();
    let result = run(program_with_main(main)?)?.expect("program returns");
    let after = store_stats();

    let pair = elements(&result);
    let x = elements(&pair[0]);
    let y = elements(&pair[1]);
    assert_eq!(x.len(), 1);
    assert_eq!(y.len(), 3);
    // The second push finds y unique again
    assert_eq!(copy_count(&x[0]), 1);
    assert_eq!(after.payload_clones - before.payload_clones, 1);
    Ok(())
}

#[test]
fn test_mutation_inside_protected_region_copies_once() -> Result<()> {
    // x = [counter]; try { x.push(2) } catch {}; return x
    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let x = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(counter)],
        dst: x,
    });
    let handler = main.label();
    let done = main.label();
    let region = main.begin_region(&[x], None);
    push(&mut main, x, Operand::Number(2.0));
    main.end_region(region, handler);
    main.jump(done);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Undefined,
        dst: RETURN_REGISTER,
    });
    main.bind(done);
    main.emit(Instruction::Mov {
        src: Operand::Take(x),
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    let items = elements(&result);
    assert_eq!(items.len(), 2);
    assert_eq!(copy_count(&items[0]), 1);
    Ok(())
}

#[test]
fn test_literal_constants_are_fresh_per_evaluation() -> Result<()> {
    // for two passes: a = [1]; a.push(2); keep a
    let mut main = FunctionBuilder::new("main", 0);
    let literal = main.constant(Constant::Array(vec![Constant::Number(1.0)]));
    let first = main.alloc();
    let second = main.alloc();
    main.emit(Instruction::Mov {
        src: literal,
        dst: first,
    });
    push(&mut main, first, Operand::Number(2.0));
    main.emit(Instruction::Mov {
        src: literal,
        dst: second,
    });
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(first), Operand::Take(second)],
        dst: RETURN_REGISTER,
    });

    let result = run(program_with_main(main)?)?.expect("program returns");
    let pair = elements(&result);
    assert_eq!(elements(&pair[0]).len(), 2);
    assert_eq!(elements(&pair[1]).len(), 1);
    Ok(())
}

// ========== Calls and Exceptions ==========

#[test]
fn test_array_threaded_through_calls_is_never_copied() -> Result<()> {
    // id = a => a; x = [counter]; x = id(x); x = id(x); x.push(2); return x
    let mut program = ProgramBuilder::new();
    let mut id = FunctionBuilder::new("id", 1);
    let a = id.param(0);
    id.emit(Instruction::Mov {
        src: Operand::Take(a),
        dst: RETURN_REGISTER,
    });
    let id = program.add(id.finish()?);

    let mut main = FunctionBuilder::new("main", 0);
    let counter = main.alloc();
    let x = main.alloc();
    make_copy_counter(&mut main, "c", counter);
    main.emit(Instruction::MakeArray {
        items: vec![Operand::Take(counter)],
        dst: x,
    });
    let callee = main.constant(Constant::Function(id));
    for _ in 0..2 {
        main.emit(Instruction::Call {
            func: callee,
            args: vec![Operand::Take(x)],
            dst: x,
        });
    }
    push(&mut main, x, Operand::Number(2.0));
    main.emit(Instruction::Mov {
        src: Operand::Take(x),
        dst: RETURN_REGISTER,
    });
    let main = program.add(main.finish()?);
    program.set_entry(main);

    let before = store_stats();
    let result = run(program)?.expect("program returns");
    let after = store_stats();

    let items = elements(&result);
    assert_eq!(items.len(), 2);
    assert_eq!(copy_count(&items[0]), 0);
    assert_eq!(after.payload_clones, before.payload_clones);
    Ok(())
}

#[test]
fn test_thrown_copy_counter_reaches_caller_uncopied() -> Result<()> {
    // thrower = () => { throw Debug.makeCopyCounter("t") }
    // try { thrower() } catch (e) { return e }
    let mut program = ProgramBuilder::new();
    let mut thrower = FunctionBuilder::new("thrower", 0);
    let counter = thrower.alloc();
    make_copy_counter(&mut thrower, "t", counter);
    thrower.emit(Instruction::Throw {
        value: Operand::Take(counter),
    });
    let thrower = program.add(thrower.finish()?);

    let mut main = FunctionBuilder::new("main", 0);
    let scratch = main.alloc();
    let caught = main.alloc();
    let handler = main.label();
    let region = main.begin_region(&[scratch], Some(caught));
    let callee = main.constant(Constant::Function(thrower));
    main.emit(Instruction::Call {
        func: callee,
        args: Vec::new(),
        dst: scratch,
    });
    main.end_region(region, handler);
    main.bind(handler);
    main.emit(Instruction::Mov {
        src: Operand::Take(caught),
        dst: RETURN_REGISTER,
    });
    let main = program.add(main.finish()?);
    program.set_entry(main);

    let result = run(program)?.expect("program returns");
    assert_eq!(copy_count(&result), 0);
    Ok(())
}

// ========== Properties ==========

proptest! {
    #[test]
    fn prop_repeated_pushes_on_unique_array_never_copy(count in 0usize..40) {
        let mut main = FunctionBuilder::new("main", 0);
        let x = main.alloc();
        main.emit(Instruction::MakeArray { items: Vec::new(), dst: x });
        for i in 0..count {
            push(&mut main, x, Operand::Number(i as f64));
        }
        main.emit(Instruction::Mov { src: Operand::Take(x), dst: RETURN_REGISTER });

        let before = store_stats();
        let result = run(program_with_main(main).unwrap()).unwrap().unwrap();
        let after = store_stats();

        prop_assert_eq!(elements(&result).len(), count);
        prop_assert_eq!(after.payload_clones, before.payload_clones);
    }
}
