//! Load-time validation
//!
//! Programs come from an external compiler. Anything the interpreter relies
//! on structurally (register bounds, jump targets, region nesting, declared
//! host imports) is checked once here so a defective program is rejected
//! before it runs.

use crate::error::{BytecodeError, Result};
use crate::{Constant, FunctionBody, Operand, Program};

/// Check every body of `program`.
pub fn validate_program(program: &Program) -> Result<()> {
    if let Some(entry) = program.entry {
        if entry >= program.functions.len() {
            return Err(BytecodeError::InvalidEntry(entry));
        }
    }
    for body in &program.functions {
        validate_body(program, body)?;
    }
    Ok(())
}

fn validate_body(program: &Program, body: &FunctionBody) -> Result<()> {
    let function = || body.name.clone();
    let count = body.register_count;
    if count < body.required_registers() {
        return Err(BytecodeError::RegisterFileTooSmall {
            function: function(),
            required: body.required_registers(),
            count,
        });
    }

    let check_register = |offset: usize, register: usize| {
        if register >= count {
            Err(BytecodeError::RegisterOutOfRange {
                function: function(),
                offset,
                register,
                count,
            })
        } else {
            Ok(())
        }
    };

    let len = body.instructions.len();
    for (offset, instruction) in body.instructions.iter().enumerate() {
        for operand in instruction.operands() {
            match *operand {
                Operand::Reg(r) | Operand::Take(r) => check_register(offset, r)?,
                Operand::Const(index) if index >= body.constants.len() => {
                    return Err(BytecodeError::InvalidConstant {
                        function: function(),
                        offset,
                        index,
                    });
                }
                _ => {}
            }
        }
        for register in instruction.written_registers() {
            check_register(offset, register)?;
        }
        if let Some(target) = instruction.jump_target() {
            if target >= len {
                return Err(BytecodeError::TargetOutOfRange {
                    function: function(),
                    offset,
                    target,
                });
            }
        }
        if let crate::Instruction::HostCall { name, .. } = instruction {
            if !program.host_imports.iter().any(|import| import == name) {
                return Err(BytecodeError::UndeclaredHost {
                    function: function(),
                    offset,
                    name: name.clone(),
                });
            }
        }
    }

    for constant in &body.constants {
        validate_constant(program, body, constant)?;
    }

    for region in &body.regions {
        let invalid = region.start >= region.end
            || region.end > len
            || region.handler >= len
            || region.contains(region.handler);
        if invalid {
            return Err(BytecodeError::InvalidRegion {
                function: function(),
                start: region.start,
                end: region.end,
                handler: region.handler,
            });
        }
        for &register in region.snapshot.iter().chain(region.exception.iter()) {
            check_register(region.start, register)?;
        }
    }

    for (i, a) in body.regions.iter().enumerate() {
        for (j, b) in body.regions.iter().enumerate().skip(i + 1) {
            let disjoint = a.end <= b.start || b.end <= a.start;
            let a_contains_b = a.start <= b.start && b.end <= a.end;
            let b_contains_a = b.start <= a.start && a.end <= b.end;
            let identical = a.start == b.start && a.end == b.end;
            if identical || !(disjoint || a_contains_b || b_contains_a) {
                return Err(BytecodeError::OverlappingRegions {
                    function: function(),
                    first: i,
                    second: j,
                });
            }
        }
    }

    Ok(())
}

fn validate_constant(program: &Program, body: &FunctionBody, constant: &Constant) -> Result<()> {
    let check_function = |id: usize| {
        if id < program.functions.len() {
            Ok(())
        } else {
            Err(BytecodeError::UnknownFunction {
                function: body.name.clone(),
                id,
            })
        }
    };
    match constant {
        Constant::Function(id) => check_function(*id),
        Constant::Class {
            constructor,
            methods,
            statics,
            ..
        } => {
            if let Some(id) = constructor {
                check_function(*id)?;
            }
            for (_, id) in methods {
                check_function(*id)?;
            }
            for (_, value) in statics {
                validate_constant(program, body, value)?;
            }
            Ok(())
        }
        Constant::Array(items) => items
            .iter()
            .try_for_each(|item| validate_constant(program, body, item)),
        Constant::Object(fields) => fields
            .iter()
            .try_for_each(|(_, value)| validate_constant(program, body, value)),
        Constant::BigInt(literal) => {
            let digits = literal.strip_prefix('-').unwrap_or(literal);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BytecodeError::InvalidBigInt {
                    function: body.name.clone(),
                    literal: literal.clone(),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
