//! Bytecode representation for ValueVM
//!
//! A program is a list of function bodies. Each body runs over a fixed-size
//! register file laid out as:
//!
//! | register            | contents                 |
//! |---------------------|--------------------------|
//! | `r0`                | return value             |
//! | `r1`                | receiver (`this`)        |
//! | `r2 ..`             | captured values          |
//! | after captures      | parameters               |
//! | remaining           | locals and temporaries   |
//!
//! Protected regions form the exception-handler table: each maps an
//! instruction range to a handler and names the registers to snapshot on
//! entry.

#![warn(missing_docs)]

pub mod analysis;
pub mod builder;
pub mod error;
pub mod validate;

use serde::{Deserialize, Serialize};

pub use analysis::{BodyInfo, LoadedProgram};
pub use builder::{FunctionBuilder, Label, ProgramBuilder, RegionId};
pub use error::{BytecodeError, Result};
pub use valuevm_core::Builtin;

/// Index of a register within a frame.
pub type Register = usize;

/// Index of a function body within a program.
pub type FunctionId = usize;

/// Register holding the return value.
pub const RETURN_REGISTER: Register = 0;

/// Register holding the receiver.
pub const THIS_REGISTER: Register = 1;

/// First register after the fixed slots.
pub const FIRST_CAPTURE_REGISTER: Register = 2;

/// An instruction input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Read a register, sharing its handle
    Reg(Register),
    /// Move a register's value out, leaving it empty
    Take(Register),
    /// Constant pool entry
    Const(usize),
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean literal
    Bool(bool),
    /// Number literal
    Number(f64),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Minus,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `typeof x`
    TypeOf,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Exp,
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `&&` (eager)
    And,
    /// `||` (eager)
    Or,
    /// `??` (eager)
    NullishCoalesce,
    /// `<`
    Less,
    /// `<=`
    LessEq,
    /// `>`
    Greater,
    /// `>=`
    GreaterEq,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    LeftShift,
    /// `>>`
    RightShift,
    /// `>>>`
    RightShiftUnsigned,
    /// `instanceof`
    InstanceOf,
    /// `in`
    In,
    /// `lhs?.[rhs]`: `undefined` when `lhs` is nullish
    OptionalChain,
}

/// A bytecode instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Instruction {
    // Data movement
    /// Copy a value into a register
    Mov {
        /// Source
        src: Operand,
        /// Destination
        dst: Register,
    },
    /// Apply a unary operator
    Unary {
        /// Operator
        #[serde(rename = "operator")]
        op: UnaryOp,
        /// Operand
        arg: Operand,
        /// Destination
        dst: Register,
    },
    /// Apply a binary operator
    Binary {
        /// Operator
        #[serde(rename = "operator")]
        op: BinaryOp,
        /// Left operand
        lhs: Operand,
        /// Right operand
        rhs: Operand,
        /// Destination
        dst: Register,
    },
    /// Increment a register in place
    Inc {
        /// Register to update
        reg: Register,
    },
    /// Decrement a register in place
    Dec {
        /// Register to update
        reg: Register,
    },

    // Control flow
    /// Unconditional jump
    Jump {
        /// Instruction offset
        target: usize,
    },
    /// Jump if the condition is truthy
    JumpIf {
        /// Condition
        cond: Operand,
        /// Instruction offset
        target: usize,
    },
    /// Jump if the condition is falsy
    JumpIfNot {
        /// Condition
        cond: Operand,
        /// Instruction offset
        target: usize,
    },

    // Composite literals
    /// Build an array
    MakeArray {
        /// Elements in order
        items: Vec<Operand>,
        /// Destination
        dst: Register,
    },
    /// Build an object
    MakeObject {
        /// Fields in insertion order
        fields: Vec<(String, Operand)>,
        /// Destination
        dst: Register,
    },

    // Properties
    /// Read `obj[key]`
    Sub {
        /// Object
        obj: Operand,
        /// Key
        key: Operand,
        /// Destination
        dst: Register,
    },
    /// Write `obj[key] = value` through copy-on-write
    SubMov {
        /// Key
        key: Operand,
        /// Value to store
        value: Operand,
        /// Register holding the object
        obj: Register,
    },
    /// `delete obj[key]`
    Delete {
        /// Register holding the object
        obj: Register,
        /// Key
        key: Operand,
        /// Destination for the result
        dst: Register,
    },

    // Calls
    /// Call without a receiver
    Call {
        /// Callee
        func: Operand,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the return value
        dst: Register,
    },
    /// Call with a receiver register that is written back on return
    Apply {
        /// Callee
        func: Operand,
        /// Receiver register
        this: Register,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the return value
        dst: Register,
    },
    /// Call with a receiver that must not be mutated
    ConstApply {
        /// Callee
        func: Operand,
        /// Receiver
        this: Operand,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the return value
        dst: Register,
    },
    /// Call `obj[key](...args)`, writing the receiver back to `obj`
    ///
    /// Methods that return their receiver, such as `reverse` and `sort`,
    /// leave a second handle to its payload in `dst`. Compilers should
    /// consume `dst` with [`Operand::Take`] or overwrite it before the
    /// receiver is mutated again, or that mutation pays for a copy.
    SubCall {
        /// Receiver register
        obj: Register,
        /// Method key
        key: Operand,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the return value
        dst: Register,
    },
    /// Call `obj[key](...args)` on a non-assignable receiver
    ConstSubCall {
        /// Receiver
        obj: Operand,
        /// Method key
        key: Operand,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the return value
        dst: Register,
    },
    /// Construct an instance and bind it to `dst`
    New {
        /// Class
        class: Operand,
        /// Constructor arguments
        args: Vec<Operand>,
        /// Destination for the instance
        dst: Register,
    },
    /// Create a closure by appending captured values to a function
    Bind {
        /// Function
        func: Operand,
        /// Values to capture
        captures: Vec<Operand>,
        /// Destination
        dst: Register,
    },

    // Exceptions and receivers
    /// Throw a value
    Throw {
        /// Value to throw
        value: Operand,
    },
    /// Raise a type error when the receiver is not assignable
    RequireMutableThis,

    // Host interface
    /// Call a declared host import
    HostCall {
        /// Import name
        name: String,
        /// Arguments
        args: Vec<Operand>,
        /// Destination for the result
        dst: Register,
    },

    /// Return `r0` to the caller
    Return,
}

impl Instruction {
    /// Jump target, if the instruction has one.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Instruction::Jump { target }
            | Instruction::JumpIf { target, .. }
            | Instruction::JumpIfNot { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Mutable jump target, if the instruction has one.
    pub fn jump_target_mut(&mut self) -> Option<&mut usize> {
        match self {
            Instruction::Jump { target }
            | Instruction::JumpIf { target, .. }
            | Instruction::JumpIfNot { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Every operand read by the instruction.
    pub fn operands(&self) -> Vec<&Operand> {
        use Instruction::*;
        match self {
            Mov { src, .. } => vec![src],
            Unary { arg, .. } => vec![arg],
            Binary { lhs, rhs, .. } => vec![lhs, rhs],
            JumpIf { cond, .. } | JumpIfNot { cond, .. } => vec![cond],
            MakeArray { items, .. } => items.iter().collect(),
            MakeObject { fields, .. } => fields.iter().map(|(_, op)| op).collect(),
            Sub { obj, key, .. } => vec![obj, key],
            SubMov { key, value, .. } => vec![key, value],
            Delete { key, .. } => vec![key],
            Call { func, args, .. } | Apply { func, args, .. } => {
                std::iter::once(func).chain(args).collect()
            }
            ConstApply {
                func, this, args, ..
            } => [func, this].into_iter().chain(args).collect(),
            SubCall { key, args, .. } => std::iter::once(key).chain(args).collect(),
            ConstSubCall { obj, key, args, .. } => [obj, key].into_iter().chain(args).collect(),
            New { class, args, .. } => std::iter::once(class).chain(args).collect(),
            Bind { func, captures, .. } => std::iter::once(func).chain(captures).collect(),
            Throw { value } => vec![value],
            HostCall { args, .. } => args.iter().collect(),
            Inc { .. } | Dec { .. } | Jump { .. } | RequireMutableThis | Return => Vec::new(),
        }
    }

    /// Registers the instruction writes, excluding registers emptied by
    /// [`Operand::Take`].
    pub fn written_registers(&self) -> Vec<Register> {
        use Instruction::*;
        match self {
            Mov { dst, .. }
            | Unary { dst, .. }
            | Binary { dst, .. }
            | MakeArray { dst, .. }
            | MakeObject { dst, .. }
            | Sub { dst, .. }
            | Call { dst, .. }
            | ConstApply { dst, .. }
            | ConstSubCall { dst, .. }
            | New { dst, .. }
            | Bind { dst, .. }
            | HostCall { dst, .. } => vec![*dst],
            Inc { reg } | Dec { reg } => vec![*reg],
            SubMov { obj, .. } => vec![*obj],
            Delete { obj, dst, .. } => vec![*obj, *dst],
            Apply { this, dst, .. } => vec![*this, *dst],
            SubCall { obj, dst, .. } => vec![*obj, *dst],
            Jump { .. }
            | JumpIf { .. }
            | JumpIfNot { .. }
            | Throw { .. }
            | RequireMutableThis
            | Return => Vec::new(),
        }
    }
}

/// Constant pool entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// BigInt in decimal notation
    BigInt(String),
    /// String
    String(String),
    /// Array literal, materialised fresh on every evaluation
    Array(Vec<Constant>),
    /// Object literal, materialised fresh on every evaluation
    Object(Vec<(String, Constant)>),
    /// Function without captures
    Function(FunctionId),
    /// Class definition
    Class {
        /// Class name
        name: String,
        /// Constructor body
        constructor: Option<FunctionId>,
        /// Methods placed on the shared prototype
        methods: Vec<(String, FunctionId)>,
        /// Static members
        statics: Vec<(String, Constant)>,
    },
    /// Builtin global
    Builtin(Builtin),
}

/// An entry of the exception-handler table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRegion {
    /// First protected instruction
    pub start: usize,
    /// One past the last protected instruction
    pub end: usize,
    /// Handler entry point
    pub handler: usize,
    /// Register receiving the thrown value
    pub exception: Option<Register>,
    /// Registers the region may write, restored if it throws
    pub snapshot: Vec<Register>,
}

impl ProtectedRegion {
    /// Whether `offset` lies inside the region.
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// A function body with associated metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBody {
    /// Name for diagnostics
    pub name: String,
    /// Number of declared parameters
    pub param_count: usize,
    /// Names of captured values, in capture order
    #[serde(default)]
    pub captures: Vec<String>,
    /// Size of the register file
    pub register_count: usize,
    /// The bytecode instructions
    pub instructions: Vec<Instruction>,
    /// Constant pool for this body
    #[serde(default)]
    pub constants: Vec<Constant>,
    /// Exception-handler table
    #[serde(default)]
    pub regions: Vec<ProtectedRegion>,
}

impl FunctionBody {
    /// Create an empty body
    pub fn new(name: impl Into<String>, param_count: usize, captures: Vec<String>) -> Self {
        let register_count = FIRST_CAPTURE_REGISTER + captures.len() + param_count;
        Self {
            name: name.into(),
            param_count,
            captures,
            register_count,
            instructions: Vec::new(),
            constants: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Register of the first parameter
    pub fn first_param_register(&self) -> Register {
        FIRST_CAPTURE_REGISTER + self.captures.len()
    }

    /// Minimum register file size for the layout
    pub fn required_registers(&self) -> usize {
        self.first_param_register() + self.param_count
    }

    /// Add an instruction and return its index
    pub fn add_instruction(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Add a constant and return its index
    pub fn add_constant(&mut self, constant: Constant) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Patch a jump instruction with the target address
    pub fn patch_jump(&mut self, offset: usize, target: usize) -> Result<()> {
        let function = self.name.clone();
        match self
            .instructions
            .get_mut(offset)
            .and_then(Instruction::jump_target_mut)
        {
            Some(slot) => {
                *slot = target;
                Ok(())
            }
            None => Err(BytecodeError::NotAJump { function, offset }),
        }
    }
}

/// Complete bytecode for a program
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// All function bodies
    pub functions: Vec<FunctionBody>,
    /// Body executed by `run_main`
    pub entry: Option<FunctionId>,
    /// Host functions the program may call
    #[serde(default)]
    pub host_imports: Vec<String>,
}

impl Program {
    /// Create a new empty program
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body and return its id
    pub fn add_function(&mut self, body: FunctionBody) -> FunctionId {
        self.functions.push(body);
        self.functions.len() - 1
    }

    /// Parse a program from its JSON encoding
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode the program as JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and analyse the program for execution
    pub fn load(self) -> Result<LoadedProgram> {
        LoadedProgram::new(self)
    }
}
