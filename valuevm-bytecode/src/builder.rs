//! Builders for assembling programs by hand
//!
//! Used by embedders that generate bytecode directly and by the test suites.
//! Jumps and region handlers refer to [`Label`]s that are patched when the
//! body is finished.

use crate::analysis::LoadedProgram;
use crate::error::{BytecodeError, Result};
use crate::{
    Constant, FunctionBody, FunctionId, Instruction, Operand, Program, ProtectedRegion, Register,
    FIRST_CAPTURE_REGISTER,
};

/// A jump destination inside a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// A protected region opened with [`FunctionBuilder::begin_region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionId(usize);

/// Incrementally builds a [`FunctionBody`].
#[derive(Debug)]
pub struct FunctionBuilder {
    body: FunctionBody,
    labels: Vec<Option<usize>>,
    jump_fixups: Vec<(usize, Label)>,
    handler_fixups: Vec<(usize, Label)>,
    next_register: Register,
}

impl FunctionBuilder {
    /// A body without captures.
    pub fn new(name: impl Into<String>, param_count: usize) -> Self {
        Self::with_captures(name, param_count, &[])
    }

    /// A body that captures the named values.
    pub fn with_captures(name: impl Into<String>, param_count: usize, captures: &[&str]) -> Self {
        let body = FunctionBody::new(
            name,
            param_count,
            captures.iter().map(|c| c.to_string()).collect(),
        );
        let next_register = body.required_registers();
        FunctionBuilder {
            body,
            labels: Vec::new(),
            jump_fixups: Vec::new(),
            handler_fixups: Vec::new(),
            next_register,
        }
    }

    /// Register of parameter `index`.
    pub fn param(&self, index: usize) -> Register {
        self.body.first_param_register() + index
    }

    /// Register of capture `index`.
    pub fn capture(&self, index: usize) -> Register {
        FIRST_CAPTURE_REGISTER + index
    }

    /// Allocate a fresh local register.
    pub fn alloc(&mut self) -> Register {
        let register = self.next_register;
        self.next_register += 1;
        self.body.register_count = self.body.register_count.max(self.next_register);
        register
    }

    /// Add a constant, returning an operand that reads it.
    pub fn constant(&mut self, constant: Constant) -> Operand {
        Operand::Const(self.body.add_constant(constant))
    }

    /// Shorthand for a string constant.
    pub fn string(&mut self, s: &str) -> Operand {
        self.constant(Constant::String(s.to_string()))
    }

    /// Append an instruction.
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        self.body.add_instruction(instruction)
    }

    /// Offset of the next instruction.
    pub fn offset(&self) -> usize {
        self.body.instructions.len()
    }

    /// A new, unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the next instruction.
    pub fn bind(&mut self, label: Label) {
        let offset = self.offset();
        self.labels[label.0] = Some(offset);
    }

    /// A label bound to the next instruction.
    pub fn here(&mut self) -> Label {
        let label = self.label();
        self.bind(label);
        label
    }

    /// Jump to `label`.
    pub fn jump(&mut self, label: Label) {
        let at = self.emit(Instruction::Jump { target: usize::MAX });
        self.jump_fixups.push((at, label));
    }

    /// Jump to `label` if `cond` is truthy.
    pub fn jump_if(&mut self, cond: Operand, label: Label) {
        let at = self.emit(Instruction::JumpIf {
            cond,
            target: usize::MAX,
        });
        self.jump_fixups.push((at, label));
    }

    /// Jump to `label` if `cond` is falsy.
    pub fn jump_if_not(&mut self, cond: Operand, label: Label) {
        let at = self.emit(Instruction::JumpIfNot {
            cond,
            target: usize::MAX,
        });
        self.jump_fixups.push((at, label));
    }

    /// Open a protected region at the next instruction.
    ///
    /// `snapshot` lists the registers restored if the region throws;
    /// `exception` receives the thrown value.
    pub fn begin_region(&mut self, snapshot: &[Register], exception: Option<Register>) -> RegionId {
        let start = self.offset();
        self.body.regions.push(ProtectedRegion {
            start,
            end: start,
            handler: usize::MAX,
            exception,
            snapshot: snapshot.to_vec(),
        });
        RegionId(self.body.regions.len() - 1)
    }

    /// Close `region` after the last emitted instruction; throws inside it
    /// continue at `handler`.
    pub fn end_region(&mut self, region: RegionId, handler: Label) {
        let end = self.offset();
        self.body.regions[region.0].end = end;
        self.handler_fixups.push((region.0, handler));
    }

    /// Emit `Return`.
    pub fn ret(&mut self) {
        self.emit(Instruction::Return);
    }

    fn resolve(&self, label: Label) -> Result<usize> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or_else(|| BytecodeError::UnboundLabel {
                function: self.body.name.clone(),
                label: label.0,
            })
    }

    /// Patch labels and produce the body. A trailing `Return` is added if
    /// the body does not end with one.
    pub fn finish(mut self) -> Result<FunctionBody> {
        if !matches!(self.body.instructions.last(), Some(Instruction::Return)) {
            self.ret();
        }
        for (at, label) in std::mem::take(&mut self.jump_fixups) {
            let target = self.resolve(label)?;
            self.body.patch_jump(at, target)?;
        }
        for (region, label) in std::mem::take(&mut self.handler_fixups) {
            let handler = self.resolve(label)?;
            self.body.regions[region].handler = handler;
        }
        Ok(self.body)
    }
}

/// Collects bodies into a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    functions: Vec<Option<FunctionBody>>,
    entry: Option<FunctionId>,
    host_imports: Vec<String>,
}

impl ProgramBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id for a body defined later (recursion, forward calls).
    pub fn reserve(&mut self) -> FunctionId {
        self.functions.push(None);
        self.functions.len() - 1
    }

    /// Define a reserved body.
    pub fn define(&mut self, id: FunctionId, body: FunctionBody) {
        if let Some(slot) = self.functions.get_mut(id) {
            *slot = Some(body);
        }
    }

    /// Add a body and return its id.
    pub fn add(&mut self, body: FunctionBody) -> FunctionId {
        self.functions.push(Some(body));
        self.functions.len() - 1
    }

    /// Declare a host import.
    pub fn import_host(&mut self, name: impl Into<String>) {
        self.host_imports.push(name.into());
    }

    /// Set the entry point.
    pub fn set_entry(&mut self, id: FunctionId) {
        self.entry = Some(id);
    }

    /// Produce the program.
    pub fn build(self) -> Result<Program> {
        let functions = self
            .functions
            .into_iter()
            .enumerate()
            .map(|(id, body)| body.ok_or(BytecodeError::UndefinedFunction(id)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Program {
            functions,
            entry: self.entry,
            host_imports: self.host_imports,
        })
    }

    /// Produce, validate and analyse the program.
    pub fn load(self) -> Result<LoadedProgram> {
        self.build()?.load()
    }
}
