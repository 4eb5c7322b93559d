//! Register-based virtual machine
//!
//! The dispatch loop runs one frame at a time. Calls push a frame and
//! suspend the caller with a [`PendingCall`] describing where the callee's
//! return value and final receiver go. Natives that call back into the
//! program, such as `map` or `sort`, run as frames on the same stack.
//! Exceptions unwind to the innermost active protected region, reverting
//! its snapshot first.

use std::borrow::Cow;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;
use tracing::{debug, error, warn};
use valuevm_bytecode::{
    BodyInfo, Constant, FunctionBody, FunctionId, Instruction, LoadedProgram, Operand, Register,
    RETURN_REGISTER, THIS_REGISTER,
};
use valuevm_core::{
    store_stats, BodyRef, ClassData, FrameStep, FunctionData, Handle, MakeFrameFn, NativeCall,
    NativeFunction, ThisArg, Value,
};

use crate::builder::VMConfig;
use crate::builtins;
use crate::error::{Fault, Flow, Resource, VMError, VMResult};
use crate::frame::{const_violation, CallFrame, Frame, FrameState, NativeCallFrame, PendingCall};
use crate::host::{HostFunction, HostRegistry};
use crate::operations;
use crate::result::{Diagnostic, DiagnosticLevel, ExecutionResult};

/// Returned value (or escaped exception) and the entry frame's final receiver.
type Outcome = (Result<Value, Value>, Value);

/// What the dispatch loop does after an instruction.
enum Step {
    Continue,
    Enter(Frame),
    /// The bytecode frame on top returns.
    Return,
    /// The native frame on top finished.
    Finish { value: Value, this: Value },
}

/// Where the receiver of a call comes from.
enum Receiver {
    /// Plain call: `this` is `undefined`
    None,
    Register(Register),
    Value(Value),
}

/// An operand that is either still in its register or already evaluated.
enum Source {
    Register(Register),
    Value(Value),
}

pub struct VM {
    program: Rc<LoadedProgram>,
    config: VMConfig,
    hosts: HostRegistry,
    frames: Vec<Frame>,
    instruction_count: u64,
    memory_baseline: usize,
    diagnostics: Vec<Diagnostic>,
}

impl VM {
    /// A VM with default configuration and no host functions.
    pub fn new(program: LoadedProgram) -> Self {
        Self::with_parts(program, VMConfig::default(), HostRegistry::new())
    }

    pub(crate) fn with_parts(program: LoadedProgram, config: VMConfig, hosts: HostRegistry) -> Self {
        VM {
            program: Rc::new(program),
            config,
            hosts,
            frames: Vec::new(),
            instruction_count: 0,
            memory_baseline: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn program(&self) -> &LoadedProgram {
        &self.program
    }

    pub fn config(&self) -> &VMConfig {
        &self.config
    }

    /// Register a host function after construction.
    pub fn register_host(&mut self, name: impl Into<String>, function: impl HostFunction + 'static) {
        self.hosts.register(name, function);
    }

    /// Instructions executed by the most recent run.
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    /// Diagnostics collected since the last [`VM::execute`].
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// Run the program's entry point without arguments.
    pub fn run_main(&mut self) -> VMResult<Result<Value, Value>> {
        let entry = self
            .program
            .entry()
            .ok_or_else(|| VMError::UnknownFunction("<entry>".to_string()))?;
        self.run(entry, Vec::new())
    }

    /// Run a body with an `undefined`, const receiver.
    ///
    /// The outer `Result` carries fatal errors; the inner one is the
    /// returned value or the uncaught thrown value.
    pub fn run(&mut self, function: FunctionId, args: Vec<Value>) -> VMResult<Result<Value, Value>> {
        let (output, _) = self.start(function, Value::Undefined, true, args)?;
        Ok(output)
    }

    /// Run a body as a method of `this`, which receives the final receiver.
    pub fn run_with_this(
        &mut self,
        this: &mut Value,
        function: FunctionId,
        args: Vec<Value>,
    ) -> VMResult<Result<Value, Value>> {
        let (output, final_this) = self.start(function, std::mem::take(this), false, args)?;
        *this = final_this;
        Ok(output)
    }

    /// Run the entry point and report the outcome with diagnostics. Fatal
    /// errors become an `Err` error value and a fatal diagnostic.
    pub fn execute(&mut self) -> ExecutionResult {
        let output = match self.run_main() {
            Ok(output) => output,
            Err(e) => {
                self.diagnostics
                    .push(Diagnostic::new(DiagnosticLevel::Fatal, e.to_string()));
                Err(Value::error("InternalError", e.to_string()))
            }
        };
        if let Err(exception) = &output {
            if !matches!(self.diagnostics.last(), Some(d) if d.level == DiagnosticLevel::Fatal) {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticLevel::Warning,
                    format!("Uncaught exception: {}", exception),
                ));
            }
        }
        ExecutionResult {
            output,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn start(
        &mut self,
        function: FunctionId,
        this: Value,
        const_this: bool,
        args: Vec<Value>,
    ) -> VMResult<Outcome> {
        if let Some(missing) = self.hosts.first_missing(self.program.host_imports()) {
            return Err(VMError::MissingHostFunction(missing.to_string()));
        }
        let program = Rc::clone(&self.program);
        let (body, info) = resolve(&program, function)
            .ok_or_else(|| VMError::UnknownFunction(format!("#{function}")))?;

        self.frames.clear();
        self.instruction_count = 0;
        self.memory_baseline = store_stats().live_bytes;

        let frame = CallFrame::new(function, body, info, this, const_this, &[], args);
        self.push_frame(Frame::Bytecode(frame))?;
        let outcome = self.dispatch();
        if let Err(e) = &outcome {
            error!(error = %e, instructions = self.instruction_count, "run aborted");
            self.frames.clear();
        }
        outcome
    }

    fn dispatch(&mut self) -> VMResult<Outcome> {
        let program = Rc::clone(&self.program);
        loop {
            self.tick()?;

            let step = if matches!(self.frames.last(), Some(Frame::Native(_))) {
                self.step_native()
            } else {
                let frame = self.current()?;
                let (body, info) = resolve(&program, frame.function)
                    .ok_or_else(|| frame.internal("frame refers to a missing body"))?;
                frame.sync_regions(body, info);
                let ip = frame.ip;
                let instruction = body.instructions.get(ip);
                frame.ip += 1;

                if self.config.trace {
                    debug!(function = %body.name, ip, ?instruction, "execute");
                }

                // Falling off the end of a body returns
                match instruction {
                    Some(instruction) => self.step(instruction, body),
                    None => Ok(Step::Return),
                }
            };
            let done = match step {
                Ok(Step::Continue) => None,
                Ok(Step::Enter(frame)) => {
                    self.push_frame(frame)?;
                    None
                }
                Ok(Step::Return) => {
                    let delivered = self.return_from_frame();
                    self.settle(delivered)?
                }
                Ok(Step::Finish { value, this }) => {
                    let delivered = self.finish_native(value, this);
                    self.settle(delivered)?
                }
                Err(fault) => self.settle(Err(fault))?,
            };
            if let Some(outcome) = done {
                return Ok(outcome);
            }
        }
    }

    /// Route a thrown value to its handler; fatal errors end the run.
    fn settle(&mut self, flow: Flow<Option<Outcome>>) -> VMResult<Option<Outcome>> {
        match flow {
            Ok(done) => Ok(done),
            Err(Fault::Throw(exception)) => self.unwind(exception),
            Err(Fault::Fatal(e)) => Err(e),
        }
    }

    /// Count an instruction and enforce the ceilings.
    fn tick(&mut self) -> VMResult<()> {
        self.instruction_count += 1;
        let limits = &self.config.limits;
        if let Some(max) = limits.max_instructions {
            if self.instruction_count > max {
                return Err(VMError::ResourceExhausted {
                    resource: Resource::Instructions,
                    limit: max,
                    reached: self.instruction_count,
                });
            }
        }
        if self.instruction_count % limits.check_interval.max(1) == 0 {
            if let Some(max) = limits.max_memory_bytes {
                let used = store_stats()
                    .live_bytes
                    .saturating_sub(self.memory_baseline);
                if used > max {
                    return Err(VMError::ResourceExhausted {
                        resource: Resource::Memory,
                        limit: max as u64,
                        reached: used as u64,
                    });
                }
            }
        }
        Ok(())
    }

    /// The bytecode frame on top of the stack.
    fn current(&mut self) -> VMResult<&mut CallFrame> {
        match self.frames.last_mut() {
            Some(Frame::Bytecode(frame)) => Ok(frame),
            Some(other) => Err(other.internal("expected a bytecode frame")),
            None => Err(no_frame()),
        }
    }

    fn frame(&self) -> VMResult<&CallFrame> {
        match self.frames.last() {
            Some(Frame::Bytecode(frame)) => Ok(frame),
            Some(other) => Err(other.internal("expected a bytecode frame")),
            None => Err(no_frame()),
        }
    }

    fn internal(&self, message: impl Into<String>) -> Fault {
        match self.frames.last() {
            Some(frame) => Fault::Fatal(frame.internal(message)),
            None => Fault::Fatal(no_frame()),
        }
    }

    fn push_frame(&mut self, mut frame: Frame) -> VMResult<()> {
        let max = self.config.limits.max_call_depth;
        if self.frames.len() >= max {
            return Err(VMError::ResourceExhausted {
                resource: Resource::CallDepth,
                limit: max as u64,
                reached: self.frames.len() as u64 + 1,
            });
        }
        if let Frame::Bytecode(frame) = &mut frame {
            frame.state = FrameState::Running;
        }
        debug!(function = %frame.name(), depth = self.frames.len() + 1, "push frame");
        self.frames.push(frame);
        Ok(())
    }

    // Operands

    fn operand(&mut self, body: &FunctionBody, operand: &Operand) -> Flow<Value> {
        Ok(match operand {
            Operand::Reg(r) => self.frame()?.read(*r)?,
            Operand::Take(r) => self.current()?.take(*r)?,
            Operand::Const(index) => {
                let constant = body
                    .constants
                    .get(*index)
                    .ok_or_else(|| self.internal(format!("constant {index} is out of range")))?;
                self.materialize(constant)?
            }
            Operand::Undefined => Value::Undefined,
            Operand::Null => Value::Null,
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Number(n) => Value::Number(*n),
        })
    }

    fn operands(&mut self, body: &FunctionBody, operands: &[Operand]) -> Flow<Vec<Value>> {
        operands.iter().map(|op| self.operand(body, op)).collect()
    }

    /// Evaluate an operand, leaving plain register reads in place so they
    /// can be borrowed with [`VM::view`].
    fn source(&mut self, body: &FunctionBody, operand: &Operand) -> Flow<Source> {
        match operand {
            Operand::Reg(r) => Ok(Source::Register(*r)),
            other => Ok(Source::Value(self.operand(body, other)?)),
        }
    }

    fn view<'a>(&'a self, source: &'a Source) -> VMResult<Cow<'a, Value>> {
        match source {
            Source::Register(r) => self.frame()?.peek(*r),
            Source::Value(v) => Ok(Cow::Borrowed(v)),
        }
    }

    /// Build a fresh value for a constant.
    fn materialize(&self, constant: &Constant) -> Flow<Value> {
        Ok(match constant {
            Constant::Undefined => Value::Undefined,
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Number(n) => Value::Number(*n),
            Constant::BigInt(digits) => digits
                .parse::<BigInt>()
                .map(Value::BigInt)
                .map_err(|_| self.internal(format!("invalid BigInt constant {digits:?}")))?,
            Constant::String(s) => Value::from(s.as_str()),
            Constant::Array(items) => Value::array(
                items
                    .iter()
                    .map(|item| self.materialize(item))
                    .collect::<Flow<Vec<_>>>()?,
            ),
            Constant::Object(fields) => Value::object(
                fields
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.materialize(item)?)))
                    .collect::<Flow<Vec<_>>>()?,
            ),
            Constant::Function(id) => Value::function(self.body_ref(*id)?, Vec::new()),
            Constant::Class {
                name,
                constructor,
                methods,
                statics,
            } => {
                let constructor = match constructor {
                    Some(id) => Value::function(self.body_ref(*id)?, Vec::new()),
                    None => Value::Undefined,
                };
                let prototype = Value::object(
                    methods
                        .iter()
                        .map(|(key, id)| {
                            Ok((key.clone(), Value::function(self.body_ref(*id)?, Vec::new())))
                        })
                        .collect::<Flow<Vec<_>>>()?,
                );
                let statics = statics
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), self.materialize(item)?)))
                    .collect::<Flow<IndexMap<_, _>>>()?;
                Value::class(ClassData::new(name.as_str(), constructor, prototype, statics))
            }
            Constant::Builtin(builtin) => Value::Builtin(*builtin),
        })
    }

    fn body_ref(&self, function: FunctionId) -> Flow<BodyRef> {
        self.program
            .info(function)
            .map(|info| info.body_ref.clone())
            .ok_or_else(|| self.internal(format!("unknown function #{function}")))
    }

    fn write(&mut self, register: Register, value: Value) -> Flow<()> {
        self.current()?.write(register, value)
    }

    // Execution

    fn step(&mut self, instruction: &Instruction, body: &FunctionBody) -> Flow<Step> {
        use Instruction::*;
        match instruction {
            Mov { src, dst } => {
                let value = self.operand(body, src)?;
                self.write(*dst, value)?;
            }
            Unary { op, arg, dst } => {
                let arg = self.source(body, arg)?;
                let result = operations::unary(*op, &*self.view(&arg)?)?;
                self.write(*dst, result)?;
            }
            Binary { op, lhs, rhs, dst } => {
                let lhs = self.source(body, lhs)?;
                let rhs = self.source(body, rhs)?;
                let result = operations::binary(*op, &*self.view(&lhs)?, &*self.view(&rhs)?)?;
                self.write(*dst, result)?;
            }
            Inc { reg } => operations::increment(self.current()?.slot_mut(*reg)?, 1),
            Dec { reg } => operations::increment(self.current()?.slot_mut(*reg)?, -1),

            Jump { target } => self.current()?.ip = *target,
            JumpIf { cond, target } => {
                let cond = self.source(body, cond)?;
                if self.view(&cond)?.is_truthy() {
                    self.current()?.ip = *target;
                }
            }
            JumpIfNot { cond, target } => {
                let cond = self.source(body, cond)?;
                if !self.view(&cond)?.is_truthy() {
                    self.current()?.ip = *target;
                }
            }

            MakeArray { items, dst } => {
                let items = self.operands(body, items)?;
                self.write(*dst, Value::array(items))?;
            }
            MakeObject { fields, dst } => {
                let fields = fields
                    .iter()
                    .map(|(key, op)| Ok((key.clone(), self.operand(body, op)?)))
                    .collect::<Flow<Vec<_>>>()?;
                self.write(*dst, Value::object(fields))?;
            }

            Sub { obj, key, dst } => {
                let obj = self.source(body, obj)?;
                let key = self.operand(body, key)?;
                let result = operations::sub(&*self.view(&obj)?, &key)?;
                self.write(*dst, result)?;
            }
            SubMov { key, value, obj } => {
                let key = self.operand(body, key)?;
                let value = self.operand(body, value)?;
                operations::submov(self.current()?.slot_mut(*obj)?, &key, value)?;
            }
            Delete { obj, key, dst } => {
                let key = self.operand(body, key)?;
                let result = operations::delete(self.current()?.slot_mut(*obj)?, &key)?;
                self.write(*dst, result)?;
            }

            Call { func, args, dst } => {
                let func = self.operand(body, func)?;
                let args = self.operands(body, args)?;
                return self.call(func, Receiver::None, false, args, *dst);
            }
            Apply {
                func,
                this,
                args,
                dst,
            } => {
                let func = self.operand(body, func)?;
                let args = self.operands(body, args)?;
                let mutable = self.frame()?.is_assignable(*this);
                return self.call(func, Receiver::Register(*this), mutable, args, *dst);
            }
            ConstApply {
                func,
                this,
                args,
                dst,
            } => {
                let func = self.operand(body, func)?;
                let receiver = self.receiver(body, this)?;
                let args = self.operands(body, args)?;
                return self.call(func, receiver, false, args, *dst);
            }
            SubCall {
                obj,
                key,
                args,
                dst,
            } => {
                let key = self.operand(body, key)?;
                let method = operations::sub(&*self.frame()?.peek(*obj)?, &key)?;
                let args = self.operands(body, args)?;
                let mutable = self.frame()?.is_assignable(*obj);
                return self.call(method, Receiver::Register(*obj), mutable, args, *dst);
            }
            ConstSubCall {
                obj,
                key,
                args,
                dst,
            } => {
                let receiver = self.receiver(body, obj)?;
                let key = self.operand(body, key)?;
                let method = match &receiver {
                    Receiver::Register(r) => operations::sub(&*self.frame()?.peek(*r)?, &key)?,
                    Receiver::Value(v) => operations::sub(v, &key)?,
                    Receiver::None => Value::Undefined,
                };
                let args = self.operands(body, args)?;
                return self.call(method, receiver, false, args, *dst);
            }
            New { class, args, dst } => {
                let class = self.operand(body, class)?;
                let args = self.operands(body, args)?;
                return self.construct(class, args, *dst);
            }
            Bind {
                func,
                captures,
                dst,
            } => {
                let func = self.operand(body, func)?;
                let extra = self.operands(body, captures)?;
                let handle = match func {
                    Value::Function(handle) => handle,
                    other => {
                        return Err(Fault::Throw(Value::type_error(format!(
                            "Cannot bind {}",
                            other.typeof_()
                        ))))
                    }
                };
                let data = handle.read();
                let mut captures = data.captures.clone();
                captures.extend(extra);
                self.write(*dst, Value::function(data.body.clone(), captures))?;
            }

            Throw { value } => {
                let value = self.operand(body, value)?;
                return Err(Fault::Throw(value));
            }
            RequireMutableThis => {
                if self.frame()?.const_this {
                    return Err(Fault::Throw(const_violation()));
                }
            }
            HostCall { name, args, dst } => {
                let args = self.operands(body, args)?;
                let host = self
                    .hosts
                    .get(name)
                    .ok_or_else(|| VMError::MissingHostFunction(name.clone()))?;
                let result = host.call(&args)?;
                self.write(*dst, result)?;
            }
            Return => return Ok(Step::Return),
        }
        Ok(Step::Continue)
    }

    /// A receiver operand: registers are threaded in place, anything else
    /// is evaluated into a temporary.
    fn receiver(&mut self, body: &FunctionBody, operand: &Operand) -> Flow<Receiver> {
        match operand {
            Operand::Reg(r) => Ok(Receiver::Register(*r)),
            other => Ok(Receiver::Value(self.operand(body, other)?)),
        }
    }

    /// Call `callee` with `receiver` as `this`.
    ///
    /// A mutable register receiver is moved into the callee and written back
    /// when it returns. Direct natives operate on the register in place.
    fn call(
        &mut self,
        callee: Value,
        receiver: Receiver,
        mutable: bool,
        args: Vec<Value>,
        dst: Register,
    ) -> Flow<Step> {
        match callee {
            Value::Function(handle) => {
                let function = handle.read().body.index;
                let program = Rc::clone(&self.program);
                let (body, info) = resolve(&program, function)
                    .ok_or_else(|| self.internal(format!("unknown function #{function}")))?;
                if !mutable && info.mutates_this && !matches!(receiver, Receiver::None) {
                    return Err(Fault::Throw(const_violation()));
                }
                let this = self.thread_receiver(receiver, mutable, dst)?;
                let frame = new_frame(function, body, info, &handle, this, !mutable, args);
                Ok(Step::Enter(Frame::Bytecode(frame)))
            }
            Value::Native(native) => match native.call {
                NativeCall::Direct(call) => {
                    let result = match receiver {
                        Receiver::Register(r) => {
                            let slot = self.current()?.slot(r)?;
                            call(ThisArg::new(slot, mutable), args)
                        }
                        Receiver::Value(mut value) => call(ThisArg::new(&mut value, mutable), args),
                        Receiver::None => {
                            let mut this = Value::Undefined;
                            call(ThisArg::new(&mut this, false), args)
                        }
                    }?;
                    self.write(dst, result)?;
                    Ok(Step::Continue)
                }
                NativeCall::Frame { make, mutates_this } => {
                    if mutates_this && !mutable {
                        return Err(Fault::Throw(const_violation()));
                    }
                    let this = self.thread_receiver(receiver, mutates_this, dst)?;
                    enter_native(native, make, this, args)
                }
            },
            Value::Builtin(builtin) => {
                let result = builtins::call_builtin(builtin, args)?;
                self.write(dst, result)?;
                Ok(Step::Continue)
            }
            other => Err(Fault::Throw(not_callable(&other))),
        }
    }

    /// Produce the receiver for a call that pushes a frame, and record in
    /// the caller where the results go. A mutable register receiver is moved
    /// out; while a protected region is active its old value is retained so
    /// a caught exception can put it back.
    fn thread_receiver(&mut self, receiver: Receiver, mutable: bool, dst: Register) -> Flow<Value> {
        let frame = self.current()?;
        let (this, this_target, retained_this) = match receiver {
            Receiver::Register(r) if mutable => {
                let retained = if frame.has_active_region() {
                    Some(frame.read(r)?)
                } else {
                    None
                };
                (frame.take_receiver(r)?, Some(r), retained)
            }
            Receiver::Register(r) => (frame.read(r)?, None, None),
            Receiver::Value(v) => (v, None, None),
            Receiver::None => (Value::Undefined, None, None),
        };
        frame.pending = Some(PendingCall {
            return_target: Some(dst),
            this_target,
            retained_this,
        });
        Ok(this)
    }

    /// `new class(...args)`: the instance is threaded through the
    /// constructor as a mutable receiver and lands in `dst`.
    fn construct(&mut self, class: Value, args: Vec<Value>, dst: Register) -> Flow<Step> {
        match class {
            Value::Class(handle) => {
                let data = handle.read();
                let instance = Value::object_with_prototype(
                    std::iter::empty::<(String, Value)>(),
                    data.prototype.clone(),
                );
                let Value::Function(constructor) = &data.constructor else {
                    self.write(dst, instance)?;
                    return Ok(Step::Continue);
                };
                let function = constructor.read().body.index;
                let program = Rc::clone(&self.program);
                let (body, info) = resolve(&program, function)
                    .ok_or_else(|| self.internal(format!("unknown function #{function}")))?;
                let frame = new_frame(function, body, info, constructor, instance, false, args);
                self.current()?.pending = Some(PendingCall {
                    return_target: None,
                    this_target: Some(dst),
                    retained_this: None,
                });
                Ok(Step::Enter(Frame::Bytecode(frame)))
            }
            Value::Builtin(builtin) => {
                let instance = builtins::construct_builtin(builtin, args)?;
                self.write(dst, instance)?;
                Ok(Step::Continue)
            }
            other => Err(Fault::Throw(Value::type_error(format!(
                "{} is not a constructor",
                other.typeof_()
            )))),
        }
    }

    // Native frames

    /// Advance the native frame on top of the stack.
    fn step_native(&mut self) -> Flow<Step> {
        let step = match self.frames.last_mut() {
            Some(Frame::Native(native)) => {
                if self.config.trace {
                    debug!(native = native.name, "step");
                }
                native.state.step()
            }
            _ => return Err(Fault::Fatal(no_frame())),
        };
        match step? {
            FrameStep::Call { callee, this, args } => self.call_from_native(callee, this, args),
            FrameStep::Return { value, this } => Ok(Step::Finish { value, this }),
        }
    }

    /// A call requested by a native frame. The receiver is const, and the
    /// result goes back to the native rather than to a register.
    fn call_from_native(&mut self, callee: Value, this: Value, args: Vec<Value>) -> Flow<Step> {
        match callee {
            Value::Function(handle) => {
                let function = handle.read().body.index;
                let program = Rc::clone(&self.program);
                let (body, info) = resolve(&program, function)
                    .ok_or_else(|| self.internal(format!("unknown function #{function}")))?;
                if info.mutates_this && !this.is_undefined() {
                    return Err(Fault::Throw(const_violation()));
                }
                let frame = new_frame(function, body, info, &handle, this, true, args);
                Ok(Step::Enter(Frame::Bytecode(frame)))
            }
            Value::Native(native) => match native.call {
                NativeCall::Direct(call) => {
                    let mut this = this;
                    let result = call(ThisArg::new(&mut this, false), args)?;
                    self.resume_native(result)?;
                    Ok(Step::Continue)
                }
                NativeCall::Frame {
                    mutates_this: true, ..
                } => Err(Fault::Throw(const_violation())),
                NativeCall::Frame { make, .. } => enter_native(native, make, this, args),
            },
            Value::Builtin(builtin) => {
                let result = builtins::call_builtin(builtin, args)?;
                self.resume_native(result)?;
                Ok(Step::Continue)
            }
            other => Err(Fault::Throw(not_callable(&other))),
        }
    }

    fn resume_native(&mut self, result: Value) -> Flow<()> {
        match self.frames.last_mut() {
            Some(Frame::Native(native)) => Ok(native.state.resume(result)?),
            Some(other) => Err(Fault::Fatal(other.internal("expected a native frame"))),
            None => Err(Fault::Fatal(no_frame())),
        }
    }

    // Returns and exceptions

    /// Pop the bytecode frame on top and deliver its results.
    fn return_from_frame(&mut self) -> Flow<Option<Outcome>> {
        let mut frame = match self.frames.pop() {
            Some(Frame::Bytecode(frame)) => frame,
            Some(other) => return Err(Fault::Fatal(other.internal("return from a native frame"))),
            None => return Err(Fault::Fatal(no_frame())),
        };
        frame.state = FrameState::Returned;
        let value = frame.take(RETURN_REGISTER)?;
        let this = frame.take_receiver(THIS_REGISTER)?;
        debug!(function = %frame.name, depth = self.frames.len(), "pop frame");
        self.deliver(value, this)
    }

    /// Pop the native frame on top and deliver its results.
    fn finish_native(&mut self, value: Value, this: Value) -> Flow<Option<Outcome>> {
        let frame = self.frames.pop().ok_or_else(no_frame)?;
        debug!(function = %frame.name(), depth = self.frames.len(), "pop frame");
        self.deliver(value, this)
    }

    /// Hand a finished call's return value and final receiver to the frame
    /// below. Returns the outcome when the entry frame finished.
    fn deliver(&mut self, value: Value, this: Value) -> Flow<Option<Outcome>> {
        let caller = match self.frames.last_mut() {
            None => return Ok(Some((Ok(value), this))),
            Some(Frame::Native(native)) => {
                native.state.resume(value)?;
                return Ok(None);
            }
            Some(Frame::Bytecode(caller)) => caller,
        };
        let pending = caller
            .pending
            .take()
            .ok_or_else(|| caller.internal("return into a frame with no pending call"))?;
        if let Some(target) = pending.this_target {
            caller.write(target, this)?;
        }
        if let Some(target) = pending.return_target {
            caller.write(target, value)?;
        }
        Ok(None)
    }

    /// Route `exception` to the innermost active region, popping frames
    /// that have none. Returns the outcome when nothing catches it.
    fn unwind(&mut self, exception: Value) -> VMResult<Option<Outcome>> {
        let program = Rc::clone(&self.program);
        loop {
            if let Some(Frame::Bytecode(frame)) = self.frames.last_mut() {
                if let Some(active) = frame.regions.pop() {
                    let region = program
                        .body(frame.function)
                        .and_then(|body| body.regions.get(active.index))
                        .ok_or_else(|| frame.internal("active region is missing"))?;
                    if let Some(PendingCall {
                        this_target: Some(target),
                        retained_this: Some(retained),
                        ..
                    }) = frame.pending.take()
                    {
                        *frame.slot(target)? = retained;
                    }
                    frame.transactions.revert(active.token, &mut frame.registers);
                    if let Some(register) = region.exception {
                        *frame.slot(register)? = exception;
                    }
                    frame.ip = region.handler;
                    debug!(function = %frame.name, handler = region.handler, "exception caught");
                    return Ok(None);
                }
            }

            let frame = self.frames.pop().ok_or_else(no_frame)?;
            debug!(function = %frame.name(), depth = self.frames.len(), "unwind frame");
            if self.frames.is_empty() {
                warn!(exception = %exception.codify(), "uncaught exception");
                let this = match frame {
                    Frame::Bytecode(mut frame) => {
                        frame.state = FrameState::Thrown;
                        frame.take_receiver(THIS_REGISTER)?
                    }
                    Frame::Native(_) => Value::Undefined,
                };
                return Ok(Some((Err(exception), this)));
            }
        }
    }
}

fn no_frame() -> VMError {
    VMError::Internal {
        function: "<none>".to_string(),
        ip: 0,
        message: "no active frame".to_string(),
    }
}

fn not_callable(value: &Value) -> Value {
    match value {
        Value::Class(class) => Value::type_error(format!(
            "Class constructor {} cannot be invoked without 'new'",
            class.read().name
        )),
        other => Value::type_error(format!("{} is not a function", other.typeof_())),
    }
}

fn enter_native(
    native: &'static NativeFunction,
    make: MakeFrameFn,
    this: Value,
    args: Vec<Value>,
) -> Flow<Step> {
    let state = make(this, args)?;
    Ok(Step::Enter(Frame::Native(NativeCallFrame {
        name: native.name,
        state,
    })))
}

fn resolve(program: &LoadedProgram, function: FunctionId) -> Option<(&FunctionBody, &BodyInfo)> {
    Some((program.body(function)?, program.info(function)?))
}

fn new_frame(
    function: FunctionId,
    body: &FunctionBody,
    info: &BodyInfo,
    handle: &Handle<FunctionData>,
    this: Value,
    const_this: bool,
    args: Vec<Value>,
) -> CallFrame {
    CallFrame::new(
        function,
        body,
        info,
        this,
        const_this,
        &handle.read().captures,
        args,
    )
}
